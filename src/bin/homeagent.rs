//! Home agent service binary.

use clap::Parser;
use homeagent::{AgentConfig, Service};
use std::path::PathBuf;
use tracing::{error, info};

/// Home Agent: collects local data on a schedule and publishes it.
#[derive(Parser)]
#[command(name = "homeagent", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run as a service.
    #[arg(short, long)]
    service: bool,

    /// Turn on debug logging.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(AgentConfig::default_config_path);
    let config = if config_path.is_file() {
        AgentConfig::from_file(&config_path)?
    } else {
        AgentConfig::default()
    };

    let _log_guard = homeagent::logging::init_logging(&config.logging, cli.debug)?;
    info!("starting homeagent v{}", env!("CARGO_PKG_VERSION"));
    if config_path.is_file() {
        info!("loaded config from {}", config_path.display());
    } else {
        info!("no config at {}, using defaults", config_path.display());
    }

    if !cli.service {
        error!("must use -s to run as a service");
        std::process::exit(2);
    }

    config.validate()?;

    Service::new(config).run().await.map_err(|e| {
        error!(error = %e, "homeagent exited with error");
        anyhow::anyhow!("homeagent failed: {e}")
    })?;

    info!("quit homeagent");
    Ok(())
}
