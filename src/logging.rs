//! Tracing subscriber setup for the agent binary.
//!
//! Console output always; a daily-rotated file under `log_dir` when one is
//! configured. `RUST_LOG` overrides the configured level.

use crate::config::LoggingConfig;
use crate::error::{AgentError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// File name prefix for rotated log files.
const LOG_FILE_PREFIX: &str = "homeagent.log";

/// Resolve the filter directive used when `RUST_LOG` is unset.
pub fn default_directive(config: &LoggingConfig, debug: bool) -> String {
    if debug {
        "homeagent=debug,info".to_owned()
    } else {
        config.level.clone()
    }
}

/// Install the global tracing subscriber.
///
/// Keep the returned guard alive for the lifetime of the process, dropping
/// it flushes the file writer.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig, debug: bool) -> Result<Option<WorkerGuard>> {
    let directive = default_directive(config, debug);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| AgentError::Logging(format!("cannot install subscriber: {e}")))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_overrides_level() {
        let config = LoggingConfig {
            level: "warn".to_owned(),
            log_dir: None,
        };
        assert_eq!(default_directive(&config, false), "warn");
        assert!(default_directive(&config, true).starts_with("homeagent=debug"));
    }
}
