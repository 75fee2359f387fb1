//! Host process: wires the state store, the scheduler and the shutdown
//! listener together and submits the agent's built-in tasks.

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::scheduler::{Scheduler, Task, spawn_shutdown_listener};
use crate::state::{StateStore, load_states, save_states};
use crate::util::now_epoch_secs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Built-in task names.
pub const TASK_AGENT_START: &str = "agent_start";
/// Periodic liveness collector.
pub const TASK_HEARTBEAT: &str = "heartbeat";
/// Periodic status log.
pub const TASK_STATUS_REPORT: &str = "status_report";
/// Periodic state snapshot writer.
pub const TASK_SAVE_STATES: &str = "save_states";

/// The agent service.
pub struct Service {
    config: AgentConfig,
    state: StateStore,
    shutdown: CancellationToken,
    scheduler: Scheduler,
}

impl Service {
    /// Build the state store, shutdown token and scheduler for `config`.
    pub fn new(config: AgentConfig) -> Self {
        let state = StateStore::new();
        let shutdown = CancellationToken::new();
        let scheduler = Scheduler::new(state.clone(), shutdown.clone(), config.scheduler.clone());
        Self {
            config,
            state,
            shutdown,
            scheduler,
        }
    }

    /// Scheduler handle, for submitting collaborator tasks before [`run`](Self::run).
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Shared state store.
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Token that stops the service when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the scheduler loop exits.
    ///
    /// The loop runs on a blocking thread; SIGINT, SIGTERM or cancelling
    /// the shutdown token stops it. A final state snapshot is written when
    /// a states file is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler thread fails or the final
    /// snapshot cannot be written.
    pub async fn run(self) -> Result<()> {
        info!(name = %self.config.service.name, "service is starting");
        let states_file = self.config.state.states_file.clone();
        if let Some(path) = &states_file {
            self.restore_states(path);
        }

        self.submit_builtin_tasks();

        let listener = spawn_shutdown_listener(self.scheduler.clone());
        let runner = self.scheduler.clone();
        let outcome = tokio::task::spawn_blocking(move || runner.start())
            .await
            .map_err(|e| AgentError::Scheduler(format!("scheduler thread failed: {e}")))?;

        info!("service is stopping");
        self.shutdown.cancel();
        if let Err(e) = listener.await {
            warn!("shutdown listener ended abnormally: {e}");
        }

        if let Some(path) = &states_file {
            save_states(path, &self.state.snapshot())?;
        }

        info!(name = %self.config.service.name, "service has stopped");
        outcome
    }

    fn restore_states(&self, path: &Path) {
        match load_states(path) {
            Ok(Some(values)) => {
                debug!(count = values.len(), "restoring state values");
                self.state.restore_values(values);
            }
            Ok(None) => {}
            Err(e) => warn!("ignoring states file {}: {e}", path.display()),
        }
    }

    fn submit_builtin_tasks(&self) {
        let service = &self.config.service;
        self.scheduler
            .submit_now(start_task(self.state.clone(), service.name.clone()));
        self.scheduler.submit_after(
            heartbeat_task(self.state.clone()),
            service.heartbeat_interval_secs,
            true,
        );
        self.scheduler.submit_after(
            status_task(self.state.clone()),
            service.status_interval_secs,
            true,
        );
        if let Some(path) = &self.config.state.states_file {
            self.scheduler.submit_after(
                save_task(self.state.clone(), path.clone()),
                self.config.state.save_interval_secs,
                true,
            );
        }
    }
}

fn start_task(state: StateStore, name: String) -> Task {
    Task::new(TASK_AGENT_START, move |_| {
        debug!("running startup task");
        let mut guard = state.acquire();
        guard.values.insert("name".to_owned(), name.clone().into());
        guard
            .values
            .insert("version".to_owned(), env!("CARGO_PKG_VERSION").into());
        guard
            .values
            .insert("start_time".to_owned(), now_epoch_secs().into());
        Ok(())
    })
}

fn heartbeat_task(state: StateStore) -> Task {
    let started = Instant::now();
    Task::new(TASK_HEARTBEAT, move |_| {
        let count = state.increment("heartbeat");
        state.set_value("last_heartbeat", now_epoch_secs());
        state.set_value("uptime_secs", started.elapsed().as_secs());
        debug!(count, "heartbeat");
        Ok(())
    })
}

fn status_task(state: StateStore) -> Task {
    Task::new(TASK_STATUS_REPORT, move |_| {
        let snapshot = state.snapshot();
        let running = snapshot.tasks.values().filter(|task| task.running).count();
        info!(
            scheduler_running = snapshot.scheduler.running,
            tasks = snapshot.tasks.len(),
            running,
            "status report"
        );
        debug!(status = %state.status(), "status payload");
        Ok(())
    })
    .with_log(true)
}

fn save_task(state: StateStore, path: PathBuf) -> Task {
    Task::new(TASK_SAVE_STATES, move |_| {
        save_states(&path, &state.snapshot())?;
        Ok(())
    })
}
