//! Shutdown wiring between OS signals, the shared cancellation token and
//! the scheduler loop.
//!
//! The scheduler never installs signal handlers itself. The host spawns a
//! listener that turns SIGINT/SIGTERM, or a cancellation of the shared
//! token from anywhere else, into [`Scheduler::stop`] so a blocked loop
//! wakes at once instead of waiting out its timeout.

use crate::scheduler::Scheduler;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Wait for SIGINT or SIGTERM and return the signal number.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be registered.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<i32> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => Ok(libc::SIGINT),
        _ = terminate.recv() => Ok(libc::SIGTERM),
    }
}

/// Wait for Ctrl-C and return the SIGINT signal number.
///
/// # Errors
///
/// Returns an error if the Ctrl-C handler cannot be registered.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<i32> {
    tokio::signal::ctrl_c().await?;
    Ok(libc::SIGINT)
}

/// Spawn a task that stops `scheduler` on a signal or token cancellation.
///
/// Must be called from within a tokio runtime. The task ends after
/// issuing one stop.
pub fn spawn_shutdown_listener(scheduler: Scheduler) -> JoinHandle<()> {
    let token = scheduler.shutdown_token();
    tokio::spawn(async move {
        tokio::select! {
            result = wait_for_signal() => match result {
                Ok(signal) => scheduler.stop(signal),
                Err(e) => {
                    warn!("cannot listen for signals: {e}");
                    token.cancelled().await;
                    scheduler.stop(0);
                }
            },
            () = token.cancelled() => {
                debug!("shutdown token cancelled");
                scheduler.stop(0);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::SchedulerConfig;
    use crate::scheduler::Task;
    use crate::state::StateStore;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn cancelling_token_wakes_blocked_loop() {
        let token = CancellationToken::new();
        let config = SchedulerConfig {
            run_maintenance: false,
            max_wait_secs: 10,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(StateStore::new(), token.clone(), config);
        scheduler.submit_after(Task::new("idle", |_| Ok(())), 300_u64, true);

        let listener = spawn_shutdown_listener(scheduler.clone());
        let runner = scheduler.clone();
        let started = Instant::now();
        let loop_handle = tokio::task::spawn_blocking(move || runner.start());

        while !scheduler.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), loop_handle)
            .await
            .expect("loop exits promptly")
            .expect("join")
            .expect("start");
        listener.await.expect("listener");

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!scheduler.state().snapshot().scheduler.running);
    }
}
