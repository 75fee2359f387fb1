//! Cooperative task scheduler.
//!
//! Runs one-shot and periodic tasks on a single thread and publishes live
//! per-task status into the shared [`StateStore`](crate::state::StateStore).

pub mod runner;
pub mod shutdown;
pub mod tasks;
pub mod wake;

pub use runner::{Scheduler, TASK_MAINTENANCE};
pub use shutdown::{spawn_shutdown_listener, wait_for_signal};
pub use tasks::{Delay, Task, TaskArgs, TaskId, TaskRecord};
pub use wake::WakeSignal;
