//! Home Agent: periodic data collection service core.
//!
//! The agent runs an open-ended set of one-shot and recurring jobs on a
//! single cooperative thread and publishes live status for every job into
//! a shared, lock-guarded state store that other threads can read.
//!
//! # Architecture
//!
//! - **State**: [`StateStore`] holds scheduler status, per-task records and
//!   collaborator values behind one mutex with scoped acquisition.
//! - **Scheduler**: [`Scheduler`] owns a FIFO ready queue and a deadline
//!   min-heap, executes task bodies one at a time, and isolates failures.
//! - **Shutdown**: a shared `CancellationToken` is the host-wide running
//!   flag; [`scheduler::spawn_shutdown_listener`] maps SIGINT/SIGTERM onto it.
//! - **Service**: [`Service`] is the host process wiring it all together.

pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod util;

pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use scheduler::{Delay, Scheduler, Task, TaskArgs, TaskId, TaskRecord};
pub use service::Service;
pub use state::{AgentState, StateStore};
