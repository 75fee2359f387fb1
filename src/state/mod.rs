//! Thread-safe shared state.
//!
//! Holds scheduler status, per-task status and collaborator values behind
//! one lock, plus JSON snapshot persistence.

pub mod persist;
pub mod store;

pub use persist::{load_states, save_states};
pub use store::{AgentState, SchedulerStatus, StateGuard, StateStore};
