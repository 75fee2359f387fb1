//! Error types for the home agent.

/// Top-level error type for the agent service.
///
/// Task bodies never produce this type: their failures are logged at the
/// per-task boundary inside the scheduler and dropped there.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Configuration load, parse or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Shared state store error (persistence, value type mismatch).
    #[error("state error: {0}")]
    State(String),

    /// Scheduler lifecycle error.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Logging subscriber setup error.
    #[error("logging error: {0}")]
    Logging(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AgentError>;
