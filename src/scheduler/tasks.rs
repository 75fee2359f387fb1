//! Task definitions and per-task status records.
//!
//! Defines the [`Task`] callable submitted to the scheduler, the
//! [`TaskId`] it is tracked under, the [`TaskRecord`] status kept in the
//! shared state store, and the lenient [`Delay`] input.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Optional argument handed to a task body on every call.
pub type TaskArgs = serde_json::Value;

/// Signature of a task body.
///
/// Receives the submission's argument, or `None` when the task was
/// submitted without one. Returned errors are logged by the scheduler and
/// never propagated.
pub type TaskFn = dyn Fn(Option<&TaskArgs>) -> anyhow::Result<()> + Send + Sync;

/// A unit of work known to the scheduler.
///
/// Cloning is cheap: periodic tasks share the same body between the ready
/// queue and the sleeping heap.
#[derive(Clone)]
pub struct Task {
    name: String,
    func: Arc<TaskFn>,
    args: Option<TaskArgs>,
    log: bool,
}

impl Task {
    /// Create a task with no argument and the log flag off.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Option<&TaskArgs>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
            args: None,
            log: false,
        }
    }

    /// Attach the argument passed to the body on every call.
    pub fn with_args(mut self, args: impl Into<TaskArgs>) -> Self {
        self.args = Some(args.into());
        self
    }

    /// Set the log flag. The scheduler stores it; hosts decide what it means.
    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    /// Human-readable label, used as the task id prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Argument attached at submission, if any.
    pub fn args(&self) -> Option<&TaskArgs> {
        self.args.as_ref()
    }

    /// Whether the host asked for verbose recording of this task.
    pub fn log(&self) -> bool {
        self.log
    }

    pub(crate) fn invoke(&self) -> anyhow::Result<()> {
        (self.func)(self.args.as_ref())
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

/// Unique id of one submission, `"<name>_<sequence>"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub(crate) fn new(name: &str, seq: u64) -> Self {
        Self(format!("{name}_{seq}"))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Live status of one submitted task, as published in the state store.
///
/// Timestamps are epoch seconds; `0.0` means "never" for `last_run` and
/// "consumed" for `next_run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Label of the task body.
    pub function_name: String,
    /// Start of the most recent execution.
    #[serde(rename = "last")]
    pub last_run: f64,
    /// Next scheduled execution.
    #[serde(rename = "next")]
    pub next_run: f64,
    /// Seconds between executions of a periodic task, 0 for one-shot tasks.
    #[serde(rename = "sleep")]
    pub period: u64,
    /// Argument passed to the body.
    pub args: Option<TaskArgs>,
    /// Host-defined verbose logging flag.
    pub log: bool,
    /// True only while the body is executing.
    pub running: bool,
    /// Human-readable duration of the most recent execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

impl TaskRecord {
    pub(crate) fn new(task: &Task, next_run: f64, period: u64) -> Self {
        Self {
            function_name: task.name().to_owned(),
            last_run: 0.0,
            next_run,
            period,
            args: task.args().cloned(),
            log: task.log(),
            running: false,
            runtime: None,
        }
    }

    /// Returns `true` once a one-shot task has been consumed and is idle.
    pub fn is_finished(&self) -> bool {
        self.next_run <= 0.0 && !self.running
    }
}

/// Requested delay before a task first runs.
///
/// Anything that is not a non-negative whole number of seconds becomes
/// [`Delay::Invalid`] and is replaced by the configured default at
/// submission time rather than rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Delay {
    /// A valid delay in whole seconds.
    Secs(u64),
    /// Malformed input, kept for the warning message.
    Invalid(String),
}

impl Delay {
    /// Whole seconds, falling back to `default` for invalid input.
    pub fn resolve(&self, default: u64) -> u64 {
        match self {
            Self::Secs(secs) => *secs,
            Self::Invalid(_) => default,
        }
    }

    /// Returns `true` when the input had to be coerced.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}

impl From<u64> for Delay {
    fn from(value: u64) -> Self {
        Self::Secs(value)
    }
}

impl From<u32> for Delay {
    fn from(value: u32) -> Self {
        Self::Secs(u64::from(value))
    }
}

impl From<i64> for Delay {
    fn from(value: i64) -> Self {
        u64::try_from(value)
            .map(Self::Secs)
            .unwrap_or_else(|_| Self::Invalid(value.to_string()))
    }
}

impl From<i32> for Delay {
    fn from(value: i32) -> Self {
        Self::from(i64::from(value))
    }
}

impl From<f64> for Delay {
    fn from(value: f64) -> Self {
        if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < u64::MAX as f64 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            return Self::Secs(value as u64);
        }
        Self::Invalid(value.to_string())
    }
}

impl From<&str> for Delay {
    fn from(value: &str) -> Self {
        value
            .trim()
            .parse::<u64>()
            .map(Self::Secs)
            .unwrap_or_else(|_| Self::Invalid(value.to_owned()))
    }
}

impl From<Duration> for Delay {
    fn from(value: Duration) -> Self {
        if value.subsec_nanos() == 0 {
            Self::Secs(value.as_secs())
        } else {
            Self::Invalid(format!("{value:?}"))
        }
    }
}
