//! Mutex-guarded state shared between the scheduler and collaborators.
//!
//! All reads and writes go through [`StateStore::acquire`], which returns a
//! guard that releases the lock when it goes out of scope. Multi-field
//! updates made through one guard are atomic with respect to every other
//! thread.

use crate::error::{AgentError, Result};
use crate::scheduler::tasks::{TaskId, TaskRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Scheduler-wide status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// True while the run loop is executing.
    pub running: bool,
    /// Epoch seconds the loop last started.
    pub start: f64,
    /// Epoch seconds of the last observed wake-up.
    pub last_event: f64,
}

/// Everything held by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentState {
    /// Scheduler-wide status.
    pub scheduler: SchedulerStatus,
    /// Per-task status keyed by task id.
    pub tasks: BTreeMap<TaskId, TaskRecord>,
    /// Free-form values published by collaborators.
    pub values: BTreeMap<String, Value>,
}

/// Scoped exclusive access to the [`AgentState`].
pub type StateGuard<'a> = MutexGuard<'a, AgentState>;

/// Process-wide state store handle.
///
/// Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    inner: Arc<Mutex<AgentState>>,
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the state for the lifetime of the returned guard.
    ///
    /// A panic in another holder does not wedge the store: the poisoned
    /// guard is recovered and handed out as usual.
    pub fn acquire(&self) -> StateGuard<'_> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the whole state.
    pub fn snapshot(&self) -> AgentState {
        self.acquire().clone()
    }

    /// Diagnostic payload for status requests.
    ///
    /// Shape: `{"scheduler": {running, start, last_event}, "tasks": {<id>: {...}}}`.
    pub fn status(&self) -> Value {
        let state = self.acquire();
        json!({
            "scheduler": state.scheduler,
            "tasks": state.tasks,
        })
    }

    /// Status record of one task.
    pub fn task(&self, id: &TaskId) -> Option<TaskRecord> {
        self.acquire().tasks.get(id).cloned()
    }

    /// Set a collaborator value.
    pub fn set_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.acquire().values.insert(key.into(), value.into());
    }

    /// Read a collaborator value. JSON `null` reads as absent.
    pub fn value(&self, key: &str) -> Option<Value> {
        self.acquire()
            .values
            .get(key)
            .filter(|value| !value.is_null())
            .cloned()
    }

    /// Read a collaborator value, falling back to `default`.
    pub fn value_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.value(key).unwrap_or_else(|| default.into())
    }

    /// Increment an integer counter, starting from 0, and return the new value.
    ///
    /// A non-integer value under `key` is treated as 0.
    pub fn increment(&self, key: &str) -> i64 {
        let mut state = self.acquire();
        let count = state
            .values
            .get(key)
            .and_then(Value::as_i64)
            .unwrap_or(0)
            .saturating_add(1);
        state.values.insert(key.to_owned(), Value::from(count));
        count
    }

    /// Append `item` to the array under `key`, creating it when absent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::State`] if `key` holds a non-array value.
    pub fn append(&self, key: &str, item: impl Into<Value>) -> Result<usize> {
        let mut state = self.acquire();
        let entry = state
            .values
            .entry(key.to_owned())
            .or_insert_with(|| Value::Array(Vec::new()));
        if entry.is_null() {
            *entry = Value::Array(Vec::new());
        }
        match entry {
            Value::Array(items) => {
                items.push(item.into());
                Ok(items.len())
            }
            other => Err(AgentError::State(format!(
                "cannot append to '{key}': holds {}",
                value_kind(other)
            ))),
        }
    }

    /// Clone of all collaborator values.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.acquire().values.clone()
    }

    /// Merge previously persisted values into the store.
    pub fn restore_values(&self, values: BTreeMap<String, Value>) {
        self.acquire().values.extend(values);
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::scheduler::tasks::Task;

    #[test]
    fn values_round_trip() {
        let store = StateStore::new();
        assert!(store.value("cpu_temp").is_none());
        assert_eq!(store.value_or("cpu_temp", 0), json!(0));

        store.set_value("cpu_temp", 48.5);
        assert_eq!(store.value("cpu_temp"), Some(json!(48.5)));

        store.set_value("cpu_temp", Value::Null);
        assert!(store.value("cpu_temp").is_none());
    }

    #[test]
    fn increment_counts_from_zero() {
        let store = StateStore::new();
        assert_eq!(store.increment("publish_count"), 1);
        assert_eq!(store.increment("publish_count"), 2);

        store.set_value("label", "x");
        assert_eq!(store.increment("label"), 1);
    }

    #[test]
    fn append_creates_and_extends_arrays() {
        let store = StateStore::new();
        assert_eq!(store.append("events", "online").expect("append"), 1);
        assert_eq!(store.append("events", "ping").expect("append"), 2);
        assert_eq!(store.value("events"), Some(json!(["online", "ping"])));

        store.set_value("uptime", 12);
        let err = store.append("uptime", 1).expect_err("not an array");
        assert!(err.to_string().contains("a number"));
    }

    #[test]
    fn clones_share_state() {
        let store = StateStore::new();
        let other = store.clone();
        other.set_value("hostname", "garage-pi");
        assert_eq!(store.value("hostname"), Some(json!("garage-pi")));
    }

    #[test]
    fn status_has_scheduler_and_tasks_keys() {
        let store = StateStore::new();
        let task = Task::new("collector", |_| Ok(()));
        {
            let mut state = store.acquire();
            state.scheduler.running = true;
            state.scheduler.start = 100.0;
            state
                .tasks
                .insert(TaskId::from("collector_1"), TaskRecord::new(&task, 110.0, 10));
        }

        let status = store.status();
        assert_eq!(status["scheduler"]["running"], true);
        assert_eq!(status["scheduler"]["start"], 100.0);
        assert_eq!(status["scheduler"]["last_event"], 0.0);
        assert_eq!(status["tasks"]["collector_1"]["function_name"], "collector");
        assert_eq!(status["tasks"]["collector_1"]["next"], 110.0);
        assert!(status.get("values").is_none());
    }

    #[test]
    fn lock_survives_panicking_holder() {
        let store = StateStore::new();
        let poisoner = store.clone();
        let result = std::thread::spawn(move || {
            let mut state = poisoner.acquire();
            state.values.insert("half".to_owned(), json!(true));
            panic!("holder failed mid-update");
        })
        .join();
        assert!(result.is_err());

        assert_eq!(store.value("half"), Some(json!(true)));
        store.set_value("after", 1);
        assert_eq!(store.value("after"), Some(json!(1)));
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let store = StateStore::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.increment("hits");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(store.value("hits"), Some(json!(800)));
    }

    #[test]
    fn restore_merges_values() {
        let store = StateStore::new();
        store.set_value("keep", 1);
        let mut restored = BTreeMap::new();
        restored.insert("boot".to_owned(), json!("2026-10-19T08:00:00+00:00"));
        store.restore_values(restored);

        let values = store.values();
        assert_eq!(values.len(), 2);
        assert_eq!(values["keep"], json!(1));
    }
}
