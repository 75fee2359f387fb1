//! JSON snapshots of the state store.
//!
//! The file holds collaborator values under `state` plus the scheduler and
//! task status at the time of writing. Only `state` is read back; task
//! status is rebuilt by the scheduler on every start.

use crate::error::{AgentError, Result};
use crate::scheduler::tasks::{TaskId, TaskRecord};
use crate::state::store::{AgentState, SchedulerStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StatesFile {
    #[serde(default)]
    state: BTreeMap<String, Value>,
    #[serde(default)]
    scheduler: SchedulerStatus,
    #[serde(default)]
    tasks: BTreeMap<TaskId, TaskRecord>,
}

/// Write a snapshot to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be serialized or written.
pub fn save_states(path: &Path, state: &AgentState) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = StatesFile {
        state: state.values.clone(),
        scheduler: state.scheduler.clone(),
        tasks: state.tasks.clone(),
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| AgentError::State(format!("cannot serialize states: {e}")))?;

    // Write-then-rename so a crash mid-write never leaves a truncated file.
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    debug!("saved states to {}", path.display());
    Ok(())
}

/// Read the collaborator values from a snapshot.
///
/// Returns `Ok(None)` when the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_states(path: &Path) -> Result<Option<BTreeMap<String, Value>>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("no states file at {}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let file: StatesFile = serde_json::from_slice(&bytes)
        .map_err(|e| AgentError::State(format!("cannot parse states: {e}")))?;
    debug!("loaded {} values from {}", file.state.len(), path.display());
    Ok(Some(file.state))
}
