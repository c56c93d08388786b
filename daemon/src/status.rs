use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::error;

use crate::controller::{LifecycleController, PresenceState};

/// Runtime status written by the daemon to `<data dir>/status.toml`.
/// Anything that wants to show daemon state reads this file (read-only).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Current lifecycle state.
    pub state: PresenceState,
    /// Unmatched start calls.
    pub running_count: u32,
    /// Id of the live indicator, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_id: Option<i32>,
    /// Id the presence would be restarted under by the next task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_id: Option<i32>,
    /// Name of the current task, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    /// RFC 3339 timestamp of the most recent task dispatch, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_task_run: Option<String>,
    /// Message of the last rejected command; cleared by the next success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonStatus {
    /// Constructs the initial idle status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: PresenceState::Idle,
            running_count: 0,
            presence_id: None,
            restart_id: None,
            current_task: None,
            last_task_run: None,
            error: None,
        }
    }

    /// Copies the controller's observable state into the status.
    pub fn sync(&mut self, controller: &LifecycleController) {
        self.state = controller.state();
        self.running_count = controller.running_count();
        self.presence_id = controller.presence_id();
        self.restart_id = controller.last_config().map(|c| c.id);
        self.current_task = controller.current_task().map(|t| t.task_name.clone());
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Logs errors rather than panicking; a status write failure should never
/// crash the daemon.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!("Failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                error!("Failed to write status file: {e}");
            }
        }
        Err(e) => error!("Failed to serialize status: {e}"),
    }
}
