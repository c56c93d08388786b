/// Command routing: turns one JSON command from the host application into a
/// controller call and a JSON reply.
///
/// Payloads are validated here, once, before they reach the controller. The
/// command envelope is parsed first and the payload second, so a bad payload
/// field is an invalid config rather than an unknown command.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::controller::{LifecycleController, PresenceState};
use crate::error::{ConfigError, ErrorCode, RunTaskError, StartError, UpdateError};
use crate::permission::Thresholds;
use crate::presence::{PresenceConfig, RawPresenceConfig, WorkCategory};
use crate::task::{RawTaskConfig, TaskConfig};

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Start {
        #[serde(default)]
        config: Value,
    },
    Stop,
    StopAll,
    Update {
        #[serde(default)]
        config: Value,
    },
    RunTask {
        #[serde(default)]
        task: Value,
    },
    QueryRunning,
    QueryPermission {
        #[serde(default)]
        category: Option<WorkCategory>,
    },
    QueryState,
    QueryConstants,
    CancelIndicator { id: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Ok,
    Running {
        count: u32,
    },
    Permission {
        granted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    State {
        state: PresenceState,
        running_count: u32,
    },
    Constants {
        os_version: u32,
        base_capability_threshold: u32,
        category_declaration_threshold: u32,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

impl Reply {
    fn error(err: &(impl ErrorCode + std::fmt::Display)) -> Self {
        Reply::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }
}

/// Parses `line` as a [`Command`] and dispatches it.
pub fn handle_line(controller: &mut LifecycleController, line: &str) -> Reply {
    match serde_json::from_str::<Command>(line) {
        Ok(command) => dispatch(controller, command),
        Err(e) => {
            warn!(error = %e, "unparseable command");
            Reply::Error {
                code: "invalid_command",
                message: format!("failed to parse command: {e}"),
            }
        }
    }
}

pub fn dispatch(controller: &mut LifecycleController, command: Command) -> Reply {
    let reply = match command {
        Command::Start { config } => outcome(start(controller, config)),
        Command::Update { config } => outcome(update(controller, config)),
        Command::Stop => {
            controller.stop();
            Reply::Ok
        }
        Command::StopAll => {
            controller.stop_all();
            Reply::Ok
        }
        Command::RunTask { task } => outcome(run_task(controller, task)),
        Command::QueryRunning => Reply::Running {
            count: controller.running_count(),
        },
        Command::QueryPermission { category } => {
            let (granted, reason) = controller.is_permitted(category);
            Reply::Permission { granted, reason }
        }
        Command::QueryState => Reply::State {
            state: controller.state(),
            running_count: controller.running_count(),
        },
        Command::QueryConstants => {
            let Thresholds {
                base_capability,
                category_declaration,
            } = controller.gate().thresholds();
            Reply::Constants {
                os_version: controller.gate().os_version(),
                base_capability_threshold: base_capability,
                category_declaration_threshold: category_declaration,
            }
        }
        Command::CancelIndicator { id } => outcome(controller.cancel_indicator(id)),
    };
    if let Reply::Error { code, message } = &reply {
        warn!(code = *code, %message, "command rejected");
    }
    reply
}

fn outcome<E: ErrorCode + std::fmt::Display>(result: Result<(), E>) -> Reply {
    match result {
        Ok(()) => Reply::Ok,
        Err(e) => Reply::error(&e),
    }
}

fn start(controller: &mut LifecycleController, config: Value) -> Result<(), StartError> {
    let config = PresenceConfig::try_from(payload::<RawPresenceConfig>("config", config)?)?;
    controller.start(config)
}

fn update(controller: &mut LifecycleController, config: Value) -> Result<(), UpdateError> {
    let config = PresenceConfig::try_from(payload::<RawPresenceConfig>("config", config)?)?;
    controller.update_indicator(config)
}

fn run_task(controller: &mut LifecycleController, task: Value) -> Result<(), RunTaskError> {
    let task = TaskConfig::try_from(payload::<RawTaskConfig>("task", task)?)?;
    controller.run_task(task)
}

/// Decodes a command payload into its wire form.
fn payload<T: DeserializeOwned>(field: &'static str, value: Value) -> Result<T, ConfigError> {
    if value.is_null() {
        return Err(ConfigError::Missing(field));
    }
    serde_json::from_value(value).map_err(|e| ConfigError::Malformed {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Capability;
    use crate::testing::harness;

    const START: &str = r#"{"command": "start", "config": {"id": 1, "title": "T", "message": "M", "workCategory": "dataSync"}}"#;

    fn code(reply: &Reply) -> &'static str {
        match reply {
            Reply::Error { code, .. } => *code,
            other => panic!("expected error reply, got {other:?}"),
        }
    }

    // ── lifecycle commands ────────────────────────────────────────────────────

    #[test]
    fn start_stop_round_trip() {
        let mut h = harness(34, &[Capability::PostIndicator]);
        assert_eq!(handle_line(&mut h.controller, START), Reply::Ok);
        assert_eq!(handle_line(&mut h.controller, START), Reply::Ok);
        assert_eq!(
            handle_line(&mut h.controller, r#"{"command": "query_running"}"#),
            Reply::Running { count: 2 }
        );
        assert_eq!(handle_line(&mut h.controller, r#"{"command": "stop"}"#), Reply::Ok);
        assert_eq!(handle_line(&mut h.controller, r#"{"command": "stop_all"}"#), Reply::Ok);
        assert_eq!(
            handle_line(&mut h.controller, r#"{"command": "query_state"}"#),
            Reply::State { state: PresenceState::Idle, running_count: 0 }
        );
    }

    #[test]
    fn start_without_title_is_invalid_config() {
        let mut h = harness(34, &[Capability::PostIndicator]);
        let reply = handle_line(
            &mut h.controller,
            r#"{"command": "start", "config": {"id": 1, "message": "M"}}"#,
        );
        assert_eq!(code(&reply), "invalid_config");
        assert_eq!(h.controller.running_count(), 0);
    }

    #[test]
    fn unknown_category_is_invalid_config() {
        let mut h = harness(34, &[Capability::PostIndicator]);
        let reply = handle_line(
            &mut h.controller,
            r#"{"command": "start", "config": {"id": 1, "title": "T", "message": "M", "workCategory": "camera"}}"#,
        );
        assert_eq!(code(&reply), "invalid_config");
        assert_eq!(h.controller.running_count(), 0);
    }

    #[test]
    fn wrongly_typed_payload_fields_are_invalid_config() {
        let mut h = harness(34, &[Capability::PostIndicator]);
        let bad_id = r#"{"command": "update", "config": {"id": "one", "title": "T", "message": "M"}}"#;
        assert_eq!(code(&handle_line(&mut h.controller, bad_id)), "invalid_config");

        let bad_name = r#"{"command": "run_task", "task": {"taskName": 5}}"#;
        assert_eq!(code(&handle_line(&mut h.controller, bad_name)), "invalid_config");
    }

    #[test]
    fn missing_payload_is_invalid_config() {
        let mut h = harness(34, &[Capability::PostIndicator]);
        let reply = handle_line(&mut h.controller, r#"{"command": "start"}"#);
        assert_eq!(code(&reply), "invalid_config");
        match reply {
            Reply::Error { message, .. } => assert!(message.contains("config is required"), "{message}"),
            other => panic!("expected error reply, got {other:?}"),
        }
    }

    #[test]
    fn start_denied_reports_permission_code() {
        let mut h = harness(34, &[]);
        assert_eq!(code(&handle_line(&mut h.controller, START)), "permission_denied");
    }

    #[test]
    fn update_while_stopped_starts() {
        let mut h = harness(34, &[Capability::PostIndicator]);
        let update = START.replace("\"start\"", "\"update\"");
        assert_eq!(handle_line(&mut h.controller, &update), Reply::Ok);
        assert_eq!(h.controller.running_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_task_without_presence_is_not_running() {
        let mut h = harness(34, &[Capability::PostIndicator]);
        let reply = handle_line(
            &mut h.controller,
            r#"{"command": "run_task", "task": {"taskName": "x", "delay": 0}}"#,
        );
        assert_eq!(code(&reply), "not_running");
    }

    #[tokio::test(start_paused = true)]
    async fn run_task_with_blank_name_is_invalid() {
        let mut h = harness(34, &[Capability::PostIndicator]);
        handle_line(&mut h.controller, START);
        let reply = handle_line(
            &mut h.controller,
            r#"{"command": "run_task", "task": {"taskName": ""}}"#,
        );
        assert_eq!(code(&reply), "invalid_config");
    }

    #[tokio::test(start_paused = true)]
    async fn run_task_loop_moves_to_looping() {
        let mut h = harness(34, &[Capability::PostIndicator]);
        handle_line(&mut h.controller, START);
        let reply = handle_line(
            &mut h.controller,
            r#"{"command": "run_task", "task": {"taskName": "tick", "onLoop": true, "loopDelay": 250}}"#,
        );
        assert_eq!(reply, Reply::Ok);
        assert_eq!(h.controller.state(), PresenceState::Looping);
    }

    // ── queries ───────────────────────────────────────────────────────────────

    #[test]
    fn permission_query_with_and_without_category() {
        let mut h = harness(34, &[Capability::PostIndicator]);
        assert_eq!(
            handle_line(&mut h.controller, r#"{"command": "query_permission"}"#),
            Reply::Permission { granted: true, reason: None }
        );
        let reply = handle_line(
            &mut h.controller,
            r#"{"command": "query_permission", "category": "location"}"#,
        );
        assert!(matches!(reply, Reply::Permission { granted: false, reason: Some(_) }));
    }

    #[test]
    fn constants_report_thresholds() {
        let mut h = harness(30, &[]);
        assert_eq!(
            handle_line(&mut h.controller, r#"{"command": "query_constants"}"#),
            Reply::Constants {
                os_version: 30,
                base_capability_threshold: 33,
                category_declaration_threshold: 34,
            }
        );
    }

    #[test]
    fn cancel_of_live_presence_is_refused() {
        let mut h = harness(34, &[Capability::PostIndicator]);
        handle_line(&mut h.controller, START);
        let reply = handle_line(&mut h.controller, r#"{"command": "cancel_indicator", "id": 1}"#);
        assert_eq!(code(&reply), "active_presence");
    }

    // ── wire format ───────────────────────────────────────────────────────────

    #[test]
    fn garbage_is_invalid_command() {
        let mut h = harness(34, &[]);
        assert_eq!(code(&handle_line(&mut h.controller, "not json")), "invalid_command");
        assert_eq!(
            code(&handle_line(&mut h.controller, r#"{"command": "reboot"}"#)),
            "invalid_command"
        );
    }

    #[test]
    fn replies_serialize_with_status_tag() {
        let json = serde_json::to_value(Reply::Running { count: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "running", "count": 3}));

        let json = serde_json::to_value(Reply::State {
            state: PresenceState::Looping,
            running_count: 1,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "state", "state": "looping", "running_count": 1})
        );

        let json = serde_json::to_value(Reply::Error {
            code: "not_running",
            message: "nothing to run under".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "error",
                "code": "not_running",
                "message": "nothing to run under"
            })
        );
    }
}
