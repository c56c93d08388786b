use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_LOOP_DELAY_MILLIS: u64 = 5_000;
pub const DEFAULT_TIMEOUT_MILLIS: u64 = 60_000;

/// A validated request to run a named unit of work while the presence is up.
///
/// Only one `TaskConfig` is current at a time; the next `run_task` supersedes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskConfig {
    pub task_name: String,
    pub delay_millis: u64,
    pub on_loop: bool,
    pub loop_delay_millis: u64,
    /// Passed through to the executor; the scheduler itself never enforces it.
    pub timeout_millis: u64,
    pub allowed_while_foreground: bool,
}

#[cfg(test)]
impl TaskConfig {
    /// A one-shot task with every other field at its default.
    pub fn once(task_name: impl Into<String>, delay_millis: u64) -> Self {
        Self {
            task_name: task_name.into(),
            delay_millis,
            on_loop: false,
            loop_delay_millis: DEFAULT_LOOP_DELAY_MILLIS,
            timeout_millis: DEFAULT_TIMEOUT_MILLIS,
            allowed_while_foreground: true,
        }
    }

    /// A recurring task re-run every `loop_delay_millis`.
    pub fn looping(task_name: impl Into<String>, loop_delay_millis: u64) -> Self {
        Self {
            on_loop: true,
            loop_delay_millis,
            ..Self::once(task_name, 0)
        }
    }
}

impl TaskConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_millis)
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(self.loop_delay_millis)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }
}

/// Wire form of a task request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTaskConfig {
    pub task_name: Option<String>,
    #[serde(alias = "delay")]
    pub delay_millis: Option<f64>,
    pub on_loop: Option<bool>,
    #[serde(alias = "loopDelay")]
    pub loop_delay_millis: Option<f64>,
    #[serde(alias = "timeout")]
    pub timeout_millis: Option<f64>,
    #[serde(alias = "allowedInForeground")]
    pub allowed_while_foreground: Option<bool>,
}

impl TryFrom<RawTaskConfig> for TaskConfig {
    type Error = ConfigError;

    fn try_from(raw: RawTaskConfig) -> Result<Self, Self::Error> {
        let task_name = raw.task_name.ok_or(ConfigError::Missing("taskName"))?;
        if task_name.trim().is_empty() {
            return Err(ConfigError::Malformed {
                field: "taskName",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(Self {
            task_name,
            delay_millis: millis("delay", raw.delay_millis, 0)?,
            on_loop: raw.on_loop.unwrap_or(false),
            loop_delay_millis: millis("loopDelay", raw.loop_delay_millis, DEFAULT_LOOP_DELAY_MILLIS)?,
            timeout_millis: millis("timeout", raw.timeout_millis, DEFAULT_TIMEOUT_MILLIS)?,
            allowed_while_foreground: raw.allowed_while_foreground.unwrap_or(true),
        })
    }
}

/// Converts an optional JSON number of milliseconds, rejecting negatives and NaN.
fn millis(field: &'static str, value: Option<f64>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v as u64),
        Some(v) => Err(ConfigError::Malformed {
            field,
            reason: format!("{v} is not a non-negative duration"),
        }),
    }
}
