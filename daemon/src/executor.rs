/// Task execution: hands a due task to whatever actually does the work.
///
/// The controller calls [`TaskExecutor::dispatch`] from the event loop, so
/// implementations must not block. [`ProcessExecutor`] runs the handler command
/// configured for the task name on a spawned tokio task and enforces the task's
/// timeout there.
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::HandlerConfig;
use crate::task::TaskConfig;

pub const TASK_NAME_ENV: &str = "PRESENCE_TASK_NAME";
pub const ALLOWED_IN_FOREGROUND_ENV: &str = "PRESENCE_ALLOWED_IN_FOREGROUND";

pub trait TaskExecutor {
    /// Starts one run of `task`. Errors mean the run could not be started; the
    /// run's own outcome is the executor's concern.
    fn dispatch(&mut self, task: &TaskConfig) -> Result<()>;

    /// Whether a run of `task_name` can be started at all.
    fn handles(&self, task_name: &str) -> bool;
}

pub struct ProcessExecutor {
    handlers: HashMap<String, Vec<String>>,
}

impl ProcessExecutor {
    pub fn new(handlers: &[HandlerConfig]) -> Self {
        let handlers = handlers
            .iter()
            .filter(|h| !h.command.is_empty())
            .map(|h| (h.task_name.clone(), h.command.clone()))
            .collect();
        Self { handlers }
    }
}

impl TaskExecutor for ProcessExecutor {
    fn handles(&self, task_name: &str) -> bool {
        self.handlers.contains_key(task_name)
    }

    fn dispatch(&mut self, task: &TaskConfig) -> Result<()> {
        let argv = self
            .handlers
            .get(&task.task_name)
            .ok_or_else(|| anyhow!("no handler configured for task '{}'", task.task_name))?;

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .env(TASK_NAME_ENV, &task.task_name)
            .env(ALLOWED_IN_FOREGROUND_ENV, task.allowed_while_foreground.to_string())
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn handler for task '{}'", task.task_name))?;

        let name = task.task_name.clone();
        let timeout = task.timeout();
        tokio::spawn(async move {
            if let Err(e) = supervise(child, timeout, &name).await {
                warn!(task = %name, error = %format!("{e:#}"), "task run failed");
            }
        });
        Ok(())
    }
}

/// Waits for the handler to exit, killing it once `timeout` elapses.
async fn supervise(mut child: tokio::process::Child, timeout: Duration, name: &str) -> Result<()> {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            let status = status.context("Failed to wait for handler")?;
            if status.success() {
                info!(task = %name, "task run finished");
                Ok(())
            } else {
                Err(anyhow!("handler exited with {status}"))
            }
        }
        Err(_) => {
            child.kill().await.context("Failed to kill timed-out handler")?;
            Err(anyhow!("handler timed out after {} ms", timeout.as_millis()))
        }
    }
}
