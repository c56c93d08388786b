/// The presence lifecycle controller.
///
/// Owns the reference count of unmatched starts, the last accepted presence
/// config, and the current task, and is the only thing that mutates them. Each
/// command runs to completion on the event loop, so there is no locking.
///
/// Invariants kept here:
///   - an indicator is registered with the host iff `running_count > 0`
///   - a loop is armed only while `running_count > 0`
///   - at most one indicator and one armed timer exist at a time
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CancelError, RunTaskError, StartError, UpdateError};
use crate::executor::TaskExecutor;
use crate::host::PresenceHost;
use crate::indicator::IndicatorBuilder;
use crate::permission::{CapabilitySource, PermissionGate, Thresholds};
use crate::presence::{PresenceConfig, WorkCategory};
use crate::scheduler::{TaskScheduler, TimerFired, TimerMode};
use crate::task::TaskConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    /// Nothing running, no indicator.
    Idle,
    /// Indicator live, no loop armed.
    Active,
    /// Indicator live and a recurring task armed.
    Looping,
}

pub struct LifecycleController {
    gate: PermissionGate,
    builder: Box<dyn IndicatorBuilder>,
    host: Box<dyn PresenceHost>,
    executor: Box<dyn TaskExecutor>,
    scheduler: TaskScheduler,
    running_count: u32,
    last_config: Option<PresenceConfig>,
    current_task: Option<TaskConfig>,
    /// Id the live indicator is registered under.
    presence_id: Option<i32>,
}

impl LifecycleController {
    pub fn new(
        gate: PermissionGate,
        builder: Box<dyn IndicatorBuilder>,
        host: Box<dyn PresenceHost>,
        executor: Box<dyn TaskExecutor>,
        scheduler: TaskScheduler,
    ) -> Self {
        Self {
            gate,
            builder,
            host,
            executor,
            scheduler,
            running_count: 0,
            last_config: None,
            current_task: None,
            presence_id: None,
        }
    }

    // ── queries ───────────────────────────────────────────────────────────────

    pub fn running_count(&self) -> u32 {
        self.running_count
    }

    pub fn state(&self) -> PresenceState {
        if self.running_count == 0 {
            PresenceState::Idle
        } else if self.scheduler.is_loop_armed() {
            PresenceState::Looping
        } else {
            PresenceState::Active
        }
    }

    pub fn last_config(&self) -> Option<&PresenceConfig> {
        self.last_config.as_ref()
    }

    pub fn current_task(&self) -> Option<&TaskConfig> {
        self.current_task.as_ref()
    }

    pub fn presence_id(&self) -> Option<i32> {
        self.presence_id
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    /// Answers a permission query: the base capability when no category is
    /// given, otherwise the category's full requirement set.
    pub fn is_permitted(&self, category: Option<WorkCategory>) -> (bool, Option<String>) {
        let granted = match category {
            None => self.gate.has_base_capability(),
            Some(cat) => self.gate.is_category_authorized(cat),
        };
        let reason = (!granted).then(|| self.gate.explain(category.unwrap_or(WorkCategory::DataSync)));
        (granted, reason)
    }

    // ── reconfiguration ───────────────────────────────────────────────────────

    pub fn replace_capabilities(
        &mut self,
        thresholds: Thresholds,
        source: Box<dyn CapabilitySource>,
    ) {
        self.gate.replace(thresholds, source);
    }

    pub fn replace_executor(&mut self, executor: Box<dyn TaskExecutor>) {
        self.executor = executor;
    }

    // ── commands ──────────────────────────────────────────────────────────────

    /// Registers the indicator for `config` and counts one more start.
    pub fn start(&mut self, config: PresenceConfig) -> Result<(), StartError> {
        self.register(&config)?;
        self.running_count += 1;
        info!(id = config.id, running_count = self.running_count, "presence started");
        self.last_config = Some(config);
        Ok(())
    }

    /// Matches one earlier start. The presence is torn down when the count
    /// reaches zero; a stop with nothing running still cleans up.
    pub fn stop(&mut self) {
        if self.running_count > 0 {
            self.running_count -= 1;
            if self.running_count > 0 {
                info!(running_count = self.running_count, "presence stop requested");
                return;
            }
            info!("last start matched; stopping presence");
        } else {
            debug!("stop with nothing running; cleaning up anyway");
        }
        // The last config survives a plain stop so a later task can restart it.
        self.teardown();
    }

    /// Tears the presence down regardless of how many starts are outstanding.
    pub fn stop_all(&mut self) {
        info!(running_count = self.running_count, "force stopping presence");
        self.running_count = 0;
        self.teardown();
        self.last_config = None;
    }

    /// Rebuilds the indicator from `config`. When nothing is running this is a
    /// start, so a presence killed from outside comes back on the next update.
    pub fn update_indicator(&mut self, config: PresenceConfig) -> Result<(), UpdateError> {
        if self.running_count == 0 {
            info!(id = config.id, "update with nothing running; starting presence");
            return self.start(config);
        }
        self.register(&config)?;
        debug!(id = config.id, "indicator updated");
        self.last_config = Some(config);
        Ok(())
    }

    /// Makes `task` current and schedules it: a loop when `on_loop`, otherwise
    /// one run after its delay. Replaces whatever was scheduled before.
    pub fn run_task(&mut self, task: TaskConfig) -> Result<(), RunTaskError> {
        if self.running_count == 0 {
            let Some(config) = self.last_config.clone() else {
                warn!(task = %task.task_name, "task requested with no presence to run under");
                return Err(RunTaskError::NotRunning);
            };
            info!(id = config.id, task = %task.task_name, "restarting presence for task");
            self.start(config).map_err(RunTaskError::RestartFailed)?;
        }

        if !self.executor.handles(&task.task_name) {
            warn!(task = %task.task_name, "no handler configured; runs will be skipped");
        }

        if task.on_loop {
            self.scheduler.arm_loop(task.loop_delay());
            info!(task = %task.task_name, interval_ms = task.loop_delay_millis, "task loop armed");
        } else {
            self.scheduler.schedule_once(task.delay());
            info!(task = %task.task_name, delay_ms = task.delay_millis, "task scheduled");
        }
        self.current_task = Some(task);
        Ok(())
    }

    /// Removes a leftover indicator by id. The live presence's own indicator
    /// can only go away through stop.
    pub fn cancel_indicator(&mut self, id: i32) -> Result<(), CancelError> {
        if self.running_count > 0 && self.presence_id == Some(id) {
            return Err(CancelError::ActivePresence(id));
        }
        self.host
            .cancel(id)
            .map_err(|e| CancelError::PlatformError(format!("{e:#}")))
    }

    /// Handles an elapsed timer. Returns true when the current task was
    /// dispatched.
    pub fn handle_timer(&mut self, fired: TimerFired) -> bool {
        let Some(mode) = self.scheduler.accept(fired) else {
            debug!(token = ?fired.token(), "stale timer fire ignored");
            return false;
        };
        if self.running_count == 0 {
            debug!("timer fired after presence stopped; skipping");
            self.scheduler.disarm();
            return false;
        }
        let Some(task) = self.current_task.as_ref() else {
            self.scheduler.disarm();
            return false;
        };

        if let Err(e) = self.executor.dispatch(task) {
            warn!(task = %task.task_name, error = %format!("{e:#}"), "task dispatch failed");
        }

        if let TimerMode::Loop { .. } = mode {
            if self.running_count > 0 {
                self.scheduler.rearm_loop();
            }
        }
        true
    }

    // ── internals ─────────────────────────────────────────────────────────────

    /// Runs the permission gate, builds the artifact, and registers it.
    fn register(&mut self, config: &PresenceConfig) -> Result<(), StartError> {
        let platform_flag = self.authorize(config)?;
        let artifact = self.builder.build(config)?;
        self.host
            .register(&artifact, platform_flag)
            .map_err(|e| StartError::PlatformError(format!("{e:#}")))?;
        if self.presence_id.is_some_and(|id| id != config.id) {
            info!(old = ?self.presence_id, new = config.id, "indicator id changed");
        }
        self.presence_id = Some(config.id);
        Ok(())
    }

    /// Returns the platform flag to register with. Checks run base capability
    /// first, then category declaration, then category authorization.
    fn authorize(&self, config: &PresenceConfig) -> Result<Option<u32>, StartError> {
        if !self.gate.has_base_capability() {
            let category = config.work_category.unwrap_or(WorkCategory::DataSync);
            return Err(StartError::PermissionDenied(self.gate.explain(category)));
        }
        if !self.gate.requires_category_declaration() {
            return Ok(None);
        }
        let Some(category) = config.work_category else {
            return Err(StartError::InvalidConfig(format!(
                "workCategory is required on OS generation {} and above; use dataSync, location or mediaPlayback",
                self.gate.thresholds().category_declaration,
            )));
        };
        if !self.gate.is_category_authorized(category) {
            return Err(StartError::PermissionDenied(self.gate.explain(category)));
        }
        Ok(Some(category.spec().platform_flag))
    }

    fn teardown(&mut self) {
        self.scheduler.disarm();
        self.current_task = None;
        self.presence_id = None;
        if let Err(e) = self.host.deregister() {
            warn!(error = %format!("{e:#}"), "failed to remove indicator");
        }
    }
}
