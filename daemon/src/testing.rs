/// Test doubles shared by the controller and router tests.
use anyhow::{bail, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::controller::LifecycleController;
use crate::event::DaemonEvent;
use crate::executor::TaskExecutor;
use crate::host::PresenceHost;
use crate::indicator::{IndicatorArtifact, StandardIndicatorBuilder};
use crate::permission::{Capability, GrantTable, PermissionGate, Thresholds};
use crate::scheduler::{TaskScheduler, TimerFired};
use crate::task::TaskConfig;

pub const THRESHOLDS: Thresholds = Thresholds {
    base_capability: 33,
    category_declaration: 34,
};

#[derive(Debug, Default)]
pub struct HostRecord {
    pub live: Option<(IndicatorArtifact, Option<u32>)>,
    pub registrations: usize,
    pub deregistrations: usize,
    pub cancelled: Vec<i32>,
    pub fail_register: bool,
}

pub struct RecordingHost(pub Arc<Mutex<HostRecord>>);

impl PresenceHost for RecordingHost {
    fn register(&mut self, artifact: &IndicatorArtifact, platform_flag: Option<u32>) -> Result<()> {
        let mut record = self.0.lock().unwrap();
        if record.fail_register {
            bail!("registration rejected by test host");
        }
        record.registrations += 1;
        record.live = Some((artifact.clone(), platform_flag));
        Ok(())
    }

    fn deregister(&mut self) -> Result<()> {
        let mut record = self.0.lock().unwrap();
        record.deregistrations += 1;
        record.live = None;
        Ok(())
    }

    fn cancel(&mut self, id: i32) -> Result<()> {
        self.0.lock().unwrap().cancelled.push(id);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ExecutorRecord {
    pub dispatched: Vec<String>,
    pub fail: bool,
    /// Task names the executor reports it cannot run.
    pub unknown: Vec<String>,
}

pub struct RecordingExecutor(pub Arc<Mutex<ExecutorRecord>>);

impl TaskExecutor for RecordingExecutor {
    fn dispatch(&mut self, task: &TaskConfig) -> Result<()> {
        let mut record = self.0.lock().unwrap();
        record.dispatched.push(task.task_name.clone());
        if record.fail {
            bail!("executor refused '{}'", task.task_name);
        }
        Ok(())
    }

    fn handles(&self, task_name: &str) -> bool {
        !self.0.lock().unwrap().unknown.iter().any(|t| t == task_name)
    }
}

pub struct Harness {
    pub controller: LifecycleController,
    pub host: Arc<Mutex<HostRecord>>,
    pub executor: Arc<Mutex<ExecutorRecord>>,
    pub events: mpsc::Receiver<DaemonEvent>,
}

/// A controller on OS generation `os_version` with `granted` capabilities,
/// the standard builder, and recording host/executor doubles.
pub fn harness(os_version: u32, granted: &[Capability]) -> Harness {
    let (tx, events) = mpsc::channel(32);
    let host = Arc::new(Mutex::new(HostRecord::default()));
    let executor = Arc::new(Mutex::new(ExecutorRecord::default()));
    let gate = PermissionGate::new(
        THRESHOLDS,
        Box::new(GrantTable::new(os_version, granted.iter().copied())),
    );
    let controller = LifecycleController::new(
        gate,
        Box::new(StandardIndicatorBuilder),
        Box::new(RecordingHost(Arc::clone(&host))),
        Box::new(RecordingExecutor(Arc::clone(&executor))),
        TaskScheduler::new(tx),
    );
    Harness {
        controller,
        host,
        executor,
        events,
    }
}

impl Harness {
    pub fn indicator_live(&self) -> bool {
        self.host.lock().unwrap().live.is_some()
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.executor.lock().unwrap().dispatched.clone()
    }

    pub fn fail_dispatch(&self) {
        self.executor.lock().unwrap().fail = true;
    }

    /// Waits for the next timer fire posted by the controller's scheduler.
    pub async fn next_fire(&mut self) -> TimerFired {
        match self.events.recv().await {
            Some(DaemonEvent::TimerFired(fired)) => fired,
            Some(_) => panic!("unexpected non-timer event"),
            None => panic!("event channel closed"),
        }
    }

    /// Asserts nothing fires within a minute of (paused) time.
    pub async fn assert_no_fire(&mut self) {
        let res = tokio::time::timeout(Duration::from_secs(60), self.events.recv()).await;
        assert!(res.is_err(), "unexpected timer fire");
    }
}
