/// Timer scheduling for task runs.
///
/// The scheduler holds at most one armed timer: either a pending one-shot or a
/// recurring loop, never both. Timers run as tokio tasks that only sleep and
/// then post [`DaemonEvent::TimerFired`] back onto the event loop, so the work
/// itself always executes on the same timeline as every other command.
///
/// Each arm gets a fresh [`TimerToken`]. [`TaskScheduler::accept`] rejects fires
/// whose token is no longer current, which covers a timer that elapsed just as
/// it was being disarmed.
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::event::DaemonEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    Once,
    Loop { interval: Duration },
}

/// Delivered to the event loop when an armed timer elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    token: TimerToken,
}

impl TimerFired {
    pub fn token(&self) -> TimerToken {
        self.token
    }
}

struct Armed {
    token: TimerToken,
    mode: TimerMode,
    handle: JoinHandle<()>,
}

pub struct TaskScheduler {
    tx: mpsc::Sender<DaemonEvent>,
    next_token: u64,
    armed: Option<Armed>,
}

impl TaskScheduler {
    pub fn new(tx: mpsc::Sender<DaemonEvent>) -> Self {
        Self {
            tx,
            next_token: 0,
            armed: None,
        }
    }

    /// Schedules one fire after `delay`, replacing anything already armed.
    pub fn schedule_once(&mut self, delay: Duration) -> TimerToken {
        self.arm(TimerMode::Once, delay)
    }

    /// Arms a recurring loop, replacing anything already armed. The first fire
    /// comes on the next turn of the event loop; [`rearm_loop`] schedules each
    /// following one.
    ///
    /// [`rearm_loop`]: TaskScheduler::rearm_loop
    pub fn arm_loop(&mut self, interval: Duration) -> TimerToken {
        self.arm(TimerMode::Loop { interval }, Duration::ZERO)
    }

    /// Schedules the next iteration of the armed loop. Returns `false` when no
    /// loop is armed.
    pub fn rearm_loop(&mut self) -> bool {
        match self.armed.as_ref().map(|a| a.mode) {
            Some(mode @ TimerMode::Loop { interval }) => {
                self.arm(mode, interval);
                true
            }
            _ => false,
        }
    }

    /// Cancels whatever is armed. Idempotent.
    pub fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.handle.abort();
            debug!(token = armed.token.0, "timer disarmed");
        }
    }

    /// Checks a fire against the armed timer. Returns the timer's mode when the
    /// fire is current, `None` when it is stale. A one-shot is cleared on
    /// acceptance; a loop stays armed until disarmed.
    pub fn accept(&mut self, fired: TimerFired) -> Option<TimerMode> {
        let armed = self.armed.as_ref().filter(|a| a.token == fired.token)?;
        let mode = armed.mode;
        if mode == TimerMode::Once {
            self.armed = None;
        }
        Some(mode)
    }

    pub fn is_loop_armed(&self) -> bool {
        matches!(
            self.armed,
            Some(Armed { mode: TimerMode::Loop { .. }, .. })
        )
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    fn arm(&mut self, mode: TimerMode, delay: Duration) -> TimerToken {
        self.disarm();

        self.next_token += 1;
        let token = TimerToken(self.next_token);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            // The receiver is gone only during shutdown; nothing left to notify.
            let _ = tx.send(DaemonEvent::TimerFired(TimerFired { token })).await;
        });

        debug!(token = token.0, ?mode, delay_ms = delay.as_millis() as u64, "timer armed");
        self.armed = Some(Armed { token, mode, handle });
        token
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}
