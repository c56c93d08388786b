use tokio::sync::oneshot;

use crate::config::Config;
use crate::router::Reply;
use crate::scheduler::TimerFired;

pub enum DaemonEvent {
    /// One raw command line from the host application; the reply goes back
    /// on `reply` once the router has handled it.
    Command {
        line: String,
        reply: oneshot::Sender<Reply>,
    },
    /// A scheduler timer elapsed. Stale fires are recognised by their token.
    TimerFired(TimerFired),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C or stdin closed; tear everything down and exit.
    Shutdown,
}
