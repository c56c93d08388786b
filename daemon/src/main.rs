mod config;
mod controller;
mod error;
mod event;
mod executor;
mod host;
mod indicator;
mod ingress;
mod paths;
mod permission;
mod presence;
mod router;
mod scheduler;
mod status;
mod task;
#[cfg(test)]
mod testing;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::controller::LifecycleController;
use crate::executor::ProcessExecutor;
use crate::host::IndicatorFileHost;
use crate::indicator::StandardIndicatorBuilder;
use crate::permission::PermissionGate;
use crate::scheduler::TaskScheduler;

#[tokio::main]
async fn main() {
    // Stdout carries command replies, so all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = paths::app_data_dir();
    if let Err(e) = std::fs::create_dir_all(&app_dir) {
        error!("Failed to create data directory {}: {e}", app_dir.display());
        std::process::exit(1);
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path();
    let initial_config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        error!("Config error (using defaults): {e:#}");
        config::Config::default()
    });

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths::status_file_path();
    let mut current_status = status::DaemonStatus::new();
    status::write_status(&status_path, &current_status);

    let (event_tx, mut event_rx) = mpsc::channel::<event::DaemonEvent>(32);

    // ── Controller ────────────────────────────────────────────────────────────
    let mut controller = LifecycleController::new(
        PermissionGate::new(
            initial_config.thresholds(),
            Box::new(initial_config.grant_table()),
        ),
        Box::new(StandardIndicatorBuilder),
        Box::new(IndicatorFileHost::new(paths::indicator_file_path())),
        Box::new(ProcessExecutor::new(&initial_config.handlers)),
        TaskScheduler::new(event_tx.clone()),
    );

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));
    tokio::spawn(ingress::run(event_tx.clone()));

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(event::DaemonEvent::Shutdown).await;
            }
        });
    }
    drop(event_tx);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %app_dir.display(),
        "presence-daemon started"
    );

    // ── Event loop ────────────────────────────────────────────────────────────
    while let Some(evt) = event_rx.recv().await {
        match evt {
            event::DaemonEvent::Command { line, reply } => {
                let result = router::handle_line(&mut controller, &line);
                current_status.error = match &result {
                    router::Reply::Error { message, .. } => Some(message.clone()),
                    _ => None,
                };
                if !result.is_error() {
                    debug!(?result, "command handled");
                }
                // The bridge may have gone away mid-command; the state change stands.
                let _ = reply.send(result);
            }

            event::DaemonEvent::TimerFired(fired) => {
                if controller.handle_timer(fired) {
                    current_status.last_task_run = Some(chrono::Local::now().to_rfc3339());
                }
            }

            event::DaemonEvent::ConfigReloaded(new_config) => {
                info!("Config reloaded");
                controller.replace_capabilities(
                    new_config.thresholds(),
                    Box::new(new_config.grant_table()),
                );
                controller.replace_executor(Box::new(ProcessExecutor::new(&new_config.handlers)));
            }

            event::DaemonEvent::Shutdown => {
                info!("Shutting down");
                controller.stop_all();
                current_status.sync(&controller);
                current_status.error = None;
                status::write_status(&status_path, &current_status);
                break;
            }
        }

        current_status.sync(&controller);
        status::write_status(&status_path, &current_status);
    }
}
