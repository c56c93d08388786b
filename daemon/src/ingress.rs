/// Stdin/stdout bridge for host-application commands.
///
/// Reads newline-delimited JSON commands from stdin, forwards each one to the
/// event loop, and writes the reply as one JSON line to stdout. Commands are
/// handled strictly in arrival order: the next line is not read until the
/// previous reply has been written.
///
/// Stdout is reserved for replies; diagnostics go through `tracing` to stderr.
use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::event::DaemonEvent;

/// Runs the bridge on the process's stdin/stdout until stdin closes, then asks
/// the daemon to shut down.
pub async fn run(tx: mpsc::Sender<DaemonEvent>) {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    if let Err(e) = serve(stdin, stdout, &tx).await {
        warn!("Command bridge stopped: {e:#}");
    }
    info!("stdin closed; shutting down");
    let _ = tx.send(DaemonEvent::Shutdown).await;
}

/// Pumps commands from `reader` to the event loop and replies to `writer`.
/// Returns when the reader is exhausted or the event loop has gone away.
pub async fn serve<R, W>(reader: R, mut writer: W, tx: &mpsc::Sender<DaemonEvent>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read command")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let event = DaemonEvent::Command {
            line: line.to_string(),
            reply: reply_tx,
        };
        if tx.send(event).await.is_err() {
            break;
        }
        let Ok(reply) = reply_rx.await else {
            break;
        };

        let mut json = serde_json::to_string(&reply).context("Failed to serialize reply")?;
        json.push('\n');
        writer
            .write_all(json.as_bytes())
            .await
            .context("Failed to write reply")?;
        writer.flush().await.context("Failed to flush reply")?;
    }
    Ok(())
}
