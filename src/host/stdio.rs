//! Newline-delimited JSON bridge between the native shell and the session.
//!
//! Reads `CommandEnvelope` lines from the input, routes them through
//! [`HostRouter`], and writes `ResponseEnvelope` lines to the output. Every
//! published session snapshot is written as a `session.snapshot` event.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::error::{GhostwireError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope, SNAPSHOT_EVENT};
use crate::host::router::HostRouter;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Run the bridge on the process's stdin and stdout.
///
/// # Errors
///
/// Returns an error if stdin cannot be read or stdout cannot be written.
pub async fn run_stdio_bridge(router: HostRouter) -> Result<()> {
    run_bridge(router, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Run the bridge until the input closes or `runtime.stop` is received.
///
/// Two tasks operate concurrently:
///
/// 1. **Reader** -- reads command lines, routes each one and writes the
///    response.
/// 2. **Snapshot forwarder** -- writes an event for every snapshot the
///    session publishes.
///
/// # Errors
///
/// Returns an error if the input cannot be read or the output cannot be
/// written.
pub async fn run_bridge<R, W>(router: HostRouter, input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer: SharedWriter<W> = Arc::new(Mutex::new(BufWriter::new(output)));

    let event_writer = Arc::clone(&writer);
    let mut snapshots = router.session().subscribe();
    let event_handle = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            let payload = match serde_json::to_value(&snapshot) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize snapshot; skipping");
                    continue;
                }
            };
            let event = EventEnvelope::new(uuid::Uuid::new_v4().to_string(), SNAPSHOT_EVENT, payload);
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                    continue;
                }
            };
            let mut w = event_writer.lock().await;
            if let Err(e) = write_line(&mut w, &json).await {
                tracing::warn!(
                    error = %e,
                    "failed to write event envelope; stopping snapshot forwarder"
                );
                break;
            }
        }
        tracing::debug!("snapshot forwarder stopped");
    });

    let reader_result = run_reader(&router, input, Arc::clone(&writer)).await;

    event_handle.abort();
    let _ = event_handle.await;

    reader_result
}

/// Read input line-by-line, dispatch each command, and write responses.
async fn run_reader<R, W>(router: &HostRouter, input: R, writer: SharedWriter<W>) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(input);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| GhostwireError::Channel(format!("failed to read command input: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("command input closed (EOF); shutting down host bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse command envelope");
                let response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                write_response(&writer, &response).await?;
                continue;
            }
        };

        let is_stop = envelope.command == CommandName::RuntimeStop;
        tracing::debug!(
            request_id = %envelope.request_id,
            command = envelope.command.as_str(),
            "host command"
        );

        let response = match router.route(&envelope).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "host command dispatch failed");
                ResponseEnvelope::error(envelope.request_id.clone(), format!("dispatch failed: {e}"))
            }
        };
        write_response(&writer, &response).await?;

        if is_stop {
            tracing::info!("runtime.stop received; shutting down host bridge");
            break;
        }
    }

    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &SharedWriter<W>,
    response: &ResponseEnvelope,
) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| GhostwireError::Host(format!("failed to serialize response envelope: {e}")))?;
    let mut w = writer.lock().await;
    write_line(&mut w, &json).await
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| GhostwireError::Channel(format!("failed to write output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| GhostwireError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| GhostwireError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
