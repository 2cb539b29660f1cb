//! Output routing for a worker's captured streams.
//!
//! Stdout is line oriented: every complete line becomes a log record tagged
//! with the worker id. Stderr is collected as raw fragments on the record
//! and only surfaced when the worker exits abnormally.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::worker::{WorkerEvent, WorkerEventSender, WorkerRecord};

const STDERR_CHUNK: usize = 4096;

/// Normalize one stdout line; blank lines are dropped.
#[must_use]
pub fn format_log_line(raw: &str) -> Option<String> {
    let line = raw.trim_end();
    if line.trim().is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Forward every stdout line as a [`WorkerEvent::Log`].
///
/// Lines are split on raw bytes and decoded lossily, so invalid UTF-8 never
/// ends the stream.
pub async fn pump_stdout<R>(stdout: R, id: u32, events: WorkerEventSender)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let Some(message) = format_log_line(&String::from_utf8_lossy(&buf)) else {
                    continue;
                };
                tracing::trace!(id, %message, "Worker stdout");
                if events.send(WorkerEvent::Log { id, message }).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(id, error = %e, "Worker stdout read failed");
                break;
            }
        }
    }
}

/// Append every stderr fragment to the record's error buffer.
pub async fn pump_stderr<R>(mut stderr: R, record: Arc<WorkerRecord>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; STDERR_CHUNK];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                tracing::trace!(
                    id = record.id(),
                    fragment = %String::from_utf8_lossy(&buf[..n]),
                    "Worker stderr"
                );
                record.append_error(&buf[..n]);
            }
            Err(e) => {
                tracing::debug!(id = record.id(), error = %e, "Worker stderr read failed");
                break;
            }
        }
    }
}
