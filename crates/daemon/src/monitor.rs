//! Progress monitor: translates the transform tool's machine-readable
//! progress stream into [`ProgressEvent`]s on a job's handoff queue.
//!
//! The monitor owns the read side of the transform's progress pipe. It must
//! keep draining that pipe until end-of-input even when nobody consumes the
//! events, otherwise the transform itself would stall on a full OS pipe.

use crate::progress::ProgressEvent;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, warn};

/// Key of the elapsed-time field in the transform's progress output. The
/// value is in microseconds despite the field name.
const ELAPSED_KEY: &str = "out_time_ms";

/// Read the transform's line-oriented progress stream until end-of-input,
/// pushing one `in_progress` event per elapsed-time sample.
///
/// Percent is computed in floating point before truncation, clamped to
/// [0, 100], and forced non-decreasing across the stream. A sample that
/// fails to parse is logged and skipped; it never aborts the monitor.
///
/// Delivery is bounded: an event not accepted within `grace` is dropped so a
/// slow or absent subscriber cannot stall the transform's I/O. Terminating
/// the job is the supervisor's responsibility, not the monitor's.
pub async fn run_monitor<R>(
    reader: R,
    sender: mpsc::Sender<ProgressEvent>,
    total_duration_us: i64,
    grace: Duration,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut last_percent: u8 = 0;
    let mut subscriber_gone = false;

    while let Ok(Some(line)) = lines.next_line().await {
        let Some(value) = line.trim().strip_prefix(ELAPSED_KEY).and_then(|rest| rest.strip_prefix('=')) else {
            continue;
        };

        let elapsed_us: i64 = match value.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(line = %line, error = %e, "skipping unparseable progress sample");
                continue;
            }
        };

        let percent = compute_percent(elapsed_us, total_duration_us).max(last_percent);
        last_percent = percent;

        if subscriber_gone {
            continue;
        }

        match sender
            .send_timeout(ProgressEvent::in_progress(percent), grace)
            .await
        {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                debug!(percent, "progress queue full, dropping sample");
            }
            Err(SendTimeoutError::Closed(_)) => {
                // Keep draining the pipe so the transform never blocks.
                subscriber_gone = true;
            }
        }
    }
}

/// Percent complete for an elapsed-time sample, truncated from a floating
/// point ratio and clamped to [0, 100].
fn compute_percent(elapsed_us: i64, total_duration_us: i64) -> u8 {
    if total_duration_us <= 0 {
        return 0;
    }
    let ratio = elapsed_us as f64 / total_duration_us as f64 * 100.0;
    ratio.clamp(0.0, 100.0) as u8
}
