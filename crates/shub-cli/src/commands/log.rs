//! Log command - print the log of a job, optionally following it

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use shub_client::{ShubClient, StreamWindow};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{open_output, write_lines};
use crate::output::OutputContext;

/// Write the log of `job_id` to `output` or stdout
///
/// With `follow`, the log is polled again every `follow` interval from where
/// the previous pass ended, until `cancel` fires or a bounded window is
/// used up.
pub async fn log(
    client: &ShubClient,
    job_id: &str,
    window: StreamWindow,
    follow: Option<Duration>,
    output: Option<&Path>,
    cancel: &CancellationToken,
    ctx: &OutputContext,
) -> Result<()> {
    let mut out = open_output(output)?;
    let mut window = window;

    loop {
        let stream = client.log_lines(job_id, window)?;
        let progress = write_lines(stream, out.as_mut()).await?;

        let Some(interval) = follow else {
            break;
        };
        if cancel.is_cancelled() {
            break;
        }
        let Some(next) = next_window(window, progress.offset, progress.delivered) else {
            break;
        };
        window = next;

        debug!(offset = window.offset, "Waiting for new log lines");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    if cancel.is_cancelled() {
        ctx.info("Stopped following log");
    }

    Ok(())
}

/// Window continuing after a pass that ended at `offset` with `delivered`
/// records, or `None` when a bounded window has nothing left
fn next_window(window: StreamWindow, offset: u64, delivered: u64) -> Option<StreamWindow> {
    if window.count <= 0 {
        return Some(StreamWindow::from_offset(offset));
    }
    let delivered = i64::try_from(delivered).unwrap_or(i64::MAX);
    let remaining = window.count.saturating_sub(delivered);
    (remaining > 0).then(|| StreamWindow::new(offset, remaining))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_window_follows_offset() {
        let next = next_window(StreamWindow::unbounded(), 120, 120).unwrap();
        assert_eq!(next.offset, 120);
        assert_eq!(next.count, 0);
    }

    #[test]
    fn test_bounded_window_shrinks() {
        let next = next_window(StreamWindow::new(10, 50), 30, 20).unwrap();
        assert_eq!(next.offset, 30);
        assert_eq!(next.count, 30);
    }

    #[test]
    fn test_bounded_window_used_up() {
        assert!(next_window(StreamWindow::new(0, 50), 50, 50).is_none());
    }
}
