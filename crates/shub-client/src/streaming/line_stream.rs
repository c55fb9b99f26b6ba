//! Consumer handle of a running line stream

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::engine::StreamEngine;
use super::types::{StreamConfig, StreamError, StreamOutcome, StreamProgress, StreamRequest};
use crate::transport::Transport;

/// A lazily produced sequence of records from a paginated API resource
///
/// Implements `Stream<Item = String>`. Records arrive in offset order; the
/// producer runs at most one record ahead of the consumer.
///
/// # Lifecycle
///
/// - Created via `LineStream::spawn()` or one of the `ShubClient` stream methods
/// - Records are consumed via `next_line()` or the `Stream` trait
/// - Once records end, `finish()` reports why: exhausted, cancelled or failed
/// - Dropping the handle cancels the producer
///
/// # Example
///
/// ```ignore
/// let mut lines = client.log_lines("123/1/2", StreamWindow::unbounded())?;
///
/// while let Some(line) = lines.next_line().await {
///     println!("{}", line);
/// }
/// lines.finish().await.into_result()?;
/// ```
pub struct LineStream {
    records: mpsc::Receiver<String>,
    outcome: oneshot::Receiver<StreamOutcome>,
    cancel: CancellationToken,
}

impl fmt::Debug for LineStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl LineStream {
    /// Start streaming `request` through `transport` on the current runtime
    pub fn spawn(
        transport: Arc<dyn Transport>,
        request: StreamRequest,
        config: StreamConfig,
    ) -> Self {
        Self::spawn_with_token(transport, request, config, CancellationToken::new())
    }

    /// Like [`LineStream::spawn`], cancelled whenever `cancel` is
    ///
    /// The stream runs on a child of `cancel`; finishing or dropping it never
    /// cancels `cancel` itself.
    pub fn spawn_with_token(
        transport: Arc<dyn Transport>,
        request: StreamRequest,
        config: StreamConfig,
        cancel: CancellationToken,
    ) -> Self {
        let cancel = cancel.child_token();
        let (tx, records) = mpsc::channel(1);
        let (outcome_tx, outcome) = oneshot::channel();

        let resource = request.resource.clone();
        let engine = StreamEngine {
            transport,
            request,
            config,
            cancel: cancel.clone(),
        };

        tokio::spawn(async move {
            let outcome = engine.run(tx).await;
            match &outcome {
                StreamOutcome::Exhausted(p) => debug!(
                    resource = %resource,
                    offset = p.offset,
                    delivered = p.delivered,
                    "Stream exhausted"
                ),
                StreamOutcome::Cancelled(p) => {
                    debug!(resource = %resource, offset = p.offset, "Stream cancelled")
                }
                StreamOutcome::Failed(e) => warn!(resource = %resource, "Stream failed: {}", e),
            }
            let _ = outcome_tx.send(outcome);
        });

        Self {
            records,
            outcome,
            cancel,
        }
    }

    /// Get the next record
    ///
    /// Returns `None` when the stream has ended for any reason.
    pub async fn next_line(&mut self) -> Option<String> {
        <Self as StreamExt>::next(self).await
    }

    /// Ask the producer to stop; records already handed over stay valid
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the terminal outcome
    ///
    /// Meant to be called after `next_line()` returned `None`; calling it
    /// earlier abandons the remaining records.
    pub async fn finish(mut self) -> StreamOutcome {
        self.records.close();
        // No-op once records have ended; the producer has already returned
        self.cancel.cancel();
        match (&mut self.outcome).await {
            Ok(outcome) => outcome,
            Err(_) => StreamOutcome::Failed(StreamError::Interrupted),
        }
    }

    /// Collect every remaining record, failing if the stream does
    pub async fn read_all(mut self) -> Result<(Vec<String>, StreamProgress), StreamError> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await {
            lines.push(line);
        }
        let progress = self.finish().await.into_result()?;
        Ok((lines, progress))
    }
}

impl Stream for LineStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.records.poll_recv(cx)
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
