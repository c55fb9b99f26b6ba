//! Batch fetcher with bounded fixed-interval retries

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::types::{StreamConfig, StreamRequest};
use crate::transport::{ByteStream, Transport, TransportError};

/// Result of trying to open one batch
pub(crate) enum FetchOutcome {
    Ready(ByteStream),
    Cancelled,
    Exhausted {
        attempts: u32,
        error: TransportError,
    },
}

/// Opens batches of one stream request
pub(crate) struct BatchFetcher<'a> {
    pub transport: &'a dyn Transport,
    pub request: &'a StreamRequest,
    pub config: &'a StreamConfig,
    pub cancel: &'a CancellationToken,
}

impl BatchFetcher<'_> {
    /// Open the batch starting at `offset`, retrying on transport errors and
    /// error statuses. Every backoff pause taken is added to `retries`.
    pub async fn fetch(&self, offset: u64, batch_size: usize, retries: &mut u32) -> FetchOutcome {
        let mut params = self.request.params.clone();
        params.set("offset", offset.to_string());
        if batch_size > 0 {
            params.set("count", batch_size.to_string());
        } else {
            params.remove("count");
        }

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            if self.cancel.is_cancelled() {
                return FetchOutcome::Cancelled;
            }
            debug!(
                resource = %self.request.resource,
                offset,
                count = batch_size,
                attempt,
                "Fetching batch"
            );

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return FetchOutcome::Cancelled,
                result = self.transport.fetch(&self.request.resource, &params) => result,
            };
            let error = match result {
                Ok(response) if !response.is_error() => return FetchOutcome::Ready(response.body),
                Ok(response) => status_error(response.status),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                return FetchOutcome::Exhausted {
                    attempts: attempt,
                    error,
                };
            }
            warn!(
                resource = %self.request.resource,
                offset,
                attempt,
                "Batch fetch failed, retrying in {:?}: {}",
                self.config.retry_interval,
                error
            );
            if !backoff(self.cancel, self.config.retry_interval).await {
                return FetchOutcome::Cancelled;
            }
            *retries += 1;
            attempt += 1;
        }
    }
}

fn status_error(status: u16) -> TransportError {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unknown status");
    TransportError::Status {
        status,
        message: reason.to_string(),
    }
}

/// Sleep for `interval`; false if cancelled first
pub(crate) async fn backoff(cancel: &CancellationToken, interval: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}
