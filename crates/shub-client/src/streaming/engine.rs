//! Stream engine: fetch a batch, drain it, advance, repeat

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::cursor::Cursor;
use super::fetcher::{backoff, BatchFetcher, FetchOutcome};
use super::scanner::{scan_batch, RecordSink};
use super::types::{StreamConfig, StreamError, StreamOutcome, StreamProgress, StreamRequest};
use crate::transport::Transport;

/// Producer side of one line stream
pub(crate) struct StreamEngine {
    pub transport: Arc<dyn Transport>,
    pub request: StreamRequest,
    pub config: StreamConfig,
    pub cancel: CancellationToken,
}

impl StreamEngine {
    /// Run until exhaustion, failure or cancellation
    ///
    /// `tx` is dropped on return, so the consumer sees end-of-records before
    /// the outcome is published.
    pub async fn run(self, tx: mpsc::Sender<String>) -> StreamOutcome {
        let mut cursor = Cursor::new(
            self.request.offset,
            self.request.count,
            self.config.batch_size,
        );
        let mut progress = StreamProgress {
            offset: cursor.offset(),
            ..StreamProgress::default()
        };
        let max_attempts = self.config.max_attempts.max(1);
        let mut scan_failures = 0;

        let fetcher = BatchFetcher {
            transport: self.transport.as_ref(),
            request: &self.request,
            config: &self.config,
            cancel: &self.cancel,
        };
        let sink = RecordSink {
            tx: &tx,
            cancel: &self.cancel,
        };

        loop {
            let batch_size = cursor.next_batch_size();
            let body = match fetcher
                .fetch(cursor.offset(), batch_size, &mut progress.retries)
                .await
            {
                FetchOutcome::Ready(body) => body,
                FetchOutcome::Cancelled => return StreamOutcome::Cancelled(progress),
                FetchOutcome::Exhausted { attempts, error } => {
                    return StreamOutcome::Failed(StreamError::ConnectionExhausted {
                        attempts,
                        progress,
                        source: error,
                    });
                }
            };
            progress.batches += 1;

            let report = scan_batch(body, self.config.max_line_bytes, batch_size as u64, &sink).await;
            cursor.advance(report.delivered);
            progress.delivered += report.delivered;
            progress.offset = cursor.offset();

            if report.cancelled {
                return StreamOutcome::Cancelled(progress);
            }

            match report.error {
                Some(error) if report.delivered == 0 => {
                    scan_failures += 1;
                    if scan_failures >= max_attempts {
                        return StreamOutcome::Failed(StreamError::ScanExhausted {
                            attempts: scan_failures,
                            progress,
                            source: error,
                        });
                    }
                    warn!(
                        resource = %self.request.resource,
                        offset = progress.offset,
                        "Batch produced no records, retrying in {:?}: {}",
                        self.config.retry_interval,
                        error
                    );
                    if !backoff(&self.cancel, self.config.retry_interval).await {
                        return StreamOutcome::Cancelled(progress);
                    }
                    progress.retries += 1;
                    continue;
                }
                Some(error) => {
                    scan_failures = 0;
                    warn!(
                        resource = %self.request.resource,
                        delivered = report.delivered,
                        offset = progress.offset,
                        "Batch interrupted, resuming: {}",
                        error
                    );
                }
                None => {
                    scan_failures = 0;
                    if report.delivered < batch_size as u64 {
                        debug!(
                            resource = %self.request.resource,
                            delivered = report.delivered,
                            requested = batch_size,
                            "Short batch, no more data"
                        );
                        return StreamOutcome::Exhausted(progress);
                    }
                }
            }

            if cursor.is_done() {
                return StreamOutcome::Exhausted(progress);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use pretty_assertions::assert_eq;

    use crate::streaming::types::ScanError;
    use crate::transport::{BatchResponse, TransportError};
    use crate::types::QueryParams;

    /// One scripted reaction of the fake server
    enum Step {
        /// Serve the requested window, then optionally break after `n` lines
        Serve { fail_after: Option<usize> },
        /// Serve exactly this many lines, ignoring the requested count
        ServeLines(usize),
        Status(u16),
        Refuse,
    }

    /// In-memory transport backed by `total` numbered records
    struct ScriptedTransport {
        total: u64,
        script: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<(u64, Option<u64>)>>,
    }

    impl ScriptedTransport {
        fn new(total: u64, script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                total,
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(u64, Option<u64>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn records(from: u64, n: u64) -> String {
        (from..from + n).map(|i| format!("{{\"n\":{}}}\n", i)).collect()
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn fetch(
            &self,
            _resource: &str,
            params: &QueryParams,
        ) -> Result<BatchResponse, TransportError> {
            let offset: u64 = params.get("offset").unwrap().parse().unwrap();
            let count: Option<u64> = params.get("count").map(|c| c.parse().unwrap());
            self.calls.lock().unwrap().push((offset, count));

            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Step::Serve { fail_after: None });
            let available = self.total.saturating_sub(offset);
            let window = count.map_or(available, |c| c.min(available));

            match step {
                Step::Serve { fail_after: None } => {
                    Ok(BatchResponse::from_bytes(200, records(offset, window)))
                }
                Step::Serve {
                    fail_after: Some(n),
                } => {
                    let chunks: Vec<io::Result<Bytes>> = vec![
                        Ok(Bytes::from(records(offset, n as u64))),
                        Ok(Bytes::from_static(b"{\"n\":trunc")),
                        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "body cut")),
                    ];
                    Ok(BatchResponse::new(200, Box::pin(stream::iter(chunks))))
                }
                Step::ServeLines(n) => Ok(BatchResponse::from_bytes(200, records(offset, n as u64))),
                Step::Status(status) => Ok(BatchResponse::from_bytes(status, "")),
                Step::Refuse => Err(TransportError::Connection("connection refused".into())),
            }
        }
    }

    fn config() -> StreamConfig {
        StreamConfig {
            batch_size: 1000,
            max_attempts: 3,
            retry_interval: Duration::from_secs(30),
            max_line_bytes: 1024,
        }
    }

    async fn run(
        transport: Arc<ScriptedTransport>,
        offset: u64,
        count: i64,
        config: StreamConfig,
    ) -> (Vec<String>, StreamOutcome) {
        let (tx, mut rx) = mpsc::channel(1);
        let engine = StreamEngine {
            transport,
            request: StreamRequest::new("items.jl", QueryParams::new())
                .offset(offset)
                .count(count),
            config,
            cancel: CancellationToken::new(),
        };
        let producer = tokio::spawn(engine.run(tx));

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        (lines, producer.await.unwrap())
    }

    fn numbers(lines: &[String]) -> Vec<u64> {
        lines
            .iter()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                v["n"].as_u64().unwrap()
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_stream_three_batches() {
        let transport = ScriptedTransport::new(10_000, vec![]);
        let (lines, outcome) = run(transport.clone(), 0, 2500, config()).await;

        assert_eq!(numbers(&lines), (0..2500).collect::<Vec<_>>());
        assert_eq!(
            transport.calls(),
            vec![(0, Some(1000)), (1000, Some(1000)), (2000, Some(500))]
        );
        let progress = match outcome {
            StreamOutcome::Exhausted(p) => p,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(progress.offset, 2500);
        assert_eq!(progress.delivered, 2500);
        assert_eq!(progress.batches, 3);
        assert_eq!(progress.retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_absorbed() {
        let transport = ScriptedTransport::new(
            10_000,
            vec![
                Step::Serve { fail_after: None },
                Step::Refuse,
                Step::Status(503),
                Step::Serve { fail_after: None },
            ],
        );
        let started = tokio::time::Instant::now();
        let (lines, outcome) = run(transport.clone(), 0, 2500, config()).await;

        assert_eq!(numbers(&lines), (0..2500).collect::<Vec<_>>());
        let progress = outcome.into_result().unwrap();
        assert_eq!(progress.offset, 2500);
        assert_eq!(progress.retries, 2);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(
            transport.calls(),
            vec![
                (0, Some(1000)),
                (1000, Some(1000)),
                (1000, Some(1000)),
                (1000, Some(1000)),
                (2000, Some(500)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_exhausted_after_max_attempts() {
        let transport = ScriptedTransport::new(
            10_000,
            vec![
                Step::Serve { fail_after: None },
                Step::Status(500),
                Step::Refuse,
                Step::Status(502),
            ],
        );
        let (lines, outcome) = run(transport.clone(), 0, 2500, config()).await;

        assert_eq!(lines.len(), 1000);
        match outcome {
            StreamOutcome::Failed(StreamError::ConnectionExhausted {
                attempts,
                progress,
                source: TransportError::Status { status: 502, .. },
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(progress.offset, 1000);
                assert_eq!(progress.delivered, 1000);
                assert_eq!(progress.retries, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(transport.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batch_resumes_at_delivered_offset() {
        let transport =
            ScriptedTransport::new(10_000, vec![Step::Serve { fail_after: Some(7) }]);
        let (lines, outcome) = run(transport.clone(), 40, 20, config()).await;

        assert_eq!(numbers(&lines), (40..60).collect::<Vec<_>>());
        assert_eq!(transport.calls(), vec![(40, Some(20)), (47, Some(13))]);
        let progress = outcome.into_result().unwrap();
        assert_eq!(progress.offset, 60);
        assert_eq!(progress.retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_exhausted_without_progress() {
        let transport = ScriptedTransport::new(
            10_000,
            vec![
                Step::Serve { fail_after: Some(0) },
                Step::Serve { fail_after: Some(0) },
                Step::Serve { fail_after: Some(0) },
            ],
        );
        let (lines, outcome) = run(transport.clone(), 5, 10, config()).await;

        assert!(lines.is_empty());
        match outcome {
            StreamOutcome::Failed(StreamError::ScanExhausted {
                attempts,
                progress,
                source: ScanError::Io(_),
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(progress.offset, 5);
                assert_eq!(progress.delivered, 0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(transport.calls(), vec![(5, Some(10)); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_failures_reset_after_progress() {
        let transport = ScriptedTransport::new(
            10_000,
            vec![
                Step::Serve { fail_after: Some(0) },
                Step::Serve { fail_after: Some(0) },
                Step::Serve { fail_after: Some(3) },
                Step::Serve { fail_after: Some(0) },
                Step::Serve { fail_after: Some(0) },
            ],
        );
        let (lines, outcome) = run(transport, 0, 10, config()).await;

        assert_eq!(numbers(&lines), (0..10).collect::<Vec<_>>());
        assert!(outcome.is_exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_short_page_ends_stream() {
        let transport = ScriptedTransport::new(2300, vec![]);
        let (lines, outcome) = run(transport.clone(), 0, 0, config()).await;

        assert_eq!(lines.len(), 2300);
        assert_eq!(
            transport.calls(),
            vec![(0, Some(1000)), (1000, Some(1000)), (2000, Some(1000))]
        );
        assert_eq!(outcome.into_result().unwrap().offset, 2300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_empty_resource() {
        let transport = ScriptedTransport::new(0, vec![]);
        let (lines, outcome) = run(transport, 0, -1, config()).await;

        assert!(lines.is_empty());
        let progress = outcome.into_result().unwrap();
        assert_eq!(progress.offset, 0);
        assert_eq!(progress.batches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_page_is_capped() {
        let transport = ScriptedTransport::new(10_000, vec![Step::ServeLines(50)]);
        let (lines, outcome) = run(transport, 0, 30, config()).await;

        assert_eq!(lines.len(), 30);
        assert_eq!(outcome.into_result().unwrap().offset, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuation_from_final_offset() {
        let transport = ScriptedTransport::new(10_000, vec![]);
        let (first, outcome) = run(transport.clone(), 0, 1500, config()).await;
        let offset = outcome.into_result().unwrap().offset;
        let (second, _) = run(transport, offset, 700, config()).await;

        let all: Vec<u64> = numbers(&first).into_iter().chain(numbers(&second)).collect();
        assert_eq!(all, (0..2200).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let transport = ScriptedTransport::new(10, vec![Step::Refuse, Step::Refuse]);
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);
        let engine = StreamEngine {
            transport: transport.clone(),
            request: StreamRequest::new("log.txt", QueryParams::new()),
            config: config(),
            cancel: cancel.clone(),
        };
        let producer = tokio::spawn(engine.run(tx));

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();

        assert!(rx.recv().await.is_none());
        assert!(matches!(
            producer.await.unwrap(),
            StreamOutcome::Cancelled(StreamProgress { delivered: 0, .. })
        ));
        assert_eq!(transport.calls().len(), 1);
    }
}
