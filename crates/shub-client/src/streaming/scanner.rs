//! Newline-delimited record scanner
//!
//! Splits one batch body into records and hands each to the consumer as soon
//! as its terminating newline arrives.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::types::ScanError;
use crate::transport::ByteStream;

/// Line splitter state for a single batch
#[derive(Debug)]
pub(crate) struct LineScanner {
    /// Bytes of the line currently being assembled
    buffer: Vec<u8>,
    max_line_bytes: usize,
}

impl LineScanner {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_bytes,
        }
    }

    /// Feed bytes and push every complete line onto `lines`
    ///
    /// Lines completed before an error are still pushed.
    pub fn feed(&mut self, bytes: &[u8], lines: &mut Vec<String>) -> Result<(), ScanError> {
        self.buffer.extend_from_slice(bytes);

        let mut start = 0;
        let mut result = Ok(());
        while let Some(pos) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            match self.take_line(start, end) {
                Ok(line) => lines.push(line),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        result?;

        if self.buffer.len() > self.max_line_bytes {
            return Err(ScanError::LineTooLong {
                limit: self.max_line_bytes,
            });
        }
        Ok(())
    }

    /// Push the unterminated final line at end of data, if any
    pub fn finish(&mut self, lines: &mut Vec<String>) -> Result<(), ScanError> {
        if !self.buffer.is_empty() {
            let end = self.buffer.len();
            lines.push(self.take_line(0, end)?);
            self.buffer.clear();
        }
        Ok(())
    }

    fn take_line(&self, start: usize, end: usize) -> Result<String, ScanError> {
        let mut line = &self.buffer[start..end];
        // Handle \r\n line endings
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        if line.len() > self.max_line_bytes {
            return Err(ScanError::LineTooLong {
                limit: self.max_line_bytes,
            });
        }
        Ok(String::from_utf8_lossy(line).into_owned())
    }
}

/// Hand-off point between the producer and the consumer
pub(crate) struct RecordSink<'a> {
    pub tx: &'a mpsc::Sender<String>,
    pub cancel: &'a CancellationToken,
}

impl RecordSink<'_> {
    /// Wait until the consumer takes `line`; false once the consumer is gone
    pub async fn deliver(&self, line: String) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(line) => sent.is_ok(),
        }
    }
}

/// What happened while draining one batch
#[derive(Debug, Default)]
pub(crate) struct ScanReport {
    /// Records delivered before the batch ended
    pub delivered: u64,
    pub error: Option<ScanError>,
    pub cancelled: bool,
}

/// Drain one batch body into `sink`, stopping after `limit` records
pub(crate) async fn scan_batch(
    mut body: ByteStream,
    max_line_bytes: usize,
    limit: u64,
    sink: &RecordSink<'_>,
) -> ScanReport {
    let mut scanner = LineScanner::new(max_line_bytes);
    let mut report = ScanReport::default();

    let mut lines = Vec::new();

    loop {
        let (result, at_end) = match body.next().await {
            Some(Ok(chunk)) => (scanner.feed(&chunk, &mut lines), false),
            Some(Err(e)) => (Err(ScanError::Io(e)), true),
            None => (scanner.finish(&mut lines), true),
        };

        for line in lines.drain(..) {
            if !sink.deliver(line).await {
                report.cancelled = true;
                return report;
            }
            report.delivered += 1;
            if report.delivered == limit {
                return report;
            }
        }

        if let Err(e) = result {
            trace!("batch scan failed after {} lines: {}", report.delivered, e);
            report.error = Some(e);
            return report;
        }
        if at_end {
            return report;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use std::io;

    fn body(chunks: Vec<io::Result<&'static str>>) -> ByteStream {
        Box::pin(stream::iter(
            chunks
                .into_iter()
                .map(|c| c.map(|s| Bytes::from_static(s.as_bytes()))),
        ))
    }

    #[test]
    fn test_feed_complete_lines() {
        let mut scanner = LineScanner::new(1024);
        let mut lines = Vec::new();
        scanner.feed(b"{\"a\":1}\n{\"b\":2}\r\n", &mut lines).unwrap();
        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn test_feed_chunked_line() {
        let mut scanner = LineScanner::new(1024);
        let mut lines = Vec::new();
        scanner.feed(b"2024-01-01 INFO sta", &mut lines).unwrap();
        assert!(lines.is_empty());
        scanner.feed(b"rted\nnext", &mut lines).unwrap();
        assert_eq!(lines, vec!["2024-01-01 INFO started"]);
        scanner.finish(&mut lines).unwrap();
        assert_eq!(lines, vec!["2024-01-01 INFO started", "next"]);
    }

    #[test]
    fn test_empty_lines_are_records() {
        let mut scanner = LineScanner::new(1024);
        let mut lines = Vec::new();
        scanner.feed(b"a\n\nb\n", &mut lines).unwrap();
        scanner.finish(&mut lines).unwrap();
        assert_eq!(lines, vec!["a", "", "b"]);
    }

    #[test]
    fn test_line_too_long_keeps_earlier_lines() {
        let mut scanner = LineScanner::new(4);
        let mut lines = Vec::new();
        let err = scanner.feed(b"ok\ntoolong\n", &mut lines).unwrap_err();
        assert!(matches!(err, ScanError::LineTooLong { limit: 4 }));
        assert_eq!(lines, vec!["ok"]);

        let mut scanner = LineScanner::new(4);
        assert!(scanner.feed(b"unterminated", &mut lines).is_err());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut scanner = LineScanner::new(16);
        let mut lines = Vec::new();
        scanner.feed(b"a\xffb\n", &mut lines).unwrap();
        assert_eq!(lines, vec!["a\u{fffd}b"]);
    }

    #[tokio::test]
    async fn test_scan_batch_counts_until_error() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let sink = RecordSink {
            tx: &tx,
            cancel: &cancel,
        };

        let report = scan_batch(
            body(vec![
                Ok("l1\nl2\nl3\npartial"),
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            ]),
            1024,
            100,
            &sink,
        )
        .await;

        assert_eq!(report.delivered, 3);
        assert!(matches!(report.error, Some(ScanError::Io(_))));
        drop(tx);
        let mut got = Vec::new();
        while let Some(line) = rx.recv().await {
            got.push(line);
        }
        assert_eq!(got, vec!["l1", "l2", "l3"]);
    }

    #[tokio::test]
    async fn test_scan_batch_honours_limit() {
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let sink = RecordSink {
            tx: &tx,
            cancel: &cancel,
        };

        let report = scan_batch(body(vec![Ok("a\nb\nc\nd\n")]), 1024, 2, &sink).await;
        assert_eq!(report.delivered, 2);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_scan_batch_stops_when_cancelled() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let sink = RecordSink {
            tx: &tx,
            cancel: &cancel,
        };
        cancel.cancel();

        let report = scan_batch(body(vec![Ok("a\nb\n")]), 1024, 10, &sink).await;
        assert!(report.cancelled);
        assert_eq!(report.delivered, 0);
    }
}
