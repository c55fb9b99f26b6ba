//! Types for paginated line streams

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportError;
use crate::types::{QueryParams, StreamWindow};

/// Largest number of records requested by one batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;
/// Attempts allowed per batch before the stream fails
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Fixed wait between attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);
/// Longest accepted record
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Tunables of the stream engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub batch_size: usize,
    pub max_attempts: u32,
    #[serde(with = "duration_secs")]
    pub retry_interval: Duration,
    pub max_line_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// What to stream: resource, fixed parameters and window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub resource: String,
    pub params: QueryParams,
    pub offset: u64,
    /// Zero or negative streams until the server has no more data
    pub count: i64,
}

impl StreamRequest {
    pub fn new(resource: impl Into<String>, params: QueryParams) -> Self {
        Self {
            resource: resource.into(),
            params,
            offset: 0,
            count: 0,
        }
    }

    pub fn window(mut self, window: StreamWindow) -> Self {
        self.offset = window.offset;
        self.count = window.count;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn count(mut self, count: i64) -> Self {
        self.count = count;
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.count > 0
    }
}

/// Position and totals of a stream when it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamProgress {
    /// Offset of the next record not yet consumed from the server
    pub offset: u64,
    /// Records handed to the consumer
    pub delivered: u64,
    /// Batches successfully opened
    pub batches: u32,
    /// Backoff pauses taken
    pub retries: u32,
}

/// Terminal state of a stream; exactly one per stream
#[derive(Debug)]
pub enum StreamOutcome {
    /// Every requested record was delivered, or the server ran out
    Exhausted(StreamProgress),
    /// The consumer abandoned the stream
    Cancelled(StreamProgress),
    /// A retry budget ran out
    Failed(StreamError),
}

impl StreamOutcome {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }

    pub fn progress(&self) -> Option<StreamProgress> {
        match self {
            Self::Exhausted(p) | Self::Cancelled(p) => Some(*p),
            Self::Failed(e) => Some(e.progress()),
        }
    }

    pub fn into_result(self) -> StreamResult<StreamProgress> {
        match self {
            Self::Exhausted(p) | Self::Cancelled(p) => Ok(p),
            Self::Failed(e) => Err(e),
        }
    }
}

/// Reasons a batch body could not be scanned
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Terminal stream failures
#[derive(Debug, Error)]
pub enum StreamError {
    /// Every attempt to open a batch failed
    #[error("max retries reached ({attempts}) fetching batch at offset {}: {source}", .progress.offset)]
    ConnectionExhausted {
        attempts: u32,
        progress: StreamProgress,
        #[source]
        source: TransportError,
    },

    /// Batches kept failing without producing a single record
    #[error("max retries reached ({attempts}) scanning batch at offset {}: {source}", .progress.offset)]
    ScanExhausted {
        attempts: u32,
        progress: StreamProgress,
        #[source]
        source: ScanError,
    },

    /// The producer task stopped without reporting an outcome
    #[error("stream producer stopped unexpectedly")]
    Interrupted,
}

impl StreamError {
    /// Where the stream stood when it failed
    pub fn progress(&self) -> StreamProgress {
        match self {
            Self::ConnectionExhausted { progress, .. } | Self::ScanExhausted { progress, .. } => {
                *progress
            }
            Self::Interrupted => StreamProgress::default(),
        }
    }
}

/// Result type for streaming operations
pub type StreamResult<T> = std::result::Result<T, StreamError>;
