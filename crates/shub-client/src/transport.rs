//! Transport capability consumed by the line-stream engine

use std::fmt;
use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use thiserror::Error;

use crate::types::QueryParams;

/// Body of one HTTP exchange, consumed chunk by chunk
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Status code and live body of a GET against an API resource
pub struct BatchResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl BatchResponse {
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self { status, body }
    }

    /// Response whose body is already fully known
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let chunk: Bytes = body.into();
        Self {
            status,
            body: Box::pin(stream::once(async move { Ok(chunk) })),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

impl fmt::Debug for BatchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Errors raised while obtaining a batch
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Server answered with an error status
    #[error("Server error {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection failed
    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Authenticated GET against a named API resource
///
/// Implementations are shared between concurrent streams through `Arc`, so
/// they must be safe for concurrent use.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        resource: &str,
        params: &QueryParams,
    ) -> Result<BatchResponse, TransportError>;
}
