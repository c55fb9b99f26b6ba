//! Scrapinghub Client Library
//!
//! Provides a typed HTTP client for the Scrapinghub job API, centred on
//! resilient paginated line streams (items, logs, job listings).
//!
//! # Example
//!
//! ```rust,no_run
//! use shub_client::{ShubClient, StreamWindow};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ShubClient::new("https://dash.scrapinghub.com/api/", "APIKEY")?;
//!
//!     // Every log line of a job
//!     let mut log = client.log_lines("123/1/2", StreamWindow::unbounded())?;
//!     while let Some(line) = log.next_line().await {
//!         println!("{}", line);
//!     }
//!     log.finish().await.into_result()?;
//!
//!     // Job metadata
//!     let job = client.job_info("123/1/2").await?;
//!     println!("{} is {}", job.id, job.state);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Custom Transports
//!
//! The stream engine only needs something implementing [`Transport`]; any
//! shared HTTP stack (or an in-memory fake) can drive a [`LineStream`]:
//!
//! ```rust,ignore
//! let stream = LineStream::spawn(Arc::new(my_transport), request, StreamConfig::default());
//! ```
//!
//! # Testing
//!
//! The `testing` module runs an axum router on an ephemeral port:
//!
//! ```rust,ignore
//! use shub_client::testing::TestServer;
//!
//! let server = TestServer::start(router).await?;
//! let lines = server.client.log_lines("1/2/3", StreamWindow::unbounded())?;
//! ```

mod client;
mod error;
pub mod streaming;
pub mod testing;
mod transport;
mod types;

pub use client::{ShubClient, DEFAULT_API_URL, USER_AGENT};
pub use error::{Result, ShubClientError};
pub use transport::{BatchResponse, ByteStream, Transport, TransportError};
pub use types::*;

// Re-export streaming types for convenience
pub use streaming::{LineStream, StreamConfig, StreamError, StreamOutcome, StreamProgress, StreamRequest};
