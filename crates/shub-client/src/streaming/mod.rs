//! Resilient paginated line streams
//!
//! The API serves items, logs and job listings as newline-delimited records in
//! bounded pages selected with `offset` and `count`. A [`LineStream`] walks
//! those pages on a background task and exposes the records as one continuous
//! sequence:
//!
//! - each page is fetched with a bounded number of attempts and a fixed pause
//!   between them
//! - a page that breaks after delivering some records resumes at the first
//!   record not yet delivered
//! - a page shorter than requested ends the stream
//!
//! # Example
//!
//! ```no_run
//! use shub_client::{ShubClient, StreamWindow};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ShubClient::new("https://dash.scrapinghub.com/api/", "APIKEY")?;
//!
//! let mut items = client.items_as_json_lines("123/1/2", StreamWindow::new(0, 2500))?;
//!
//! while let Some(line) = items.next().await {
//!     println!("{}", line);
//! }
//!
//! // Records ended; find out whether that was success
//! let progress = items.finish().await.into_result()?;
//! println!("next offset: {}", progress.offset);
//! # Ok(())
//! # }
//! ```

mod cursor;
mod engine;
mod fetcher;
mod line_stream;
mod scanner;
mod types;

pub use line_stream::LineStream;
pub use types::{
    ScanError, StreamConfig, StreamError, StreamOutcome, StreamProgress, StreamRequest,
    StreamResult, DEFAULT_BATCH_SIZE, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_LINE_BYTES,
    DEFAULT_RETRY_INTERVAL,
};
