//! Command implementations

mod items;
mod jobinfo;
pub mod jobs;
mod log;

pub use items::{items, ItemsFormat};
pub use jobinfo::jobinfo;
pub use jobs::jobs;
pub use log::log;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use shub_client::{LineStream, StreamProgress};

/// Open `-O` target or stdout for record output
pub(crate) fn open_output(path: Option<&Path>) -> Result<Box<dyn Write + Send>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

/// Copy every record of `stream` to `out`, one per line
///
/// Fails when the stream ended in a terminal failure, after the records it
/// delivered have been written. A closed pipe on `out` cancels the stream
/// quietly.
pub(crate) async fn write_lines(
    mut stream: LineStream,
    out: &mut (dyn Write + Send),
) -> Result<StreamProgress> {
    let mut pipe_closed = false;
    while let Some(line) = stream.next_line().await {
        if let Err(e) = writeln!(out, "{}", line) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                stream.cancel();
                pipe_closed = true;
                break;
            }
            return Err(e).context("Failed to write output");
        }
    }

    if !pipe_closed {
        match out.flush() {
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => {
                return Err(e).context("Failed to write output");
            }
            _ => {}
        }
    }

    let progress = stream.finish().await.into_result()?;
    Ok(progress)
}
