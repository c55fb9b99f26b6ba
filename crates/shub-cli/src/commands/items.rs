//! Items command - stream the scraped items of a job

use std::path::Path;

use anyhow::Result;
use shub_client::{ShubClient, StreamWindow};

use super::{open_output, write_lines};
use crate::output::OutputContext;

/// Wire format requested from the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemsFormat {
    /// One JSON document per line (`items.jl`)
    JsonLines,
    /// CSV rows (`items.csv`)
    Csv {
        fields: Vec<String>,
        include_headers: bool,
    },
}

/// Write the items of `job_id` to `output` or stdout
pub async fn items(
    client: &ShubClient,
    job_id: &str,
    format: &ItemsFormat,
    window: StreamWindow,
    output: Option<&Path>,
    ctx: &OutputContext,
) -> Result<()> {
    let stream = match format {
        ItemsFormat::JsonLines => client.items_as_json_lines(job_id, window)?,
        ItemsFormat::Csv {
            fields,
            include_headers,
        } => client.items_as_csv(job_id, *include_headers, fields, window)?,
    };

    let mut out = open_output(output)?;
    let progress = write_lines(stream, out.as_mut()).await?;

    if let Some(path) = output {
        ctx.success(&format!(
            "Wrote {} items to {}",
            progress.delivered,
            path.display()
        ));
    }

    Ok(())
}
