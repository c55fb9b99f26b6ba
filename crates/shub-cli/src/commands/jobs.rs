//! Jobs command - list the jobs of a project

use anyhow::{Context, Result};
use shub_client::{Job, ShubClient, StreamWindow};

use super::{open_output, write_lines};
use crate::output::{JobRow, OutputContext};

/// List jobs of `project_id` matching `filters`
///
/// With `raw`, the JSON Lines documents are passed through unchanged;
/// otherwise they are rendered in the configured output format.
pub async fn jobs(
    client: &ShubClient,
    project_id: &str,
    filters: &[(String, String)],
    window: StreamWindow,
    raw: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let stream = client.jobs_as_json_lines(project_id, filters, window)?;

    if raw {
        let mut out = open_output(None)?;
        write_lines(stream, out.as_mut()).await?;
        return Ok(());
    }

    let (lines, _) = stream.read_all().await?;
    let jobs = parse_jobs(&lines)?;
    let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
    ctx.print(&rows);

    Ok(())
}

fn parse_jobs(lines: &[String]) -> Result<Vec<Job>> {
    lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).with_context(|| format!("Invalid job document: {}", line))
        })
        .collect()
}

/// Parse a `key=value` job filter
pub fn parse_filter(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}
