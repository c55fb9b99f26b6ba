//! Jobinfo command - show the details of a single job

use anyhow::Result;
use shub_client::ShubClient;

use crate::output::OutputContext;

/// Show job details
pub async fn jobinfo(client: &ShubClient, job_id: &str, ctx: &OutputContext) -> Result<()> {
    let job = client.job_info(job_id).await?;

    let mut args: Vec<String> = job
        .spider_args
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    args.sort();

    let pairs = vec![
        ("ID", job.id.clone()),
        ("Spider", job.spider.clone()),
        ("State", job.state.clone()),
        ("Close reason", job.close_reason.clone().unwrap_or_default()),
        ("Items", job.items_scraped.to_string()),
        ("Errors", job.errors_count.to_string()),
        ("Responses", job.responses_received.to_string()),
        ("Log lines", job.logs.to_string()),
        ("Priority", job.priority.to_string()),
        ("Started", job.started_time.clone().unwrap_or_default()),
        ("Updated", job.updated_time.clone().unwrap_or_default()),
        ("Version", job.version.clone().unwrap_or_default()),
        ("Tags", job.tags.join(", ")),
        ("Arguments", args.join(" ")),
    ];

    ctx.print_kv(&pairs);
    Ok(())
}
