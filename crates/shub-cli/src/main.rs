//! shub - command-line client for the Scrapinghub job API
//!
//! Streams job items, logs and job listings page by page, retrying failed
//! pages and resuming interrupted ones where they stopped.

mod commands;
mod config;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shub_client::{ShubClient, StreamWindow};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::ItemsFormat;
use crate::config::{Config, MergedConfig};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "shub")]
#[command(author, version, about = "Scrapinghub job API client")]
#[command(propagate_version = true)]
struct Cli {
    /// API key
    #[arg(long, env = "SHUB_APIKEY", hide_env_values = true)]
    apikey: Option<String>,

    /// API root URL [default: https://dash.scrapinghub.com/api/]
    #[arg(long, env = "SHUB_API_URL")]
    api_url: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "SHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Output format for listings
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Window arguments shared by the streaming commands
#[derive(clap::Args, Debug, Clone, Copy)]
struct WindowArgs {
    /// Number of records to fetch; 0 fetches all
    #[arg(long, default_value_t = 0)]
    count: i64,

    /// Records to skip
    #[arg(long, default_value_t = 0)]
    offset: u64,
}

impl From<WindowArgs> for StreamWindow {
    fn from(args: WindowArgs) -> Self {
        StreamWindow::new(args.offset, args.count)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the items of a job
    Items {
        /// Job ID (project/spider/job)
        job_id: String,

        /// Request CSV instead of JSON Lines
        #[arg(long)]
        csv: bool,

        /// Comma-separated CSV columns
        #[arg(long, value_delimiter = ',', requires = "csv")]
        fields: Vec<String>,

        /// Start CSV output with a header row
        #[arg(long, requires = "csv")]
        include_headers: bool,

        #[command(flatten)]
        window: WindowArgs,

        /// Write to a file instead of stdout
        #[arg(short = 'O', long = "output-file")]
        output_file: Option<PathBuf>,
    },

    /// Print the log of a job
    Log {
        /// Job ID (project/spider/job)
        job_id: String,

        #[command(flatten)]
        window: WindowArgs,

        /// Keep polling for new lines until interrupted
        #[arg(short, long)]
        follow: bool,

        /// Seconds between polls with --follow
        #[arg(long, default_value_t = 5.0)]
        interval: f64,

        /// Write to a file instead of stdout
        #[arg(short = 'O', long = "output-file")]
        output_file: Option<PathBuf>,
    },

    /// List the jobs of a project
    Jobs {
        /// Project ID
        project_id: String,

        /// Filters such as state=finished or spider=books
        #[arg(value_parser = commands::jobs::parse_filter)]
        filters: Vec<(String, String)>,

        #[command(flatten)]
        window: WindowArgs,

        /// Print raw JSON Lines instead of a listing
        #[arg(long)]
        jl: bool,
    },

    /// Show the details of a job
    #[command(name = "jobinfo")]
    JobInfo {
        /// Job ID (project/spider/job)
        job_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging; stdout carries records, so logs go to stderr
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli).await {
        let ctx = OutputContext::new(OutputFormat::Table, false, false);
        ctx.error(&format!("Error: {:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(
        cli.apikey.as_deref(),
        cli.api_url.as_deref(),
        cli.output,
        cli.no_color,
    );

    // Create output context
    let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);

    // First Ctrl+C stops every running stream and lets the command wind
    // down; a second one exits at once
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(130);
        }
        token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    let client = create_client(&merged, cancel.clone())?;

    match &cli.command {
        Commands::Items {
            job_id,
            csv,
            fields,
            include_headers,
            window,
            output_file,
        } => {
            let format = if *csv {
                ItemsFormat::Csv {
                    fields: fields.clone(),
                    include_headers: *include_headers,
                }
            } else {
                ItemsFormat::JsonLines
            };
            commands::items(
                &client,
                job_id,
                &format,
                (*window).into(),
                output_file.as_deref(),
                &ctx,
            )
            .await?;
        }

        Commands::Log {
            job_id,
            window,
            follow,
            interval,
            output_file,
        } => {
            let follow = if *follow {
                Some(
                    Duration::try_from_secs_f64(*interval)
                        .context("--interval must be a non-negative number of seconds")?,
                )
            } else {
                None
            };
            commands::log(
                &client,
                job_id,
                (*window).into(),
                follow,
                output_file.as_deref(),
                &cancel,
                &ctx,
            )
            .await?;
        }

        Commands::Jobs {
            project_id,
            filters,
            window,
            jl,
        } => {
            commands::jobs(&client, project_id, filters, (*window).into(), *jl, &ctx).await?;
        }

        Commands::JobInfo { job_id } => {
            tokio::select! {
                result = commands::jobinfo(&client, job_id, &ctx) => result?,
                _ = cancel.cancelled() => {}
            }
        }
    }

    if cancel.is_cancelled() {
        ctx.warn("Interrupted");
    }

    Ok(())
}

/// Create a client for the merged configuration
fn create_client(config: &MergedConfig, cancel: CancellationToken) -> Result<ShubClient> {
    let Some(apikey) = config.apikey.as_deref() else {
        bail!("No API key given; use --apikey, SHUB_APIKEY or the config file");
    };

    let client = ShubClient::new(&config.api_url, apikey)
        .context("Failed to create Scrapinghub client")?
        .with_stream_config(config.stream.clone())
        .with_cancellation(cancel);
    Ok(client)
}
