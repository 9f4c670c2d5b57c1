//! # Møteplan
//!
//! Collects upcoming public meetings (councils, committees, boards) from
//! municipal publishing platforms and delivers one consolidated schedule per
//! notification pipeline.
//!
//! ## Features
//!
//! - Parsers for the platforms in use across the region: ACOS, Onacos,
//!   Elements Cloud, OpenGov 360online and the Bymiljøpakken aggregator
//! - Static or rendered retrieval per source, with retry and politeness delay
//! - Merge, deduplication and a look-ahead window per pipeline
//! - A fallback schedule so a pipeline never delivers nothing
//! - Slack delivery, plus optional JSON reports
//!
//! ## Usage
//!
//! ```sh
//! moteplan --mode forced --pipeline standard -j ./reports
//! ```
//!
//! ## Architecture
//!
//! For every enabled pipeline:
//! 1. **Selection**: the pipeline's groups pick sources from the registry
//! 2. **Extraction**: sources are fetched and parsed concurrently, failures isolated
//! 3. **Merge**: window filter, deduplication, ordering; fallback if nothing is left
//! 4. **Delivery**: Slack message (printed in debug mode) and JSON report

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod dates;
mod error;
mod fallback;
mod merge;
mod models;
mod orchestrator;
mod outputs;
mod registry;
mod resolver;
mod scrapers;
mod transport;
mod utils;

use cli::Cli;
use models::PipelineConfig;
use orchestrator::RunContext;
use outputs::json;
use outputs::slack::{self, DeliveryMode};
use registry::SourceRegistry;
use resolver::PipelineResolver;
use transport::{HttpTransport, RetryTransport, Transport};
use utils::ensure_writable_dir;

const FETCH_RETRIES: usize = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!("moteplan starting up");

    let args = Cli::parse();
    debug!(
        mode = ?args.mode,
        pipelines = ?args.pipeline,
        json_output_dir = ?args.json_output_dir,
        "Parsed CLI arguments"
    );

    // Early check: JSON report dir must be writable before any fetching
    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir,
                error = %e,
                "JSON output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let registry = SourceRegistry::load(args.registry.as_deref()).await?;
    let pipelines = registry::load_pipelines(args.pipelines.as_deref()).await?;
    let selected = select_pipelines(pipelines, &args.pipeline, args.days_ahead)?;
    if selected.is_empty() {
        warn!("No enabled pipelines; nothing to do");
        return Ok(());
    }

    let transport = RetryTransport::new(
        HttpTransport::new(
            Duration::from_secs(args.timeout_secs),
            args.render_endpoint.as_deref(),
        )?,
        FETCH_RETRIES,
        RETRY_BASE_DELAY,
    );
    let mut ctx = RunContext::new(Local::now().date_naive());
    ctx.politeness_delay = Duration::from_millis(args.delay_ms);
    ctx.source_timeout = Duration::from_secs(args.timeout_secs);
    ctx.concurrency = args.concurrency.max(1);
    info!(
        today = %ctx.today,
        pipelines = selected.len(),
        mode = ?args.mode,
        renderer = args.render_endpoint.is_some(),
        "Run context ready"
    );

    let webhook_client = reqwest::Client::new();
    let resolver = PipelineResolver::new(&registry, &transport, &ctx);

    let mut resolved = 0usize;
    let mut undelivered = 0usize;
    let mut failed = 0usize;
    for pipeline in &selected {
        match run_pipeline(
            &resolver,
            pipeline,
            args.mode,
            &webhook_client,
            args.json_output_dir.as_deref(),
            |name| std::env::var(name).ok(),
        )
        .await
        {
            Ok(delivery) => {
                resolved += 1;
                if delivery == Delivery::Failed {
                    undelivered += 1;
                }
            }
            Err(e) => {
                error!(pipeline = %pipeline.name, error = %e, "Pipeline failed");
                failed += 1;
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        resolved,
        undelivered,
        failed,
        "Execution complete"
    );

    if resolved == 0 {
        return Err(format!("all {failed} pipeline(s) failed").into());
    }
    Ok(())
}

/// What happened to a resolved pipeline's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Posted,
    Printed,
    /// The webhook rejected or never received the message.
    Failed,
}

/// Enabled pipelines, or exactly the requested ones (enabled or not), with
/// the window override applied.
fn select_pipelines(
    pipelines: Vec<PipelineConfig>,
    requested: &[String],
    days_ahead: Option<u32>,
) -> Result<Vec<PipelineConfig>, Box<dyn Error>> {
    if let Some(unknown) = requested
        .iter()
        .find(|name| !pipelines.iter().any(|p| &p.name == *name))
    {
        return Err(format!("unknown pipeline {unknown:?}").into());
    }
    Ok(pipelines
        .into_iter()
        .filter(|p| {
            if requested.is_empty() {
                p.enabled
            } else {
                requested.contains(&p.name)
            }
        })
        .map(|mut p| {
            if let Some(days) = days_ahead {
                p.days_ahead = days;
            }
            p
        })
        .collect())
}

/// Resolve one pipeline and deliver its message.
///
/// # Arguments
///
/// * `lookup` - Reads the pipeline's destination variable (the process
///   environment outside tests).
///
/// # Returns
///
/// How the message was delivered. A failed post still counts as a resolved
/// pipeline.
///
/// # Errors
///
/// Configuration errors: a missing destination in forced mode, or groups
/// that select no source.
#[instrument(level = "info", skip_all, fields(pipeline = %pipeline.name))]
async fn run_pipeline<T: Transport>(
    resolver: &PipelineResolver<'_, T>,
    pipeline: &PipelineConfig,
    mode: DeliveryMode,
    client: &reqwest::Client,
    json_output_dir: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Delivery, Box<dyn Error>> {
    // Resolve the webhook first so a misconfigured pipeline fetches nothing
    let webhook = match mode {
        DeliveryMode::Forced => Some(slack::destination(pipeline, lookup)?),
        DeliveryMode::Debug => None,
    };

    let res = resolver.resolve(pipeline).await?;

    if let Some(dir) = json_output_dir {
        if let Err(e) = json::write_report(&res, dir).await {
            error!(error = %e, "Failed to write JSON report");
        }
    }

    let text = slack::render_message(&res, &pipeline.description);
    let Some(url) = webhook else {
        info!("Debug mode: printing instead of posting");
        println!("{text}");
        return Ok(Delivery::Printed);
    };
    match slack::post(client, &url, &text).await {
        Ok(()) => Ok(Delivery::Posted),
        Err(e) => {
            error!(error = %e, "Slack delivery failed");
            Ok(Delivery::Failed)
        }
    }
}
