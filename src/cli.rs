//! Command-line interface definitions.
//!
//! All options can be given as flags; the ones that usually differ between
//! environments can also come from environment variables.

use crate::outputs::slack::DeliveryMode;
use clap::Parser;

/// Collect upcoming municipal meetings and deliver them per pipeline.
///
/// # Examples
///
/// ```sh
/// # Render every enabled pipeline to stdout
/// moteplan
///
/// # Post the standard pipeline to Slack, keeping a JSON report
/// SLACK_WEBHOOK_URL=https://hooks.slack.com/... moteplan --mode forced -p standard -j ./reports
///
/// # Use a headless renderer for script-built pages
/// moteplan --render-endpoint http://localhost:3000/content
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Source registry YAML (defaults to the bundled registry)
    #[arg(short, long, env = "MOTEPLAN_REGISTRY")]
    pub registry: Option<String>,

    /// Pipeline definitions YAML (defaults to the bundled pipelines)
    #[arg(long, env = "MOTEPLAN_PIPELINES")]
    pub pipelines: Option<String>,

    /// Only run the named pipeline(s); may be repeated
    #[arg(short, long = "pipeline")]
    pub pipeline: Vec<String>,

    /// Override every pipeline's look-ahead window (days)
    #[arg(short, long)]
    pub days_ahead: Option<u32>,

    /// debug renders messages to stdout, forced posts them
    #[arg(short, long, value_enum, env = "DELIVERY_MODE", default_value = "debug")]
    pub mode: DeliveryMode,

    /// Output directory for per-pipeline JSON reports
    #[arg(short, long)]
    pub json_output_dir: Option<String>,

    /// Sources fetched at the same time
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Minimum pause before every request, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub delay_ms: u64,

    /// Time limit per source, in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    /// Headless rendering endpoint for script-built pages
    #[arg(long, env = "RENDER_ENDPOINT")]
    pub render_endpoint: Option<String>,
}
