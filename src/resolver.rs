//! Pipeline resolution: from a pipeline definition to its final schedule.
//!
//! For one pipeline the resolver selects the sources of its groups, runs the
//! extraction, merges and windows the result and, when live data yields
//! nothing usable, substitutes the fallback schedule. Pipelines share the
//! registry and transport read-only and are resolved independently.

use crate::error::ConfigurationError;
use crate::fallback;
use crate::merge::{DateWindow, merge_and_filter};
use crate::models::{Meeting, PipelineConfig};
use crate::orchestrator::{ExtractionReport, RunContext, extract};
use crate::registry::SourceRegistry;
use crate::transport::Transport;
use tracing::{info, instrument, warn};

/// Final schedule of one pipeline plus how it was obtained.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub pipeline: String,
    pub window: DateWindow,
    /// Windowed, deduplicated and sorted.
    pub meetings: Vec<Meeting>,
    pub used_fallback: bool,
    /// Names of every organization the pipeline covers, in registry order.
    pub organizations: Vec<String>,
    pub extraction: ExtractionReport,
}

pub struct PipelineResolver<'a, T> {
    registry: &'a SourceRegistry,
    transport: &'a T,
    ctx: &'a RunContext,
}

impl<'a, T: Transport> PipelineResolver<'a, T> {
    pub fn new(registry: &'a SourceRegistry, transport: &'a T, ctx: &'a RunContext) -> Self {
        Self {
            registry,
            transport,
            ctx,
        }
    }

    /// Resolve one pipeline.
    ///
    /// Live meetings are used unless the windowed result is empty or every
    /// source failed; then the fallback schedule is delivered instead.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError`] when the pipeline's groups do not select any
    /// source. Source failures are never errors here.
    #[instrument(level = "info", skip_all, fields(pipeline = %pipeline.name))]
    pub async fn resolve(&self, pipeline: &PipelineConfig) -> Result<Resolution, ConfigurationError> {
        let sources = self.registry.select(pipeline)?;
        let window = DateWindow::new(self.ctx.today, pipeline.days_ahead);
        info!(sources = sources.len(), window = %window, "Resolving pipeline");

        let extraction = extract(&sources, self.transport, self.ctx).await;
        let merged = merge_and_filter(extraction.meetings().cloned(), &window);

        let used_fallback = merged.is_empty() || extraction.all_failed();
        let meetings = if used_fallback {
            warn!(
                failed = extraction.failed(),
                sources = extraction.sources.len(),
                "No live meetings in window; using fallback schedule"
            );
            merge_and_filter(fallback::provide(&window), &window)
        } else {
            merged
        };

        let mut organizations: Vec<String> = Vec::new();
        for source in &sources {
            if !organizations.contains(&source.name) {
                organizations.push(source.name.clone());
            }
        }

        info!(count = meetings.len(), used_fallback, "Pipeline resolved");
        Ok(Resolution {
            pipeline: pipeline.name.clone(),
            window,
            meetings,
            used_fallback,
            organizations,
            extraction,
        })
    }
}
