//! JSON report of a resolved pipeline.
//!
//! One file per pipeline and run date, for archiving and for inspecting what
//! each source produced.
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! └── 2025-10-01/
//!     ├── standard.json
//!     └── utvidet.json
//! ```

use crate::models::Meeting;
use crate::orchestrator::SourceStatus;
use crate::resolver::Resolution;
use crate::utils::slugify;
use chrono::NaiveDate;
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Debug, Serialize)]
struct SourceEntry<'a> {
    id: &'a str,
    name: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    meetings: usize,
    /// Meetings from this source in the delivered schedule.
    delivered: usize,
    skipped: usize,
    pages: u32,
}

#[derive(Debug, Serialize)]
struct PipelineReport<'a> {
    pipeline: &'a str,
    window_start: NaiveDate,
    window_end: NaiveDate,
    used_fallback: bool,
    meetings: &'a [Meeting],
    sources: Vec<SourceEntry<'a>>,
}

impl<'a> PipelineReport<'a> {
    fn new(res: &'a Resolution) -> Self {
        let sources = res
            .extraction
            .sources
            .values()
            .map(|r| SourceEntry {
                id: &r.source_id,
                name: &r.name,
                status: r.status.label(),
                detail: match &r.status {
                    SourceStatus::FetchFailed(e) => Some(e.to_string()),
                    SourceStatus::ParseFailed(e) => Some(e.to_string()),
                    _ => None,
                },
                meetings: r.meetings.len(),
                delivered: res
                    .meetings
                    .iter()
                    .filter(|m| m.source_id() == r.source_id)
                    .count(),
                skipped: r.skipped,
                pages: r.pages,
            })
            .collect();
        Self {
            pipeline: &res.pipeline,
            window_start: res.window.start(),
            window_end: res.window.end(),
            used_fallback: res.used_fallback,
            meetings: &res.meetings,
            sources,
        }
    }
}

/// Write the report for `res` to `{json_output_dir}/{window start}/{pipeline}.json`.
///
/// # Arguments
///
/// * `res` - A resolved pipeline.
/// * `json_output_dir` - Root directory; the dated subdirectory is created.
///
/// # Returns
///
/// The path written.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir, pipeline = %res.pipeline))]
pub async fn write_report(res: &Resolution, json_output_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(&PipelineReport::new(res))?;

    let dir = PathBuf::from(json_output_dir).join(res.window.start().to_string());
    if let Err(e) = fs::create_dir_all(&dir).await {
        error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = dir.join(format!("{}.json", slugify(&res.pipeline)));
    fs::write(&path, json).await?;
    info!(path = %path.display(), meetings = res.meetings.len(), "Wrote pipeline report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::merge::DateWindow;
    use crate::models::{DateSpec, MeetingDraft};
    use crate::orchestrator::{ExtractionReport, SourceReport};

    fn resolution() -> Resolution {
        let start = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let meeting = Meeting::new(MeetingDraft::new(
            "sauda",
            "Sauda kommune",
            "Formannskapet",
            DateSpec::Parsed(start),
        ))
        .unwrap();
        let mut extraction = ExtractionReport::default();
        extraction.sources.insert(
            "sauda".to_string(),
            SourceReport {
                source_id: "sauda".to_string(),
                name: "Sauda kommune".to_string(),
                status: SourceStatus::Success,
                meetings: vec![meeting.clone()],
                skipped: 1,
                pages: 1,
            },
        );
        extraction.sources.insert(
            "strand".to_string(),
            SourceReport {
                source_id: "strand".to_string(),
                name: "Strand kommune".to_string(),
                status: SourceStatus::FetchFailed(FetchError::Timeout { secs: 60 }),
                meetings: Vec::new(),
                skipped: 0,
                pages: 0,
            },
        );
        Resolution {
            pipeline: "Standard kanal".to_string(),
            window: DateWindow::new(start, 10),
            meetings: vec![meeting],
            used_fallback: false,
            organizations: vec!["Sauda kommune".to_string(), "Strand kommune".to_string()],
            extraction,
        }
    }

    #[tokio::test]
    async fn test_write_report() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        let path = write_report(&resolution(), dir).await.unwrap();
        assert_eq!(path, tmp.path().join("2025-10-01").join("standard-kanal.json"));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["pipeline"], "Standard kanal");
        assert_eq!(written["window_end"], "2025-10-11");
        assert_eq!(written["used_fallback"], false);
        assert_eq!(written["meetings"][0]["title"], "Formannskapet");
        assert_eq!(written["meetings"][0]["date"], "2025-10-01");
        assert_eq!(written["sources"][0]["status"], "success");
        assert_eq!(written["sources"][0]["skipped"], 1);
        assert_eq!(written["sources"][0]["delivered"], 1);
        assert_eq!(written["sources"][1]["delivered"], 0);
        assert_eq!(written["sources"][1]["status"], "fetch_failed");
        assert_eq!(written["sources"][1]["detail"], "source timed out after 60s");
    }
}
