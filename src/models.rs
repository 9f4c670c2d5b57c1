//! Data models shared by every stage of the pipeline.
//!
//! - [`Meeting`]: the canonical, validated meeting record every parser produces
//! - [`MeetingDraft`]: loosely typed parser output handed to [`Meeting::new`]
//! - [`SourceDescriptor`]: one entry of the source registry
//! - [`PipelineConfig`]: one delivery pipeline (groups, window, destination)
//!
//! Meetings are immutable values. They leave a parser fully validated and are
//! afterwards only filtered, deduplicated, re-sorted or cloned into several
//! pipelines.

use crate::dates::{DateFormat, parse_time, resolve_date};
use crate::error::MalformedRecord;
use crate::utils::{clip_chars, normalize_ws};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_TITLE_CHARS: usize = 100;
const MAX_LOCATION_CHARS: usize = 80;
const MAX_RAW_CHARS: usize = 300;

/// How a parser hands over the date of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateSpec {
    /// Already resolved by the parser (e.g. month grid cells).
    Parsed(NaiveDate),
    /// Raw text plus the platform's date rule.
    Raw { text: String, format: DateFormat },
}

/// How a parser hands over the (optional) time of a row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimeSpec {
    #[default]
    Unspecified,
    Parsed(NaiveTime),
    Raw(String),
}

/// Unvalidated meeting fields as collected by a parser.
#[derive(Debug, Clone)]
pub struct MeetingDraft {
    pub title: String,
    pub committee: Option<String>,
    pub organization: String,
    pub date: DateSpec,
    pub time: TimeSpec,
    pub location: Option<String>,
    pub source_id: String,
    pub url: Option<String>,
    pub raw_text: Option<String>,
}

impl MeetingDraft {
    /// Start a draft with the fields every source must provide.
    pub fn new(
        source_id: impl Into<String>,
        organization: impl Into<String>,
        title: impl Into<String>,
        date: DateSpec,
    ) -> Self {
        Self {
            title: title.into(),
            committee: None,
            organization: organization.into(),
            date,
            time: TimeSpec::Unspecified,
            location: None,
            source_id: source_id.into(),
            url: None,
            raw_text: None,
        }
    }

    pub fn time(mut self, time: TimeSpec) -> Self {
        self.time = time;
        self
    }

    pub fn location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn committee(mut self, committee: impl Into<String>) -> Self {
        self.committee = Some(committee.into());
        self
    }

    pub fn url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn raw_text(mut self, raw: impl Into<String>) -> Self {
        self.raw_text = Some(raw.into());
        self
    }
}

/// A single upcoming public meeting.
///
/// Only [`Meeting::new`] creates one, so every instance has a non-empty
/// title, organization and source id and a resolved date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meeting {
    title: String,
    committee: String,
    organization: String,
    date: NaiveDate,
    time: Option<NaiveTime>,
    location: Option<String>,
    source_id: String,
    url: Option<String>,
    raw_text: Option<String>,
}

impl Meeting {
    /// Validate a draft into a meeting.
    ///
    /// # Errors
    ///
    /// [`MalformedRecord`] if the title, organization or source id is blank
    /// or the date cannot be resolved. An unresolvable raw *time* is dropped
    /// instead, since time is optional.
    pub fn new(draft: MeetingDraft) -> Result<Self, MalformedRecord> {
        let title = clip_chars(&normalize_ws(&draft.title), MAX_TITLE_CHARS);
        if title.is_empty() {
            return Err(MalformedRecord::EmptyTitle);
        }
        let organization = normalize_ws(&draft.organization);
        if organization.is_empty() {
            return Err(MalformedRecord::EmptyOrganization);
        }
        let source_id = draft.source_id.trim().to_string();
        if source_id.is_empty() {
            return Err(MalformedRecord::EmptySource);
        }

        let date = match draft.date {
            DateSpec::Parsed(date) => date,
            DateSpec::Raw { text, format } => {
                resolve_date(&text, format).ok_or(MalformedRecord::UnresolvableDate(text))?
            }
        };
        let time = match draft.time {
            TimeSpec::Unspecified => None,
            TimeSpec::Parsed(t) => Some(t),
            TimeSpec::Raw(text) => parse_time(&text),
        };

        let committee = draft
            .committee
            .map(|c| normalize_ws(&c))
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| title.clone());
        let location = draft
            .location
            .map(|l| clip_chars(&normalize_ws(&l), MAX_LOCATION_CHARS))
            .filter(|l| !l.is_empty());
        let url = draft.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        let raw_text = draft
            .raw_text
            .map(|r| clip_chars(&normalize_ws(&r), MAX_RAW_CHARS))
            .filter(|r| !r.is_empty());

        Ok(Self {
            title,
            committee,
            organization,
            date,
            time,
            location,
            source_id,
            url,
            raw_text,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn committee(&self) -> &str {
        &self.committee
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.time
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Ordering used for every emitted schedule: date, untimed before timed,
    /// then organization and title.
    pub fn sort_key(&self) -> (NaiveDate, Option<NaiveTime>, &str, &str) {
        (self.date, self.time, &self.organization, &self.title)
    }

    /// Identity used for deduplication.
    pub fn dedup_key(&self) -> (String, String, NaiveDate, Option<NaiveTime>) {
        (
            self.organization.clone(),
            self.title.clone(),
            self.date,
            self.time,
        )
    }
}

/// Publishing platform family of a source. Selects the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmsFamily {
    Acos,
    Onacos,
    Elements,
    Aggregator,
    Opengov,
}

impl fmt::Display for CmsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CmsFamily::Acos => "acos",
            CmsFamily::Onacos => "onacos",
            CmsFamily::Elements => "elements",
            CmsFamily::Aggregator => "aggregator",
            CmsFamily::Opengov => "opengov",
        };
        f.write_str(name)
    }
}

/// Whether a page can be read as served or needs client-side rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    #[default]
    Static,
    Rendered,
}

/// Source-declared pagination of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Query parameter carrying the page number.
    pub param: String,
    /// Number of the first page.
    #[serde(default = "default_first_page")]
    pub first_page: u32,
    /// Upper bound on pages fetched, whatever the page claims.
    pub max_pages: u32,
}

fn default_first_page() -> u32 {
    1
}

/// One entry of the source registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    pub family: CmsFamily,
    #[serde(default)]
    pub fetch: FetchStrategy,
    pub groups: Vec<String>,
    pub url: String,
    /// CSS selector the renderer waits for before snapshotting the page.
    #[serde(default)]
    pub wait_for: Option<String>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl SourceDescriptor {
    pub fn in_any_group(&self, groups: &[String]) -> bool {
        self.groups.iter().any(|g| groups.contains(g))
    }
}

/// One delivery pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub groups: Vec<String>,
    /// Name of the environment variable holding the webhook URL.
    pub destination_env: String,
    #[serde(default = "default_days_ahead")]
    pub days_ahead: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

pub const DEFAULT_DAYS_AHEAD: u32 = 10;

fn default_days_ahead() -> u32 {
    DEFAULT_DAYS_AHEAD
}

fn default_enabled() -> bool {
    true
}
