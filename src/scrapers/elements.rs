//! Elements Cloud meeting board (DMB) pages.
//!
//! The page is built client side, so it only has content when fetched through
//! the renderer. Entries are found by class or attribute markers regardless of
//! how deep the widget nests them. The date of an entry can sit in a
//! `data-start` attribute (ISO or epoch), in `title`/`aria-label` attributes of
//! the entry, its descendants or up to three ancestors, or in visible text.
//! The widget prints `mm/dd/yyyy`, so US order is tried before Norwegian.

use super::{MeetingParser, Page, ParseOutcome, clean_title, is_ui_noise, text_of};
use crate::dates::{DateFormat, parse_epoch, parse_iso_datetime, parse_time, parse_us_date};
use crate::error::ParseError;
use crate::models::{CmsFamily, DateSpec, TimeSpec};
use crate::utils::normalize_ws;
use chrono::NaiveTime;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;

static ENTRY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".dmb-meeting, [data-meeting-id], a[href*='DmbMeeting']").unwrap());
static ENTRY_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".dmb-meeting-title, [class*='title']").unwrap());
static ENTRY_BOARD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".dmb-meeting-board, [class*='board']").unwrap());
static ENTRY_LOCATION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[class*='location'], [class*='sted']").unwrap());
static WITH_HINTS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[title], [aria-label], [data-date], [data-start]").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static LOADING: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[data-loading], .loading-indicator, .spinner").unwrap());

const HINT_ATTRS: [&str; 3] = ["title", "aria-label", "data-date"];
const ANCESTOR_DEPTH: usize = 3;

pub struct ElementsParser;

/// Exact start from `data-start` on the entry or a descendant.
fn data_start(entry: ElementRef<'_>) -> Option<(DateSpec, Option<NaiveTime>)> {
    std::iter::once(entry)
        .chain(entry.select(&WITH_HINTS))
        .filter_map(|el| el.value().attr("data-start"))
        .find_map(|raw| {
            let stamp = |format| DateSpec::Raw {
                text: raw.to_string(),
                format,
            };
            match parse_iso_datetime(raw) {
                Some((_, time)) => Some((stamp(DateFormat::Iso), time)),
                None => parse_epoch(raw).map(|dt| (stamp(DateFormat::Epoch), Some(dt.time()))),
            }
        })
}

/// Every attribute hint around the entry, followed by its visible text.
fn hint_blob(entry: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let own = std::iter::once(entry).chain(entry.select(&WITH_HINTS));
    let ancestors = entry
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take(ANCESTOR_DEPTH);
    for el in own.chain(ancestors) {
        for attr in HINT_ATTRS {
            if let Some(v) = el.value().attr(attr) {
                parts.push(v);
            }
        }
    }
    let text = text_of(entry);
    normalize_ws(&format!("{} {}", parts.join(" "), text))
}

/// The widget's own `mm/dd/yyyy` when present, Norwegian formats otherwise.
fn entry_date(blob: &str) -> DateSpec {
    let format = if parse_us_date(blob).is_some() {
        DateFormat::UsSlash
    } else {
        DateFormat::Any
    };
    DateSpec::Raw {
        text: blob.to_string(),
        format,
    }
}

impl ElementsParser {
    fn entries<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        let all: Vec<ElementRef<'a>> = doc.select(&ENTRY).collect();
        let ids: HashSet<_> = all.iter().map(|e| e.id()).collect();
        all.into_iter()
            .filter(|e| !e.ancestors().any(|a| ids.contains(&a.id())))
            .collect()
    }
}

impl MeetingParser for ElementsParser {
    fn family(&self) -> CmsFamily {
        CmsFamily::Elements
    }

    fn accepts(&self, page: &Page<'_>) -> bool {
        let doc = Html::parse_document(page.body);
        doc.select(&ENTRY).next().is_some()
    }

    fn parse(&self, page: &Page<'_>) -> Result<ParseOutcome, ParseError> {
        let doc = Html::parse_document(page.body);
        let entries = self.entries(&doc);
        if entries.is_empty() && doc.select(&LOADING).next().is_some() {
            return Err(ParseError::NotRendered);
        }

        let mut out = ParseOutcome::default();
        for entry in entries {
            let anchor = if entry.value().name() == "a" {
                Some(entry)
            } else {
                entry.select(&ANCHOR).next()
            };
            let title = entry
                .select(&ENTRY_TITLE)
                .next()
                .map(text_of)
                .or_else(|| anchor.map(text_of))
                .or_else(|| entry.value().attr("title").map(str::to_string))
                .map(|t| clean_title(&t))
                .unwrap_or_default();
            if is_ui_noise(&title) {
                continue;
            }

            let blob = hint_blob(entry);
            let (date, time) = data_start(entry).unwrap_or_else(|| (entry_date(&blob), None));
            let time = time.or_else(|| parse_time(&blob));
            let location = entry
                .select(&ENTRY_LOCATION)
                .next()
                .map(text_of)
                .or_else(|| entry.value().attr("data-location").map(str::to_string));

            let mut draft = page
                .draft(title, date)
                .location(location)
                .url(page.link(anchor.and_then(|a| a.value().attr("href"))))
                .raw_text(blob);
            if let Some(board) = entry.select(&ENTRY_BOARD).next().map(text_of) {
                draft = draft.committee(board);
            }
            if let Some(t) = time {
                draft = draft.time(TimeSpec::Parsed(t));
            }
            out.push(draft);
        }

        debug!(
            source = %page.source.id,
            meetings = out.meetings.len(),
            skipped = out.skipped,
            "Parsed Elements page"
        );
        Ok(out)
    }
}
