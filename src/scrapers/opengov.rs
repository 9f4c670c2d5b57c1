//! OpenGov (360online) meeting lists.
//!
//! Each meeting is a link to `/Meetings/Details/<id>` holding a
//! `.meetingName` ("Formannskapet (13.10.2025)") and a `.meetingDate` made of
//! separate spans for date and time. Board links (`/Boards/Details/`) share
//! the markup and are ignored.

use super::{MeetingParser, Page, ParseOutcome, is_ui_noise, text_of};
use crate::dates::{parse_numeric_date, parse_time};
use crate::error::ParseError;
use crate::models::{CmsFamily, DateSpec, TimeSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

static MEETING_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*='/Meetings/Details/']").unwrap());
static NAME: Lazy<Selector> = Lazy::new(|| Selector::parse(".meetingName").unwrap());
static DATE_SPAN: Lazy<Selector> = Lazy::new(|| Selector::parse(".meetingDate span").unwrap());
static TRAILING_PARENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)\s*$").unwrap());

pub struct OpenGovParser;

impl MeetingParser for OpenGovParser {
    fn family(&self) -> CmsFamily {
        CmsFamily::Opengov
    }

    fn accepts(&self, page: &Page<'_>) -> bool {
        let doc = Html::parse_document(page.body);
        doc.select(&MEETING_LINK).next().is_some()
    }

    fn parse(&self, page: &Page<'_>) -> Result<ParseOutcome, ParseError> {
        let doc = Html::parse_document(page.body);
        let mut out = ParseOutcome::default();

        for link in doc.select(&MEETING_LINK) {
            let Some(name) = link.select(&NAME).next().map(text_of) else {
                continue;
            };
            let title = TRAILING_PARENS.replace(&name, "").trim().to_string();
            if is_ui_noise(&title) {
                continue;
            }

            let spans: Vec<String> = link
                .select(&DATE_SPAN)
                .map(text_of)
                .filter(|s| !s.is_empty())
                .collect();
            // "Sist oppdatert" is the edit date, not the meeting date.
            let date = parse_numeric_date(&name).or_else(|| {
                spans
                    .iter()
                    .filter(|s| !s.to_lowercase().contains("oppdatert"))
                    .find_map(|s| parse_numeric_date(s))
            });
            let Some(date) = date else {
                out.skip();
                continue;
            };
            let time = spans
                .iter()
                .filter(|s| parse_numeric_date(s).is_none())
                .find_map(|s| parse_time(s));

            out.push(
                page.draft(title, DateSpec::Parsed(date))
                    .time(time.map_or(TimeSpec::Unspecified, TimeSpec::Parsed))
                    .url(page.link(link.value().attr("href")))
                    .raw_text(text_of(link)),
            );
        }

        debug!(
            source = %page.source.id,
            meetings = out.meetings.len(),
            skipped = out.skipped,
            "Parsed OpenGov page"
        );
        Ok(out)
    }
}
