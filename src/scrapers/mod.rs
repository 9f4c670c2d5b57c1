//! Meeting parsers, one per publishing platform family.
//!
//! Each parser turns one fetched page into zero or more [`Meeting`]s. Parsers
//! never fetch anything themselves; the orchestrator hands them a [`Page`]
//! with the body and the descriptor it was fetched for.
//!
//! # Supported Platforms
//!
//! | Family | Module | Markup | Notes |
//! |--------|--------|--------|-------|
//! | ACOS | [`acos`] | listing tables, Innsyn card lists | header-label column detection |
//! | Onacos | [`onacos`] | month-grid meeting plans | committee rows × month columns |
//! | Elements Cloud | [`elements`] | script-rendered entries | class/attribute markers, any nesting |
//! | Aggregator | [`aggregator`] | flat paginated listing | page count read from the page |
//! | OpenGov 360online | [`opengov`] | meeting link list | `.meetingName` / `.meetingDate` |
//!
//! # Contract
//!
//! - Dispatch is by the family tag on the descriptor ([`parser_for`]);
//!   [`MeetingParser::accepts`] is only a sanity check.
//! - A malformed row is skipped and counted in [`ParseOutcome::skipped`].
//! - A page without the expected structure yields an empty outcome.
//!   [`ParseError`] is reserved for pages whose overall shape is wrong.

use crate::dates::{parse_long_date, parse_numeric_date, parse_time};
use crate::error::ParseError;
use crate::models::{CmsFamily, DateSpec, Meeting, MeetingDraft, SourceDescriptor, TimeSpec};
use crate::utils::{normalize_ws, truncate_for_log};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

pub mod acos;
pub mod aggregator;
pub mod elements;
pub mod onacos;
pub mod opengov;

/// One fetched page and the context needed to interpret it.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    pub source: &'a SourceDescriptor,
    /// URL the body was fetched from; relative links resolve against it.
    pub url: &'a str,
    pub body: &'a str,
    /// Run date, for platforms that print dates without a year.
    pub today: NaiveDate,
}

impl Page<'_> {
    /// Start a draft attributed to this page's source.
    pub fn draft(&self, title: impl Into<String>, date: DateSpec) -> MeetingDraft {
        MeetingDraft::new(&self.source.id, &self.source.name, title, date)
    }

    /// Resolve `href` against the page URL.
    pub fn link(&self, href: Option<&str>) -> Option<String> {
        let href = href?.trim();
        if href.is_empty() || href.starts_with("javascript:") {
            return None;
        }
        Url::parse(self.url)
            .and_then(|base| base.join(href))
            .map(|u| u.to_string())
            .ok()
    }
}

const RAW_LOG_CHARS: usize = 120;

/// Meetings found on a page plus the number of rows that had to be skipped.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub meetings: Vec<Meeting>,
    pub skipped: usize,
}

impl ParseOutcome {
    /// Validate a draft; invalid drafts are counted, not raised.
    pub fn push(&mut self, draft: MeetingDraft) {
        let raw = draft.raw_text.clone();
        match Meeting::new(draft) {
            Ok(meeting) => self.meetings.push(meeting),
            Err(e) => {
                debug!(
                    error = %truncate_for_log(&e.to_string(), RAW_LOG_CHARS),
                    raw = %truncate_for_log(raw.as_deref().unwrap_or_default(), RAW_LOG_CHARS),
                    "Skipping malformed row"
                );
                self.skipped += 1;
            }
        }
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    /// No meetings and no skipped rows: the page lists nothing at all.
    pub fn is_empty(&self) -> bool {
        self.meetings.is_empty() && self.skipped == 0
    }
}

/// Capability set every platform parser provides.
pub trait MeetingParser: Sync {
    fn family(&self) -> CmsFamily;

    /// Whether the page looks like this platform's markup.
    fn accepts(&self, page: &Page<'_>) -> bool;

    /// Extract all meetings from the page.
    fn parse(&self, page: &Page<'_>) -> Result<ParseOutcome, ParseError>;

    /// Total number of listing pages the page itself declares, if any.
    fn declared_pages(&self, _page: &Page<'_>) -> Option<u32> {
        None
    }
}

/// The parser for a platform family.
pub fn parser_for(family: CmsFamily) -> &'static dyn MeetingParser {
    match family {
        CmsFamily::Acos => &acos::AcosParser,
        CmsFamily::Onacos => &onacos::OnacosParser,
        CmsFamily::Elements => &elements::ElementsParser,
        CmsFamily::Aggregator => &aggregator::AggregatorParser,
        CmsFamily::Opengov => &opengov::OpenGovParser,
    }
}

// ---- shared extraction helpers (ACOS and Onacos list markup) ----

static HEADINGS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, h5, h6, strong, b").unwrap());
static WITH_LABELS: Lazy<Selector> = Lazy::new(|| Selector::parse("[aria-label], [title]").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static DATE_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}[./-]\d{1,2}[./-]\d{2,4}.*$").unwrap());
static TIME_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bkl\.?\s*\d{1,2}[:.]\d{2}.*$").unwrap());
static MEETING_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(møte i |møte |meeting )").unwrap());
static MORE_MEETINGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\+\d+\s*møter").unwrap());
static ONLY_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9\s+\-.:]*$").unwrap());
static LABELLED_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:sted|stad|møtested|møtestad|lokale|rom|adresse)\s*:\s*([^,;|]+)").unwrap()
});
static KNOWN_ROOMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(kommunestyresalen|formannskapssalen|rådhussalen|rådhuset|møterom [\wæøå]+|kommunehuset|fylkeshuset)\b",
    )
    .unwrap()
});

const UI_NOISE: &[&str] = &[
    "søk etter møte",
    "resultatside",
    "møtekalender",
    "vis flere",
    "vis forrige",
    "vis neste",
];

/// Visible text of an element, whitespace-normalized.
pub fn text_of(el: ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<Vec<_>>().join(" "))
}

/// Navigation and search widgets that look like rows but are not meetings.
pub fn is_ui_noise(text: &str) -> bool {
    let lower = text.to_lowercase();
    UI_NOISE.iter().any(|n| lower.contains(n))
}

/// Strip dates, times and boilerplate from a scraped title.
pub fn clean_title(raw: &str) -> String {
    let title = normalize_ws(raw);
    let title = DATE_TAIL.replace(&title, "");
    let title = TIME_TAIL.replace(&title, "");
    let title = MORE_MEETINGS.replace_all(&title, "");
    let title = MEETING_PREFIX.replace(title.trim(), "");
    let title = normalize_ws(title.trim_end_matches([',', '-', '–', ':']));
    if ONLY_DIGITS.is_match(&title) {
        String::new()
    } else {
        title
    }
}

/// Location from a `Sted:`-style label or a well-known room name.
pub fn find_location(text: &str) -> Option<String> {
    if let Some(caps) = LABELLED_LOCATION.captures(text) {
        let loc = caps[1].trim();
        let loc = TIME_TAIL.replace(loc, "");
        let loc = loc.trim();
        if !loc.is_empty() {
            return Some(loc.to_string());
        }
    }
    KNOWN_ROOMS.captures(text).map(|caps| {
        let room = &caps[1];
        let mut chars = room.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    })
}

fn any_date(text: &str) -> Option<NaiveDate> {
    parse_numeric_date(text).or_else(|| parse_long_date(text))
}

/// Build a draft from a free-form element that mentions a date somewhere in
/// its text or its (or its children's) `title`/`aria-label` attributes.
///
/// Returns `None` when the element carries no date at all (it is not a
/// meeting row) or only UI boilerplate.
pub fn extract_generic(el: ElementRef<'_>, page: &Page<'_>) -> Option<MeetingDraft> {
    let text = text_of(el);
    let mut candidates: Vec<String> = Vec::new();
    for attr in ["title", "aria-label"] {
        if let Some(v) = el.value().attr(attr) {
            candidates.push(normalize_ws(v));
        }
    }
    candidates.push(text.clone());
    for child in el.select(&WITH_LABELS) {
        for attr in ["title", "aria-label"] {
            if let Some(v) = child.value().attr(attr) {
                candidates.push(normalize_ws(v));
            }
        }
    }

    let (date, date_text) = candidates
        .iter()
        .find_map(|c| any_date(c).map(|d| (d, c.as_str())))?;
    let time = parse_time(date_text).or_else(|| parse_time(&text));

    let title_source = if el.value().name().starts_with('h') && el.value().name().len() == 2 {
        text.clone()
    } else if let Some(heading) = el.select(&HEADINGS).next() {
        text_of(heading)
    } else {
        text.clone()
    };
    let mut title = clean_title(&title_source);
    if title.is_empty() {
        title = clean_title(date_text);
    }
    if is_ui_noise(&title) {
        return None;
    }

    let href = if el.value().name() == "a" {
        el.value().attr("href")
    } else {
        el.select(&ANCHOR).next().and_then(|a| a.value().attr("href"))
    };

    let mut draft = page
        .draft(title, DateSpec::Parsed(date))
        .location(find_location(&text))
        .url(page.link(href))
        .raw_text(text);
    if let Some(t) = time {
        draft = draft.time(TimeSpec::Parsed(t));
    }
    Some(draft)
}

/// Run [`extract_generic`] over every match of `selector`, keeping only the
/// innermost matches so nested containers do not yield the same row twice.
pub fn extract_innermost(
    root: ElementRef<'_>,
    selector: &Selector,
    page: &Page<'_>,
    outcome: &mut ParseOutcome,
) {
    let matched: Vec<ElementRef<'_>> = root.select(selector).collect();
    let ids: HashSet<_> = matched.iter().map(|el| el.id()).collect();
    for el in matched {
        let has_inner_match = el.descendants().skip(1).any(|n| ids.contains(&n.id()));
        if has_inner_match {
            continue;
        }
        if let Some(draft) = extract_generic(el, page) {
            outcome.push(draft);
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::models::FetchStrategy;

    pub fn source(id: &str, name: &str, family: CmsFamily, url: &str) -> SourceDescriptor {
        SourceDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            family,
            fetch: FetchStrategy::Static,
            groups: vec!["core".to_string()],
            url: url.to_string(),
            wait_for: None,
            pagination: None,
        }
    }

    pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use scraper::Html;

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("Møte i Formannskapet 12.10.2025 kl. 10:00"), "Formannskapet");
        assert_eq!(clean_title("Kommunestyret - "), "Kommunestyret");
        assert_eq!(clean_title("12.10.2025"), "");
        assert_eq!(clean_title("Levekårsutvalget +2 møter"), "Levekårsutvalget");
    }

    #[test]
    fn test_find_location() {
        assert_eq!(
            find_location("Formannskapet, Sted: Rådhuset, 2. etasje").as_deref(),
            Some("Rådhuset")
        );
        assert_eq!(
            find_location("Kontrollutvalget i kommunestyresalen").as_deref(),
            Some("Kommunestyresalen")
        );
        assert_eq!(find_location("Formannskapet"), None);
    }

    #[test]
    fn test_noise_is_recognized() {
        assert!(is_ui_noise("Søk etter møter"));
        assert!(is_ui_noise("Vis flere"));
        assert!(!is_ui_noise("Eldrerådet"));
    }

    #[test]
    fn test_page_link_resolution() {
        let src = source("time", "Time kommune", CmsFamily::Acos, "https://www.time.kommune.no/politikk/");
        let page = Page {
            source: &src,
            url: "https://www.time.kommune.no/politikk/moter/",
            body: "",
            today: day(2025, 10, 1),
        };
        assert_eq!(
            page.link(Some("#/details/m-1")).as_deref(),
            Some("https://www.time.kommune.no/politikk/moter/#/details/m-1")
        );
        assert_eq!(page.link(Some("javascript:void(0)")), None);
        assert_eq!(page.link(None), None);
    }

    #[test]
    fn test_extract_generic_reads_attributes_and_headings() {
        let src = source("sokndal", "Sokndal kommune", CmsFamily::Acos, "https://sokndal.example/");
        let html = Html::parse_fragment(
            r#"<div class="meeting"><h4>Eldrerådet</h4>
               <a href="/mote/1" title="Eldrerådet 21.10.2025 kl. 10:00">Les mer</a>
               <p>Sted: Formannskapssalen</p></div>"#,
        );
        let page = Page {
            source: &src,
            url: "https://sokndal.example/innsyn/",
            body: "",
            today: day(2025, 10, 1),
        };
        let sel = Selector::parse("div.meeting").unwrap();
        let el = html.select(&sel).next().unwrap();
        let m = Meeting::new(extract_generic(el, &page).unwrap()).unwrap();
        assert_eq!(m.title(), "Eldrerådet");
        assert_eq!(m.date(), day(2025, 10, 21));
        assert_eq!(m.time().unwrap().to_string(), "10:00:00");
        assert_eq!(m.location(), Some("Formannskapssalen"));
        assert_eq!(m.url(), Some("https://sokndal.example/mote/1"));
        assert_eq!(m.organization(), "Sokndal kommune");
    }

    #[test]
    fn test_extract_generic_ignores_dateless_elements() {
        let src = source("a", "A kommune", CmsFamily::Acos, "https://a.example/");
        let html = Html::parse_fragment(r#"<div class="meeting"><h4>Møtekalender</h4></div>"#);
        let page = Page {
            source: &src,
            url: "https://a.example/",
            body: "",
            today: day(2025, 10, 1),
        };
        let sel = Selector::parse("div.meeting").unwrap();
        let el = html.select(&sel).next().unwrap();
        assert!(extract_generic(el, &page).is_none());
    }
}
