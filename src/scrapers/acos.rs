//! ACOS WebSak / Innsyn listings.
//!
//! Two layouts occur in the wild:
//!
//! - Server-rendered listing tables. Columns are found by header label
//!   (`Dato`, `Tid`, `Utvalg`, `Møtested`, ...) rather than position, since
//!   municipalities reorder them freely.
//! - The script-rendered Innsyn card list (`.bc-content-list`). Each card
//!   has a title link whose `aria-label` repeats committee, date and time,
//!   plus a `dt`/`dd` list with `Tid` and `Stad`/`Sted`.
//!
//! Pages with neither fall back to loosely structured meeting elements.

use super::{
    MeetingParser, Page, ParseOutcome, clean_title, extract_innermost, is_ui_noise, text_of,
};
use crate::dates::{DateFormat, parse_time};
use crate::error::ParseError;
use crate::models::{CmsFamily, DateSpec, TimeSpec};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::debug;

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static HEADER_CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th").unwrap());
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").unwrap());
static DATA_CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static CARD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".bc-content-list .bc-content-list-item, .bc-content-list > li").unwrap());
static CARD_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".bc-content-teaser-title, [class*='teaser-title']").unwrap());
static CARD_DATE: Lazy<Selector> = Lazy::new(|| Selector::parse("[class*='meetingDate']").unwrap());
static LABELLED_ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[aria-label]").unwrap());
static TERM: Lazy<Selector> = Lazy::new(|| Selector::parse("dt").unwrap());
static LOOSE_MEETING: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "article, li[class*='meeting'], div[class*='meeting'], li[class*='mote'], div[class*='mote']",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Date,
    Time,
    Committee,
    Location,
}

fn column_for(label: &str) -> Option<Column> {
    let l = label.trim().trim_end_matches(':').to_lowercase();
    if l.is_empty() {
        None
    } else if l.contains("sted") || l.contains("stad") || l.contains("lokale") {
        Some(Column::Location)
    } else if l.contains("dato") || l == "date" || l == "dag" {
        Some(Column::Date)
    } else if l.starts_with("tid") || l.starts_with("kl") || l == "time" {
        Some(Column::Time)
    } else if ["utval", "organ", "møte", "tittel", "navn", "styre"]
        .iter()
        .any(|k| l.contains(k))
    {
        Some(Column::Committee)
    } else {
        None
    }
}

pub struct AcosParser;

impl AcosParser {
    fn parse_cards(&self, doc: &Html, page: &Page<'_>, out: &mut ParseOutcome) -> usize {
        let mut seen = 0;
        for card in doc.select(&CARD) {
            seen += 1;
            let anchor = card
                .select(&LABELLED_ANCHOR)
                .next()
                .or_else(|| card.select(&ANCHOR).next());
            let aria = anchor
                .and_then(|a| a.value().attr("aria-label"))
                .unwrap_or_default()
                .to_string();

            let title = card
                .select(&CARD_TITLE)
                .next()
                .map(text_of)
                .or_else(|| anchor.map(text_of))
                .map(|t| clean_title(&t))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| clean_title(aria.split(',').next().unwrap_or_default()));
            if is_ui_noise(&title) {
                continue;
            }

            let date_text = card
                .select(&CARD_DATE)
                .map(text_of)
                .find(|t| !t.is_empty())
                .unwrap_or_else(|| aria.clone());
            let terms = definitions(card);
            let time = terms
                .get("tid")
                .or_else(|| terms.get("klokkeslett"))
                .cloned()
                .or_else(|| parse_time(&aria).map(|t| t.format("%H:%M").to_string()));
            let location = ["stad", "sted", "møtestad", "møtested"]
                .iter()
                .find_map(|k| terms.get(*k).cloned());

            let mut draft = page
                .draft(
                    title,
                    DateSpec::Raw {
                        text: date_text,
                        format: DateFormat::NorwegianLong,
                    },
                )
                .location(location)
                .url(page.link(anchor.and_then(|a| a.value().attr("href"))))
                .raw_text(text_of(card));
            if let Some(t) = time {
                draft = draft.time(TimeSpec::Raw(t));
            }
            out.push(draft);
        }
        seen
    }

    /// Returns the number of data rows read and whether a meeting table
    /// without a date column was seen.
    fn parse_tables(&self, doc: &Html, page: &Page<'_>, out: &mut ParseOutcome) -> (usize, bool) {
        let mut seen = 0;
        let mut dateless = false;
        for table in doc.select(&TABLE) {
            let rows: Vec<ElementRef<'_>> = table.select(&ROW).collect();
            let Some(header_idx) = rows
                .iter()
                .position(|r| r.select(&HEADER_CELL).next().is_some())
                .or(if rows.is_empty() { None } else { Some(0) })
            else {
                continue;
            };

            let mut columns: HashMap<Column, usize> = HashMap::new();
            for (idx, cell) in rows[header_idx].select(&CELL).enumerate() {
                if let Some(col) = column_for(&text_of(cell)) {
                    columns.entry(col).or_insert(idx);
                }
            }
            if columns.is_empty() {
                continue;
            }
            let Some(&date_col) = columns.get(&Column::Date) else {
                // A committee column alone also matches contact and staff tables
                dateless |= columns.contains_key(&Column::Committee)
                    && (columns.contains_key(&Column::Time) || columns.contains_key(&Column::Location));
                continue;
            };

            for row in &rows[header_idx + 1..] {
                let cells: Vec<String> = row.select(&DATA_CELL).map(text_of).collect();
                if cells.is_empty() {
                    continue;
                }
                seen += 1;
                let Some(date_text) = cells.get(date_col) else {
                    out.skip();
                    continue;
                };
                let committee = columns
                    .get(&Column::Committee)
                    .and_then(|&i| cells.get(i))
                    .cloned()
                    .or_else(|| {
                        cells
                            .iter()
                            .enumerate()
                            .find(|(i, c)| *i != date_col && !c.is_empty())
                            .map(|(_, c)| c.clone())
                    })
                    .unwrap_or_default();
                let title = clean_title(&committee);
                if is_ui_noise(&title) {
                    continue;
                }
                let time = columns
                    .get(&Column::Time)
                    .and_then(|&i| cells.get(i))
                    .cloned()
                    .unwrap_or_else(|| date_text.clone());
                let location = columns
                    .get(&Column::Location)
                    .and_then(|&i| cells.get(i))
                    .cloned();
                let href = row.select(&ANCHOR).next().and_then(|a| a.value().attr("href"));

                out.push(
                    page.draft(
                        title,
                        DateSpec::Raw {
                            text: date_text.clone(),
                            format: DateFormat::Any,
                        },
                    )
                    .time(TimeSpec::Raw(time))
                    .location(location)
                    .url(page.link(href))
                    .raw_text(cells.join(" | ")),
                );
            }
        }
        (seen, dateless)
    }
}

/// `dt` label (lowercased, without colon) to the text of its `dd`.
fn definitions(el: ElementRef<'_>) -> HashMap<String, String> {
    el.select(&TERM)
        .filter_map(|dt| {
            let label = text_of(dt).trim_end_matches(':').trim().to_lowercase();
            let dd = dt
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|e| e.value().name() == "dd")?;
            Some((label, text_of(dd)))
        })
        .collect()
}

impl MeetingParser for AcosParser {
    fn family(&self) -> CmsFamily {
        CmsFamily::Acos
    }

    fn accepts(&self, page: &Page<'_>) -> bool {
        let doc = Html::parse_document(page.body);
        doc.select(&CARD).next().is_some()
            || doc.select(&TABLE).next().is_some()
            || doc.select(&LOOSE_MEETING).next().is_some()
    }

    fn parse(&self, page: &Page<'_>) -> Result<ParseOutcome, ParseError> {
        let doc = Html::parse_document(page.body);
        let mut out = ParseOutcome::default();
        let cards = self.parse_cards(&doc, page, &mut out);
        let (rows, dateless) = self.parse_tables(&doc, page, &mut out);
        if cards == 0 && rows == 0 {
            if dateless {
                return Err(ParseError::Structure(
                    "meeting table has no recognizable date column".to_string(),
                ));
            }
            extract_innermost(doc.root_element(), &LOOSE_MEETING, page, &mut out);
        }
        debug!(
            source = %page.source.id,
            cards,
            rows,
            meetings = out.meetings.len(),
            skipped = out.skipped,
            "Parsed ACOS page"
        );
        Ok(out)
    }
}
