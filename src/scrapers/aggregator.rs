//! Regional aggregator listing (Bymiljøpakken).
//!
//! A flat, paginated list of meetings across the bodies the aggregator
//! covers. Every row carries title, date and optionally time and place. The
//! page declares its own page count, either in a `data-total-pages`
//! attribute or through the numbered pagination links.

use super::{MeetingParser, Page, ParseOutcome, clean_title, extract_innermost, is_ui_noise, text_of};
use crate::dates::{DateFormat, parse_iso_datetime};
use crate::error::ParseError;
use crate::models::{CmsFamily, DateSpec, TimeSpec};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;

static ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse(".meeting-list__item").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse(".meeting-list__title").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse(".meeting-list__body").unwrap());
static DATE: Lazy<Selector> = Lazy::new(|| Selector::parse(".meeting-list__date").unwrap());
static DATETIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse(".meeting-list__time").unwrap());
static LOCATION: Lazy<Selector> = Lazy::new(|| Selector::parse(".meeting-list__location").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static LOOSE_ROW: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article, .meeting-list li, table tr").unwrap());
static TOTAL_PAGES: Lazy<Selector> = Lazy::new(|| Selector::parse("[data-total-pages]").unwrap());
static PAGE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".pagination a, .pagination span, .page-numbers").unwrap());

pub struct AggregatorParser;

impl MeetingParser for AggregatorParser {
    fn family(&self) -> CmsFamily {
        CmsFamily::Aggregator
    }

    fn accepts(&self, page: &Page<'_>) -> bool {
        let doc = Html::parse_document(page.body);
        doc.select(&ITEM).next().is_some() || doc.select(&LOOSE_ROW).next().is_some()
    }

    fn parse(&self, page: &Page<'_>) -> Result<ParseOutcome, ParseError> {
        let doc = Html::parse_document(page.body);
        let mut out = ParseOutcome::default();
        let mut items = 0;

        for item in doc.select(&ITEM) {
            items += 1;
            let anchor = item.select(&ANCHOR).next();
            let title = item
                .select(&TITLE)
                .next()
                .or(anchor)
                .map(|t| clean_title(&text_of(t)))
                .unwrap_or_default();
            if is_ui_noise(&title) {
                continue;
            }

            let stamp = item
                .select(&DATETIME)
                .next()
                .and_then(|t| t.value().attr("datetime"));
            let date = match stamp {
                Some(stamp) => DateSpec::Raw {
                    text: stamp.to_string(),
                    format: DateFormat::Iso,
                },
                None => DateSpec::Raw {
                    text: item.select(&DATE).next().map(text_of).unwrap_or_default(),
                    format: DateFormat::NorwegianNumeric,
                },
            };
            let time = match item.select(&TIME).next().map(text_of) {
                Some(text) => TimeSpec::Raw(text),
                None => stamp
                    .and_then(parse_iso_datetime)
                    .and_then(|(_, t)| t)
                    .map_or(TimeSpec::Unspecified, TimeSpec::Parsed),
            };

            let mut draft = page
                .draft(title, date)
                .time(time)
                .location(item.select(&LOCATION).next().map(text_of))
                .url(page.link(anchor.and_then(|a| a.value().attr("href"))))
                .raw_text(text_of(item));
            if let Some(body) = item.select(&BODY).next().map(text_of) {
                draft = draft.committee(body);
            }
            out.push(draft);
        }

        if items == 0 {
            extract_innermost(doc.root_element(), &LOOSE_ROW, page, &mut out);
        }
        debug!(
            source = %page.source.id,
            url = %page.url,
            items,
            meetings = out.meetings.len(),
            skipped = out.skipped,
            "Parsed aggregator page"
        );
        Ok(out)
    }

    fn declared_pages(&self, page: &Page<'_>) -> Option<u32> {
        let doc = Html::parse_document(page.body);
        let attr = doc
            .select(&TOTAL_PAGES)
            .filter_map(|el| el.value().attr("data-total-pages"))
            .find_map(|v| v.trim().parse::<u32>().ok());
        attr.or_else(|| {
            doc.select(&PAGE_LINK)
                .filter_map(|el| text_of(el).parse::<u32>().ok())
                .max()
        })
    }
}
