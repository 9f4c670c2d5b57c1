//! Onacos meeting plans.
//!
//! The usual page is a year plan: one row per committee, one column per month,
//! and each cell holding the days that committee meets (often as links to the
//! meeting). The year is not printed; it is inferred from the run date.
//!
//! Sites without a plan table list meetings as rows, which are read with the
//! shared loose-element extraction.

use super::{MeetingParser, Page, ParseOutcome, extract_innermost, is_ui_noise, text_of};
use crate::dates::{infer_year, month_from_name, parse_time};
use crate::error::ParseError;
use crate::models::{CmsFamily, DateSpec, TimeSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static HEADER_CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th").unwrap());
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static LIST_ROW: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "table.moteliste tr, tr[class*='mote'], li[class*='mote'], div[class*='mote'], .meeting-row",
    )
    .unwrap()
});
static DAY_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([0-3]?\d)\b").unwrap());

const MAX_MONTH_LABEL: usize = 12;
const MONTHS: usize = 12;

/// A single day mention inside a month cell.
struct DayMention {
    day: u32,
    href: Option<String>,
    hint: Option<String>,
}

fn day_mentions(cell: ElementRef<'_>) -> Vec<DayMention> {
    let anchors: Vec<ElementRef<'_>> = cell.select(&ANCHOR).collect();
    if !anchors.is_empty() {
        return anchors
            .into_iter()
            .filter_map(|a| {
                let digits: String = text_of(a).chars().filter(char::is_ascii_digit).collect();
                Some(DayMention {
                    day: digits.parse().ok()?,
                    href: a.value().attr("href").map(str::to_string),
                    hint: a
                        .value()
                        .attr("title")
                        .or_else(|| a.value().attr("aria-label"))
                        .map(str::to_string),
                })
            })
            .collect();
    }
    DAY_TOKEN
        .captures_iter(&text_of(cell))
        .filter_map(|caps| {
            Some(DayMention {
                day: caps[1].parse().ok()?,
                href: None,
                hint: None,
            })
        })
        .collect()
}

fn is_navigation(label: &str) -> bool {
    let low = label.to_lowercase();
    low == "utvalg" || low.contains("vis forrige") || low.contains("vis neste")
}

/// Index of the first header row naming months, with its month columns.
fn month_header(rows: &[ElementRef<'_>]) -> Option<(usize, Vec<(usize, u32)>)> {
    rows.iter().enumerate().find_map(|(i, row)| {
        if row.select(&HEADER_CELL).next().is_none() {
            return None;
        }
        let months: Vec<(usize, u32)> = row
            .select(&CELL)
            .enumerate()
            .filter_map(|(idx, cell)| {
                let label = text_of(cell);
                if label.chars().count() > MAX_MONTH_LABEL {
                    return None;
                }
                month_from_name(&label).map(|m| (idx, m))
            })
            .collect();
        (!months.is_empty()).then_some((i, months))
    })
}

pub struct OnacosParser;

impl OnacosParser {
    /// Returns `None` for tables that are not month plans.
    fn parse_plan(
        &self,
        table: ElementRef<'_>,
        page: &Page<'_>,
        out: &mut ParseOutcome,
    ) -> Option<usize> {
        let rows: Vec<ElementRef<'_>> = table.select(&ROW).collect();
        let (first_row, months) = match month_header(&rows) {
            Some((header_idx, months)) => (header_idx + 1, months),
            // Unlabelled plans: committee column followed by January..December
            None if rows.iter().any(|r| r.select(&CELL).count() == 1 + MONTHS) => {
                (0, (1..=MONTHS).map(|m| (m, m as u32)).collect())
            }
            None => return None,
        };

        let mut mentions = 0;
        for row in &rows[first_row..] {
            let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
            let Some(first) = cells.first() else {
                continue;
            };
            let committee = text_of(*first);
            if committee.is_empty() || is_navigation(&committee) || is_ui_noise(&committee) {
                continue;
            }
            let committee_link = first
                .select(&ANCHOR)
                .next()
                .and_then(|a| a.value().attr("href"));

            for &(col, month) in &months {
                let Some(cell) = cells.get(col) else {
                    continue;
                };
                for mention in day_mentions(*cell) {
                    mentions += 1;
                    let Some(date) = infer_year(month, mention.day, page.today) else {
                        out.skip();
                        continue;
                    };
                    let time = mention
                        .hint
                        .as_deref()
                        .and_then(parse_time)
                        .map_or(TimeSpec::Unspecified, TimeSpec::Parsed);
                    let href = mention.href.as_deref().or(committee_link);
                    out.push(
                        page.draft(committee.clone(), DateSpec::Parsed(date))
                            .time(time)
                            .url(page.link(href).or_else(|| Some(page.url.to_string())))
                            .raw_text(format!("{committee} {}.{month}", mention.day)),
                    );
                }
            }
        }
        Some(mentions)
    }
}

impl MeetingParser for OnacosParser {
    fn family(&self) -> CmsFamily {
        CmsFamily::Onacos
    }

    fn accepts(&self, page: &Page<'_>) -> bool {
        let doc = Html::parse_document(page.body);
        doc.select(&TABLE).next().is_some() || doc.select(&LIST_ROW).next().is_some()
    }

    fn parse(&self, page: &Page<'_>) -> Result<ParseOutcome, ParseError> {
        let doc = Html::parse_document(page.body);
        let mut out = ParseOutcome::default();
        let mut plans = 0;
        for table in doc.select(&TABLE) {
            if let Some(mentions) = self.parse_plan(table, page, &mut out) {
                plans += 1;
                debug!(source = %page.source.id, mentions, "Read month plan table");
            }
        }
        if plans == 0 {
            extract_innermost(doc.root_element(), &LIST_ROW, page, &mut out);
        }
        debug!(
            source = %page.source.id,
            plans,
            meetings = out.meetings.len(),
            skipped = out.skipped,
            "Parsed Onacos page"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{day, source};
    use super::*;
    use chrono::NaiveTime;

    const PLAN: &str = r#"
<html><body>
<table>
  <caption>Møteplan</caption>
  <tr><th>Utvalg</th><th>Jan</th><th>Feb</th><th>Okt</th><th>Nov</th><th>Des</th></tr>
  <tr><td><a href="/utvalg/ks">Kommunestyret</a></td><td>27</td><td></td>
      <td><a href="/mote/11" title="Kommunestyret 20.10.2025 kl. 17:00">20</a></td>
      <td>3, 24</td><td>31</td></tr>
  <tr><td>Formannskapet</td><td></td><td>12</td><td>13</td><td>31</td><td></td></tr>
  <tr><td>Vis forrige år</td><td>1</td><td></td><td></td><td></td><td></td></tr>
</table>
</body></html>"#;

    fn parse(body: &str) -> ParseOutcome {
        let src = source("eigersund", "Eigersund kommune", CmsFamily::Onacos, "https://eigersund.example/");
        let page = Page {
            source: &src,
            url: "https://eigersund.example/moteplan/",
            body,
            today: day(2025, 10, 1),
        };
        OnacosParser.parse(&page).unwrap()
    }

    #[test]
    fn test_month_plan() {
        let out = parse(PLAN);
        // Nov 31 does not exist.
        assert_eq!(out.skipped, 1);
        let dates: Vec<_> = out
            .meetings
            .iter()
            .map(|m| (m.title().to_string(), m.date()))
            .collect();
        assert!(dates.contains(&("Kommunestyret".to_string(), day(2025, 10, 20))));
        assert!(dates.contains(&("Kommunestyret".to_string(), day(2025, 11, 3))));
        assert!(dates.contains(&("Kommunestyret".to_string(), day(2025, 11, 24))));
        assert!(dates.contains(&("Kommunestyret".to_string(), day(2025, 12, 31))));
        assert!(dates.contains(&("Formannskapet".to_string(), day(2025, 10, 13))));
        assert!(!dates.iter().any(|(t, _)| t.contains("Vis forrige")));
    }

    #[test]
    fn test_early_months_roll_into_next_year() {
        let out = parse(PLAN);
        let jan = out
            .meetings
            .iter()
            .find(|m| m.title() == "Kommunestyret" && m.date().format("%m").to_string() == "01")
            .unwrap();
        assert_eq!(jan.date(), day(2026, 1, 27));
        let feb = out.meetings.iter().find(|m| m.title() == "Formannskapet" && m.date() < day(2025, 10, 1));
        assert!(feb.is_none());
    }

    #[test]
    fn test_day_link_carries_time_and_url() {
        let out = parse(PLAN);
        let m = out
            .meetings
            .iter()
            .find(|m| m.date() == day(2025, 10, 20))
            .unwrap();
        assert_eq!(m.time(), NaiveTime::from_hms_opt(17, 0, 0));
        assert_eq!(m.url(), Some("https://eigersund.example/mote/11"));

        let plain = out.meetings.iter().find(|m| m.date() == day(2025, 11, 3)).unwrap();
        assert_eq!(plain.time(), None);
        assert_eq!(plain.url(), Some("https://eigersund.example/utvalg/ks"));
    }

    #[test]
    fn test_unlabelled_plan_columns_are_months() {
        let body = r#"<table>
  <tr><td>Utvalg</td><td>1</td><td>2</td><td>3</td><td>4</td><td>5</td><td>6</td>
      <td>7</td><td>8</td><td>9</td><td>10</td><td>11</td><td>12</td></tr>
  <tr><td>Formannskapet</td><td></td><td></td><td></td><td></td><td></td><td></td>
      <td></td><td></td><td></td><td><a href="/mote/7">15</a></td><td></td><td>4</td></tr>
</table>"#;
        let out = parse(body);
        let dates: Vec<_> = out.meetings.iter().map(|m| (m.title(), m.date())).collect();
        assert_eq!(
            dates,
            vec![
                ("Formannskapet", day(2025, 10, 15)),
                ("Formannskapet", day(2025, 12, 4)),
            ]
        );
        assert_eq!(out.meetings[0].url(), Some("https://eigersund.example/mote/7"));
    }

    #[test]
    fn test_list_rows_without_plan() {
        let body = r#"<ul>
            <li class="moterad"><strong>Hovedutvalg for oppvekst</strong> 23.10.2025 kl. 09:00, Sted: Rådhuset</li>
            <li class="moterad"><strong>Vis flere</strong> 23.10.2025</li>
        </ul>"#;
        let out = parse(body);
        assert_eq!(out.meetings.len(), 1);
        let m = &out.meetings[0];
        assert_eq!(m.title(), "Hovedutvalg for oppvekst");
        assert_eq!(m.location(), Some("Rådhuset"));
        assert_eq!(m.organization(), "Eigersund kommune");
    }
}
