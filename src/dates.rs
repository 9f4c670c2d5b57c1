//! Date and time rules for the publishing platforms we read.
//!
//! Municipal sites print dates in a handful of shapes:
//!
//! - Norwegian numeric: `15.10.2025`, `15.10.25`, `15/10/2025`, `15-10-2025`
//! - Norwegian long: `15. oktober 2025`, `15 okt. 2025`
//! - US slash (Elements Cloud widgets): `10/15/2025`
//! - ISO 8601 in data attributes: `2025-10-15T10:00:00`
//! - Epoch seconds or milliseconds in data attributes
//!
//! Times are `HH:MM`, optionally prefixed by `kl.`, or `kl. 18.30`.
//!
//! Every helper here returns `Option` and never panics on input; callers
//! decide whether a miss is a skipped row or a dropped field.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[./-](\d{1,2})[./-](\d{4}|\d{2})\b").unwrap());
static LONG_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\.?\s+([a-zæøå]{3,})\.?\s+(\d{4})\b").unwrap()
});
static US_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());
static ISO_DATETIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2}))?").unwrap()
});
static EPOCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{13}|\d{10})\b").unwrap());
static COLON_TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").unwrap());
static KL_DOT_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bkl\.?\s*(\d{1,2})\.(\d{2})\b").unwrap());

/// Native date representation of a source, chosen by its parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// `dd.mm.yyyy` and its `/`, `-` and two-digit-year variants.
    NorwegianNumeric,
    /// `15. oktober 2025`.
    NorwegianLong,
    /// `mm/dd/yyyy`.
    UsSlash,
    /// `yyyy-mm-dd`, optionally followed by a time.
    Iso,
    /// Unix seconds or milliseconds.
    Epoch,
    /// Norwegian numeric, then Norwegian long, then ISO.
    Any,
}

/// Resolve a raw date string with the given rule.
pub fn resolve_date(raw: &str, format: DateFormat) -> Option<NaiveDate> {
    match format {
        DateFormat::NorwegianNumeric => parse_numeric_date(raw),
        DateFormat::NorwegianLong => parse_long_date(raw),
        DateFormat::UsSlash => parse_us_date(raw),
        DateFormat::Iso => parse_iso_datetime(raw).map(|(d, _)| d),
        DateFormat::Epoch => parse_epoch(raw).map(|dt| dt.date()),
        DateFormat::Any => parse_numeric_date(raw)
            .or_else(|| parse_long_date(raw))
            .or_else(|| parse_iso_datetime(raw).map(|(d, _)| d)),
    }
}

/// Map a Norwegian (or English) month name or abbreviation to its number.
pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim().trim_end_matches('.').to_lowercase();
    let prefix: String = lower.chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "mai" | "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "okt" | "oct" => 10,
        "nov" => 11,
        "des" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// `dd.mm.yyyy`, `dd/mm/yyyy`, `dd-mm-yyyy` or `dd.mm.yy`.
pub fn parse_numeric_date(text: &str) -> Option<NaiveDate> {
    NUMERIC_DATE.captures_iter(text).find_map(|caps| {
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let mut year: i32 = caps[3].parse().ok()?;
        if year < 100 {
            year += 2000;
        }
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// `15. oktober 2025` or `15 okt 2025`.
pub fn parse_long_date(text: &str) -> Option<NaiveDate> {
    LONG_DATE.captures_iter(text).find_map(|caps| {
        let day = caps[1].parse().ok()?;
        let month = month_from_name(&caps[2])?;
        let year = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// `mm/dd/yyyy`.
pub fn parse_us_date(text: &str) -> Option<NaiveDate> {
    US_DATE.captures_iter(text).find_map(|caps| {
        let month = caps[1].parse().ok()?;
        let day = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// ISO date with an optional `THH:MM` part.
pub fn parse_iso_datetime(text: &str) -> Option<(NaiveDate, Option<NaiveTime>)> {
    let caps = ISO_DATETIME.captures(text)?;
    let date = NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )?;
    let time = match (caps.get(4), caps.get(5)) {
        (Some(h), Some(m)) => hm(h.as_str(), m.as_str()),
        _ => None,
    };
    Some((date, time))
}

/// Unix timestamp in seconds (10 digits) or milliseconds (13 digits),
/// converted to local wall-clock time.
pub fn parse_epoch(text: &str) -> Option<NaiveDateTime> {
    let digits = EPOCH.captures(text)?.get(1)?.as_str();
    let value: i64 = digits.parse().ok()?;
    let secs = if digits.len() == 13 { value / 1000 } else { value };
    let utc = DateTime::from_timestamp(secs, 0)?;
    Some(utc.with_timezone(&Local).naive_local())
}

/// Clock time as `HH:MM`, `kl. HH:MM` or `kl. HH.MM`.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    COLON_TIME
        .captures_iter(text)
        .find_map(|caps| hm(&caps[1], &caps[2]))
        .or_else(|| {
            KL_DOT_TIME
                .captures_iter(text)
                .find_map(|caps| hm(&caps[1], &caps[2]))
        })
}

fn hm(hours: &str, minutes: &str) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(hours.parse().ok()?, minutes.parse().ok()?, 0)
}

/// Build a date for a day/month pair printed without a year, as the month
/// grids do. The run's year is assumed; a result more than six months in the
/// past belongs to next year's plan.
pub fn infer_year(month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    let candidate = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if (today - candidate).num_days() > 183 {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(candidate)
    }
}
