//! Windowing, deduplication and ordering of collected meetings.

use crate::models::Meeting;
use chrono::{Days, NaiveDate};
use itertools::Itertools;
use std::fmt;

/// An inclusive range of days: `start` through `start + days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: NaiveDate,
    days: u32,
}

impl DateWindow {
    pub fn new(start: NaiveDate, days: u32) -> Self {
        Self { start, days }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    /// Last day inside the window. Saturates at the latest representable date.
    pub fn end(&self) -> NaiveDate {
        self.start
            .checked_add_days(Days::new(u64::from(self.days)))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end())
    }
}

/// Keep meetings inside `window`, drop duplicates and sort.
///
/// Duplicates share organization, title, date and time; the first one seen
/// is kept. The result is ordered by date, then time (untimed first), then
/// organization and title. Applying this to its own output changes nothing.
///
/// # Example
///
/// ```ignore
/// let window = DateWindow::new(today, 10);
/// let schedule = merge_and_filter(report.meetings(), &window);
/// ```
pub fn merge_and_filter<I>(meetings: I, window: &DateWindow) -> Vec<Meeting>
where
    I: IntoIterator<Item = Meeting>,
{
    let mut merged: Vec<Meeting> = meetings
        .into_iter()
        .filter(|m| window.contains(m.date()))
        .unique_by(Meeting::dedup_key)
        .collect();
    merged.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateSpec, MeetingDraft, TimeSpec};
    use chrono::NaiveTime;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn meeting(org: &str, title: &str, date: NaiveDate, time: Option<(u32, u32)>) -> Meeting {
        let mut draft = MeetingDraft::new("src", org, title, DateSpec::Parsed(date));
        if let Some((h, m)) = time {
            draft = draft.time(TimeSpec::Parsed(NaiveTime::from_hms_opt(h, m, 0).unwrap()));
        }
        Meeting::new(draft).unwrap()
    }

    #[test]
    fn test_oversized_window_saturates() {
        let window = DateWindow::new(d(2025, 10, 1), u32::MAX);
        assert_eq!(window.end(), NaiveDate::MAX);
        assert!(window.contains(d(9999, 12, 31)));
        assert!(!window.contains(d(2025, 9, 30)));
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let w = DateWindow::new(d(2025, 10, 1), 10);
        assert_eq!(w.end(), d(2025, 10, 11));
        assert!(w.contains(d(2025, 10, 1)));
        assert!(w.contains(d(2025, 10, 11)));
        assert!(!w.contains(d(2025, 10, 12)));
        assert!(!w.contains(d(2025, 9, 30)));
        assert_eq!(w.to_string(), "2025-10-01..=2025-10-11");
    }

    #[test]
    fn test_zero_day_window_is_start_only() {
        let w = DateWindow::new(d(2025, 10, 1), 0);
        assert!(w.contains(d(2025, 10, 1)));
        assert!(!w.contains(d(2025, 10, 2)));
    }

    #[test]
    fn test_duplicates_collapse_to_first_seen() {
        let w = DateWindow::new(d(2025, 10, 1), 10);
        let a = meeting("Sauda kommune", "Formannskapet", d(2025, 10, 2), Some((10, 0)));
        let b = meeting("Sauda kommune", "Formannskapet", d(2025, 10, 2), Some((10, 0)));
        let other_time = meeting("Sauda kommune", "Formannskapet", d(2025, 10, 2), Some((12, 0)));
        let out = merge_and_filter(vec![a, b, other_time], &w);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_order_and_untimed_first() {
        let w = DateWindow::new(d(2025, 10, 1), 10);
        let out = merge_and_filter(
            vec![
                meeting("Time kommune", "Kommunestyret", d(2025, 10, 3), Some((18, 0))),
                meeting("Sauda kommune", "Formannskapet", d(2025, 10, 3), Some((9, 0))),
                meeting("Sauda kommune", "Eldrerådet", d(2025, 10, 3), None),
                meeting("Hå kommune", "Formannskapet", d(2025, 10, 2), Some((23, 0))),
                meeting("Hå kommune", "Gammelt møte", d(2025, 9, 20), None),
            ],
            &w,
        );
        let titles: Vec<_> = out.iter().map(|m| (m.organization(), m.title())).collect();
        assert_eq!(
            titles,
            vec![
                ("Hå kommune", "Formannskapet"),
                ("Sauda kommune", "Eldrerådet"),
                ("Sauda kommune", "Formannskapet"),
                ("Time kommune", "Kommunestyret"),
            ]
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let w = DateWindow::new(d(2025, 10, 1), 10);
        let input = vec![
            meeting("B", "X", d(2025, 10, 5), None),
            meeting("A", "Y", d(2025, 10, 5), None),
            meeting("A", "Y", d(2025, 10, 5), None),
            meeting("C", "Z", d(2025, 10, 1), Some((8, 0))),
        ];
        let once = merge_and_filter(input, &w);
        let twice = merge_and_filter(once.clone(), &w);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_input() {
        let w = DateWindow::new(d(2025, 10, 1), 10);
        assert!(merge_and_filter(Vec::new(), &w).is_empty());
    }
}
