//! Calendar arithmetic for the paged transaction pull and the dashboard.
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

/// Partitions `[from, to)` into calendar-month-aligned windows.
///
/// The first window starts on the first day of the month containing `from`;
/// every subsequent window is exactly one calendar month; the final window is
/// clipped to `to`. The union of the windows covers the span with no gaps and
/// no overlaps, which bounds per-request payload size and isolates a single
/// month's failure from the rest of the pull.
#[must_use]
pub fn monthly_windows(from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut windows = Vec::new();
    let mut current = first_of_month(from);
    while current < to {
        let next = first_of_next_month(current);
        windows.push((current, next.min(to)));
        current = next;
    }
    windows
}

fn first_of_month(at: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(at.year(), at.month(), 1)
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or(at)
}

fn first_of_next_month(at: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or(at)
}

/// Number of days in the month containing `date`.
#[must_use]
pub fn days_in_month(date: NaiveDate) -> u32 {
    let first = date.with_day(1).unwrap_or(date);
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    next.map(|n| (n - first).num_days() as u32).unwrap_or(30)
}

/// Days remaining in the current month, excluding `today`.
///
/// On the last day of a month this rolls over and reports the length of the
/// next month, so the dashboard's per-day budget never divides by zero.
#[must_use]
pub fn days_left_in_month(today: NaiveDate) -> u32 {
    let total = days_in_month(today);
    if today.day() >= total {
        let (year, month) = if today.month() == 12 {
            (today.year() + 1, 1)
        } else {
            (today.year(), today.month() + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(days_in_month)
            .unwrap_or(total)
    } else {
        total - today.day()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn windows_cover_span_without_gaps_or_overlaps() {
        let from = utc(2025, 1, 15, 9);
        let to = utc(2025, 4, 10, 17);
        let windows = monthly_windows(from, to);

        assert_eq!(windows.len(), 4);
        // First window starts at the first of the month containing `from`.
        assert_eq!(windows[0].0, utc(2025, 1, 1, 0));
        // Adjacent windows meet exactly.
        for pair in windows.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
        // Last window is clipped to `to` exactly.
        assert_eq!(windows.last().unwrap().1, to);
    }

    #[test]
    fn windows_span_a_year_boundary() {
        let windows = monthly_windows(utc(2024, 11, 20, 0), utc(2025, 2, 1, 0));
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[1].0, utc(2024, 12, 1, 0));
        assert_eq!(windows[2].0, utc(2025, 1, 1, 0));
        assert_eq!(windows[2].1, utc(2025, 2, 1, 0));
    }

    #[test]
    fn empty_span_yields_no_windows() {
        let at = utc(2025, 3, 3, 3);
        assert!(monthly_windows(at, at).is_empty());
    }

    #[test]
    fn days_left_middle_of_month() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(days_left_in_month(today), 16);
    }

    #[test]
    fn days_left_last_day_returns_next_month_days() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(days_left_in_month(today), 29); // Feb 2024 is a leap month
    }

    #[test]
    fn days_left_december_rolls_to_january() {
        let today = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(days_left_in_month(today), 31);
    }
}
