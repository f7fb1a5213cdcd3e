//! Bucketing of progress updates into a GitHub-style activity calendar.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, Local, NaiveDate, TimeZone};

use crate::models::Progress;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub count: u32,
}

/// Number of progress updates per local calendar day.
pub fn counts_by_date(progress: &[Progress]) -> BTreeMap<NaiveDate, u32> {
    counts_by_date_in(progress, &Local)
}

pub fn counts_by_date_in<Tz: TimeZone>(progress: &[Progress], tz: &Tz) -> BTreeMap<NaiveDate, u32> {
    let mut counts = BTreeMap::new();
    for entry in progress {
        let day = entry.date.with_timezone(tz).date_naive();
        *counts.entry(day).or_insert(0) += 1;
    }
    counts
}

/// Longest calendar [`calendar_grid`] will build, about ten years.
pub const MAX_CALENDAR_WEEKS: usize = 520;

/// `weeks` columns of seven days, oldest first, the last column being the
/// week that contains `today`. `weeks` is capped at [`MAX_CALENDAR_WEEKS`];
/// a grid that would leave the supported date range is empty.
pub fn calendar_grid(
    counts: &BTreeMap<NaiveDate, u32>,
    today: NaiveDate,
    weeks: usize,
    week_start: WeekStart,
) -> Vec<Vec<CalendarDay>> {
    let weeks = weeks.min(MAX_CALENDAR_WEEKS);
    let offset = match week_start {
        WeekStart::Sunday => today.weekday().num_days_from_sunday(),
        WeekStart::Monday => today.weekday().num_days_from_monday(),
    };
    let first_week_start = today
        .checked_sub_days(Days::new(u64::from(offset)))
        .and_then(|d| d.checked_sub_days(Days::new(7 * weeks.saturating_sub(1) as u64)));
    let Some(first_week_start) = first_week_start else {
        return Vec::new();
    };

    (0..weeks)
        .map(|w| {
            (0..7)
                .map(|d| {
                    let date = first_week_start.checked_add_days(Days::new((w * 7 + d) as u64))?;
                    Some(CalendarDay {
                        date,
                        count: counts.get(&date).copied().unwrap_or(0),
                    })
                })
                .collect::<Option<Vec<_>>>()
        })
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}

/// Column index → short month name, placed on the first column containing
/// the 1st of each month. Falls back to the first column's month.
pub fn month_labels(grid: &[Vec<CalendarDay>]) -> BTreeMap<usize, &'static str> {
    let mut labels = BTreeMap::new();
    let mut last_month = None;
    for (idx, column) in grid.iter().enumerate() {
        if let Some(first) = column.iter().find(|d| d.date.day() == 1) {
            let month = first.date.month0();
            if last_month != Some(month) {
                labels.insert(idx, MONTHS[month as usize]);
                last_month = Some(month);
            }
        }
    }
    if labels.is_empty() {
        if let Some(day) = grid.first().and_then(|c| c.first()) {
            labels.insert(0, MONTHS[day.date.month0() as usize]);
        }
    }
    labels
}

/// Shade bucket 0..=4 for a day's count.
pub fn intensity(count: u32) -> u8 {
    match count {
        0 => 0,
        1 => 1,
        2..=3 => 2,
        4..=6 => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn progress_at(date: &str) -> Progress {
        serde_json::from_value(serde_json::json!({"id": 1, "project": 1, "date": date})).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_counts_by_date() {
        let progress = vec![
            progress_at("2025-03-01T08:00:00Z"),
            progress_at("2025-03-01T22:00:00Z"),
            progress_at("2025-03-02T00:30:00+02:00"), // 2025-03-01 in UTC
            progress_at("2025-03-04T12:00:00Z"),
        ];
        let counts = counts_by_date_in(&progress, &Utc);
        assert_eq!(counts.get(&ymd(2025, 3, 1)), Some(&3));
        assert_eq!(counts.get(&ymd(2025, 3, 4)), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_grid_ends_with_current_week() {
        // 2025-03-05 is a Wednesday
        let today = ymd(2025, 3, 5);
        let mut counts = BTreeMap::new();
        counts.insert(today, 2);

        let grid = calendar_grid(&counts, today, 3, WeekStart::Sunday);
        assert_eq!(grid.len(), 3);
        assert!(grid.iter().all(|c| c.len() == 7));
        assert_eq!(grid[2][0].date, ymd(2025, 3, 2));
        assert_eq!(grid[0][0].date, ymd(2025, 2, 16));
        assert_eq!(grid[2][3], CalendarDay { date: today, count: 2 });

        let grid = calendar_grid(&counts, today, 1, WeekStart::Monday);
        assert_eq!(grid[0][0].date, ymd(2025, 3, 3));
    }

    #[test]
    fn test_grid_is_capped_and_never_leaves_date_range() {
        let today = ymd(2025, 3, 5);
        let grid = calendar_grid(&BTreeMap::new(), today, 20_000_000, WeekStart::Sunday);
        assert_eq!(grid.len(), MAX_CALENDAR_WEEKS);
        assert_eq!(grid.last().unwrap()[3].date, today);

        assert!(calendar_grid(&BTreeMap::new(), NaiveDate::MIN, 4, WeekStart::Sunday).is_empty());
    }

    #[test]
    fn test_month_labels() {
        let grid = calendar_grid(&BTreeMap::new(), ymd(2025, 3, 5), 3, WeekStart::Sunday);
        let labels = month_labels(&grid);
        // Mar 1 falls in the column starting Feb 23
        assert_eq!(labels.get(&1), Some(&"Mar"));
        assert_eq!(labels.len(), 1);

        let grid = calendar_grid(&BTreeMap::new(), ymd(2025, 3, 20), 1, WeekStart::Sunday);
        assert_eq!(month_labels(&grid).get(&0), Some(&"Mar"));
    }

    #[test]
    fn test_intensity() {
        assert_eq!(intensity(0), 0);
        assert_eq!(intensity(1), 1);
        assert_eq!(intensity(3), 2);
        assert_eq!(intensity(6), 3);
        assert_eq!(intensity(40), 4);
    }
}
