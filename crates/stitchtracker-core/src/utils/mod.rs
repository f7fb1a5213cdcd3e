//! Small date utilities.

pub mod activity;

pub use activity::{
    calendar_grid, counts_by_date, intensity, month_labels, CalendarDay, WeekStart,
    MAX_CALENDAR_WEEKS,
};
