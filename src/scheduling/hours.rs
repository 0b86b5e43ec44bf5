use chrono::{NaiveDate, NaiveTime};

use crate::models::{DayHours, WeekSchedule};

/// Outcome of the working-hours gate. Closed days and out-of-window
/// times are distinct so the voice layer can phrase "we're closed that
/// day" differently from "we work from X to Y".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoursDecision {
    Open(DayHours),
    /// No working-hours row for the weekday, or the day is marked closed
    Closed,
    /// The day is open but the requested time falls outside the window
    OutsideHours(DayHours),
}

impl HoursDecision {
    pub fn is_open(&self) -> bool {
        matches!(self, HoursDecision::Open(_))
    }
}

/// The global gate applied before any per-staff calendar check, both to
/// avoid wasted external calls and to produce a distinct error reason.
pub fn check_hours(schedule: &WeekSchedule, date: NaiveDate, time: NaiveTime) -> HoursDecision {
    match schedule.for_date(date) {
        None => HoursDecision::Closed,
        Some(window) if window.contains(time) => HoursDecision::Open(window),
        Some(window) => HoursDecision::OutsideHours(window),
    }
}
