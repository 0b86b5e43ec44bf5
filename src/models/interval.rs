use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A half-open [start, end) interval during which a staff member is
/// already committed, sourced from the external calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Half-open overlap: back-to-back intervals (self.end == other.start)
    /// do not overlap, so a booking may start exactly when another ends.
    pub fn overlaps(&self, other: &BusyInterval) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn conflicts_with(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }
}
