mod availability;
mod hours;
mod suggest;

pub use availability::*;
pub use hours::*;
pub use suggest::*;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::DomainError;

/// Convert a salon-local wall-clock instant to UTC. DST-ambiguous times
/// take the earliest valid reading; times that do not exist locally
/// (spring-forward gap) are rejected.
pub fn local_to_utc(
    tz: Tz,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<DateTime<Utc>, DomainError> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            DomainError::invalid(
                "booking_time",
                format!("{} does not exist in timezone {}", naive, tz),
            )
        })
}
