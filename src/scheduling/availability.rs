use chrono::{Duration, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use futures::future::join_all;

use super::local_to_utc;
use crate::calendar::CalendarProvider;
use crate::error::DomainError;
use crate::models::{BusyInterval, Staff, StaffSummary};

/// Result of a conflict check against the external calendar.
/// `busy_sets` holds the day's busy intervals per consulted staff
/// member, in the same order as `consulted`, so the suggestion engine
/// can look for slots where at least one of them is free.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub available: bool,
    /// First conflict-free staff in stable name order; the caller may
    /// instead let the customer pick from `available_staff`
    pub assigned: Option<StaffSummary>,
    pub available_staff: Vec<StaffSummary>,
    pub consulted: Vec<StaffSummary>,
    pub busy_sets: Vec<Vec<BusyInterval>>,
}

/// Check whether [date, time, duration) can be booked for one staff
/// member or for any qualified staff member.
///
/// The external calendar is authoritative: the bookings table is never
/// consulted here. An unreachable calendar is a `CalendarUnavailable`
/// error, not an empty busy list - silently reporting "available" risks
/// a double booking, which costs the salon more than a false "taken".
pub async fn resolve(
    calendar: &dyn CalendarProvider,
    tz: Tz,
    staff_pool: &[Staff],
    date: NaiveDate,
    time: NaiveTime,
    duration_minutes: i64,
    requested_staff: Option<&str>,
) -> Result<Resolution, DomainError> {
    if duration_minutes <= 0 {
        return Err(DomainError::invalid(
            "duration_minutes",
            "must be a positive number of minutes",
        ));
    }

    let requested_start = local_to_utc(tz, date, time)?;
    let requested_end = requested_start + Duration::minutes(duration_minutes);

    // Full-day window for the busy query
    let day_start = local_to_utc(tz, date, NaiveTime::MIN)?;
    let day_end = local_to_utc(tz, date + Duration::days(1), NaiveTime::MIN)?;

    let mut targets: Vec<&Staff> = staff_pool
        .iter()
        .filter(|s| s.is_active && s.calendar_id.is_some())
        .collect();
    targets.sort_by(|a, b| a.name.cmp(&b.name));

    if let Some(wanted) = requested_staff {
        let found = staff_pool.iter().find(|s| {
            s.id == wanted || s.name.eq_ignore_ascii_case(wanted)
        });
        let staff = found.ok_or(DomainError::NotFound("Staff"))?;
        if staff.calendar_id.is_none() {
            return Err(DomainError::invalid(
                "staff_id",
                format!("{} has no calendar configured", staff.name),
            ));
        }
        targets = vec![staff];
    }

    // Read-only, independent lookups: fan out concurrently
    let lookups = targets.iter().map(|staff| {
        let calendar_id = staff.calendar_id.as_deref().unwrap_or_default();
        calendar.busy_intervals(calendar_id, day_start, day_end)
    });
    let results = join_all(lookups).await;

    let mut consulted = Vec::with_capacity(targets.len());
    let mut busy_sets = Vec::with_capacity(targets.len());
    let mut available_staff = Vec::new();

    for (staff, result) in targets.iter().zip(results) {
        let busy = result.map_err(|e| {
            tracing::warn!(staff = %staff.name, "calendar lookup failed: {e}");
            DomainError::CalendarUnavailable(e.to_string())
        })?;

        let conflict = busy
            .iter()
            .any(|b| b.conflicts_with(requested_start, requested_end));
        if !conflict {
            available_staff.push(StaffSummary::from(*staff));
        }
        consulted.push(StaffSummary::from(*staff));
        busy_sets.push(busy);
    }

    Ok(Resolution {
        available: !available_staff.is_empty(),
        assigned: available_staff.first().cloned(),
        available_staff,
        consulted,
        busy_sets,
    })
}
