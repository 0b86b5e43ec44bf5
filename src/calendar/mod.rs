mod google;

pub use google::*;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::models::BusyInterval;

/// Calendar capability boundary. The external calendar is the ground
/// truth for busy time; the internal bookings table is only a record of
/// what we created, so conflict detection goes through this trait and
/// never through the database.
///
/// Write operations are idempotent from the caller's perspective:
/// `create_event` returns None instead of erroring so the reconciler can
/// apply its non-blocking sync policy, and deleting an already-gone
/// event counts as success.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Busy intervals for one calendar over [start, end). Read failures
    /// are real errors: the caller must report "unknown", never
    /// "available".
    async fn busy_intervals(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>>;

    /// Create an event; None on failure (logged inside the adapter)
    async fn create_event(&self, calendar_id: &str, draft: &EventDraft) -> Option<String>;

    /// Patch an existing event; false on failure
    async fn update_event(&self, calendar_id: &str, event_id: &str, patch: &EventPatch) -> bool;

    /// Delete an event; a missing event is already gone and counts as true
    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> bool;

    /// Upcoming events on one calendar, soonest first
    async fn list_upcoming(&self, calendar_id: &str, max_results: u32)
        -> Result<Vec<RemoteEvent>>;

    /// Subscribe a webhook channel to one calendar's changes
    async fn watch(
        &self,
        calendar_id: &str,
        channel_id: &str,
        address: &str,
        expiration: DateTime<Utc>,
    ) -> Result<ChannelInfo>;
}

/// New event body. Times are wall-clock in the business's timezone; the
/// adapter ships them with the IANA name so the calendar renders them in
/// salon-local time.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub summary: String,
    pub description: String,
    pub start_local: NaiveDateTime,
    pub end_local: NaiveDateTime,
    pub timezone: String,
}

/// Partial event update; None fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start_local: Option<NaiveDateTime>,
    pub end_local: Option<NaiveDateTime>,
    pub timezone: String,
}

/// An event as listed from the external calendar. All-day events carry
/// no start/end instants and are skipped by inbound reconciliation.
#[derive(Debug, Clone)]
pub struct RemoteEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// A registered webhook channel
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: String,
    pub expires_at: DateTime<Utc>,
}
