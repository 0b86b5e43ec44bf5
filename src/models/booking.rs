use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Booked,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "booked",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booked" => Some(BookingStatus::Booked),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a booking originated: a phone call handled by the receptionist,
/// or an event the owner/staff added directly to their calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingSource {
    #[default]
    Phone,
    Owner,
}

impl BookingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingSource::Phone => "phone",
            BookingSource::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "phone" => Some(BookingSource::Phone),
            "owner" => Some(BookingSource::Owner),
            _ => None,
        }
    }
}

/// A booking record. `calendar_event_id` + `synced_at` track mirroring
/// into the external calendar; a row with a NULL event id is an unsynced
/// booking awaiting the resync pass, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub business_id: String,
    pub service_id: Option<String>,
    pub staff_id: Option<String>,
    pub customer_name: String,
    /// Number the call originated from
    pub customer_phone: String,
    /// Number the customer asked to be contacted on; may differ
    pub booking_phone: String,
    /// YYYY-MM-DD in the business timezone
    pub booking_date: String,
    /// HH:MM in the business timezone
    pub booking_time: String,
    pub duration_minutes: i64,
    pub status: BookingStatus,
    pub booking_source: BookingSource,
    pub call_id: Option<String>,
    pub calendar_event_id: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: i64,
}

impl Booking {
    pub fn is_synced(&self) -> bool {
        self.calendar_event_id.is_some()
    }
}

/// Short prefixed booking id, e.g. "bkg_3f1a9c2e04d7"
pub fn new_booking_id() -> String {
    format!(
        "bkg_{}",
        &Uuid::new_v4().to_string().replace('-', "")[..12]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            BookingStatus::Booked,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("nonsense"), None);
    }

    #[test]
    fn test_booking_id_shape() {
        let id = new_booking_id();
        assert!(id.starts_with("bkg_"));
        assert_eq!(id.len(), 16);
    }
}
