use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A staff member of a business. `calendar_id` names the external
/// calendar whose free/busy state is authoritative for this person;
/// `channel_id`/`channel_expires_at` track the push-notification
/// subscription on that calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub email: Option<String>,
    pub calendar_id: Option<String>,
    pub is_active: bool,
    pub channel_id: Option<String>,
    pub channel_expires_at: Option<DateTime<Utc>>,
}

impl Staff {
    /// A staff member with a missing or soon-expiring webhook channel
    /// must be proactively renewed or inbound sync silently stops.
    pub fn needs_channel_renewal(&self, now: DateTime<Utc>, lead_days: i64) -> bool {
        if !self.is_active || self.calendar_id.is_none() {
            return false;
        }
        match self.channel_expires_at {
            None => true,
            Some(expires) => expires < now + Duration::days(lead_days),
        }
    }
}

/// Minimal staff identity returned to the voice layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaffSummary {
    pub id: String,
    pub name: String,
}

impl From<&Staff> for StaffSummary {
    fn from(s: &Staff) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
        }
    }
}
