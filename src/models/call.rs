use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome classification extracted from a completed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Booked,
    Cancelled,
    InquiryOnly,
    #[default]
    Unknown,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Booked => "booked",
            CallOutcome::Cancelled => "cancelled",
            CallOutcome::InquiryOnly => "inquiry_only",
            CallOutcome::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booked" => Some(CallOutcome::Booked),
            "cancelled" => Some(CallOutcome::Cancelled),
            "inquiry_only" => Some(CallOutcome::InquiryOnly),
            "unknown" => Some(CallOutcome::Unknown),
            _ => None,
        }
    }
}

/// Append-only record of a phone interaction. Never mutated after
/// insert except to attach a derived summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub business_id: String,
    pub platform_call_id: String,
    pub customer_name: String,
    pub phone: String,
    pub duration_seconds: i64,
    pub outcome: CallOutcome,
    pub transcript: String,
    pub recording_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub created_at: i64,
}

/// End-of-call report delivered by the voice platform. The structured
/// extraction fields are the reconciler's primary input; the transcript
/// is archival plus a degraded-mode fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallReport {
    pub assistant_id: String,
    pub platform_call_id: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Number the call originated from
    pub customer_phone: String,
    /// Number the customer asked to be contacted on, when different
    #[serde(default)]
    pub booking_phone: Option<String>,
    #[serde(default)]
    pub service_requested: Option<String>,
    #[serde(default)]
    pub booking_date: Option<String>,
    #[serde(default)]
    pub booking_time: Option<String>,
    pub outcome: CallOutcome,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallReport {
    /// Explicit duration wins; otherwise derive it from the timestamps
    pub fn call_duration_seconds(&self) -> i64 {
        if let Some(d) = self.duration_seconds {
            return d;
        }
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).num_seconds().max(0),
            _ => 0,
        }
    }
}
