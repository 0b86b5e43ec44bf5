pub mod booking;
pub mod calendar;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod scheduling;
pub mod server;
pub mod timeparse;

pub use error::DomainError;
pub use models::*;

/// API version prefix
pub const API_VERSION: &str = "v1";

/// Lead time before channel expiry at which calendar webhook
/// subscriptions are renewed
pub const CHANNEL_RENEWAL_LEAD_DAYS: i64 = 10;

/// Lifetime requested for a new calendar webhook subscription
pub const CHANNEL_LIFETIME_DAYS: i64 = 30;

/// Timeout applied to every outbound HTTP call
pub const EXTERNAL_CALL_TIMEOUT_SECS: u64 = 10;
