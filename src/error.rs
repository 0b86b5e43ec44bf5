use thiserror::Error;

/// Domain-level error taxonomy. Component functions return these instead
/// of panicking or leaking transport concerns; only the HTTP handlers
/// translate them into status codes and spoken messages.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A required input field was absent.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// An input field was present but malformed.
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// A referenced entity does not exist. The string is the entity kind
    /// ("Business", "Service", ...) so the voice layer can phrase a
    /// specific spoken response.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The requested slot was taken between the availability check and
    /// the booking write (unique-index violation).
    #[error("Slot already taken")]
    SlotTaken,

    /// Modify/cancel targeted a booking that is already cancelled.
    #[error("Booking is already cancelled")]
    AlreadyCancelled,

    /// The external calendar could not be reached or errored. Read paths
    /// surface this as "unknown", never as "available".
    #[error("Calendar unavailable: {0}")]
    CalendarUnavailable(String),

    /// Datastore failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl DomainError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        DomainError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for DomainError {
    fn from(err: anyhow::Error) -> Self {
        if crate::db::is_slot_conflict(&err) {
            DomainError::SlotTaken
        } else {
            DomainError::Database(err.to_string())
        }
    }
}
