pub mod admin;
pub mod availability;
pub mod bookings;
pub mod calendar;
pub mod calls;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::DomainError;

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// Standard error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// The single place a domain error becomes a transport status code
pub fn error_response(err: DomainError) -> Response {
    let status = match &err {
        DomainError::MissingField(_) | DomainError::Invalid { .. } => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::SlotTaken | DomainError::AlreadyCancelled => StatusCode::CONFLICT,
        DomainError::CalendarUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(err.to_string()))).into_response()
}

/// Spoken messages in the business's language. The voice layer reads
/// these verbatim to the caller.
pub mod spoken {
    use crate::models::{DayHours, Language};

    pub fn closed(lang: Language) -> String {
        match lang {
            Language::Es => "Lo siento, el salón está cerrado ese día".to_string(),
            Language::En => "Sorry, the salon is closed that day".to_string(),
        }
    }

    pub fn outside_hours(lang: Language, window: DayHours) -> String {
        let open = window.open.format("%H:%M");
        let close = window.close.format("%H:%M");
        match lang {
            Language::Es => format!("Lo siento, trabajamos de {} a {}", open, close),
            Language::En => format!("Sorry, we work from {} to {}", open, close),
        }
    }

    pub fn available(lang: Language, staff_names: &[String]) -> String {
        match lang {
            Language::Es => match staff_names.len() {
                0 => "Horario disponible".to_string(),
                1 => format!("Horario disponible con {}", staff_names[0]),
                _ => format!("Horario disponible con {}", staff_names.join(" y ")),
            },
            Language::En => match staff_names.len() {
                0 => "That time is available".to_string(),
                1 => format!("That time is available with {}", staff_names[0]),
                _ => format!("That time is available with {}", staff_names.join(" and ")),
            },
        }
    }

    pub fn occupied(lang: Language, suggestions: &[String]) -> String {
        if suggestions.is_empty() {
            return match lang {
                Language::Es => "No hay horarios disponibles para ese día".to_string(),
                Language::En => "There are no available times that day".to_string(),
            };
        }
        let list = suggestions.join(", ");
        match lang {
            Language::Es => format!(
                "Lo siento, esa hora está ocupada. Tengo disponible a las {}",
                list
            ),
            Language::En => format!("Sorry, that time is taken. I have {} available", list),
        }
    }

    pub fn clarify_time(lang: Language) -> String {
        match lang {
            Language::Es => "¿Por la mañana o por la tarde?".to_string(),
            Language::En => "Would that be morning or evening?".to_string(),
        }
    }

    pub fn calendar_down(lang: Language) -> String {
        match lang {
            Language::Es => {
                "Lo siento, no puedo consultar la agenda ahora mismo. ¿Puedes llamar más tarde?"
                    .to_string()
            }
            Language::En => {
                "Sorry, I can't check the calendar right now. Could you call back later?"
                    .to_string()
            }
        }
    }

    pub fn modified(lang: Language, changes: &[String]) -> String {
        let list = changes.join(", ");
        match lang {
            Language::Es => format!("Cita modificada: {}", list),
            Language::En => format!("Booking updated: {}", list),
        }
    }

    pub fn cancelled(lang: Language, service: &str, date: &str, time: &str) -> String {
        match lang {
            Language::Es => format!("Cita cancelada: {} el {} a las {}", service, date, time),
            Language::En => format!("Booking cancelled: {} on {} at {}", service, date, time),
        }
    }
}
