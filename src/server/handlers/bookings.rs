use axum::{
    extract::{Extension, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{error_response, spoken};
use crate::booking::BookingReconciler;
use crate::error::DomainError;
use crate::models::{Booking, Language};
use crate::server::middleware::AuthenticatedBusiness;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct FindBookingsRequest {
    pub assistant_id: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub fallback_phone: Option<String>,
}

#[derive(Serialize)]
pub struct FoundBooking {
    pub id: String,
    pub date: String,
    pub time: String,
    pub service: String,
    pub customer_name: String,
}

#[derive(Serialize)]
pub struct FindBookingsResponse {
    pub found: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bookings: Vec<FoundBooking>,
    pub message: String,
}

/// Look up a caller's upcoming bookings: by phone number first, then by
/// name plus a secondary phone number.
pub async fn find_bookings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FindBookingsRequest>,
) -> Response {
    let business = match state.db.get_business_by_assistant(&req.assistant_id) {
        Ok(Some(b)) => b,
        Ok(None) => return error_response(DomainError::NotFound("Business")),
        Err(e) => return error_response(e.into()),
    };
    let lang = business.language;
    let today = business.today().format("%Y-%m-%d").to_string();

    let mut bookings: Vec<Booking> = Vec::new();

    if let Some(phone) = req.phone_number.as_deref().filter(|p| !p.trim().is_empty()) {
        bookings = match state.db.find_bookings_by_phone(&business.id, phone, &today) {
            Ok(found) => found,
            Err(e) => return error_response(e.into()),
        };
    }

    if bookings.is_empty() {
        if let (Some(name), Some(phone)) = (
            req.customer_name.as_deref().filter(|n| !n.trim().is_empty()),
            req.fallback_phone.as_deref().filter(|p| !p.trim().is_empty()),
        ) {
            bookings = match state
                .db
                .find_bookings_by_name_and_phone(&business.id, name, phone, &today)
            {
                Ok(found) => found,
                Err(e) => return error_response(e.into()),
            };
        }
    }

    if bookings.is_empty() {
        let message = match lang {
            Language::Es => "No encontré citas con tus datos".to_string(),
            Language::En => "I couldn't find any bookings with your details".to_string(),
        };
        return Json(FindBookingsResponse {
            found: false,
            count: 0,
            customer_name: None,
            bookings: Vec::new(),
            message,
        })
        .into_response();
    }

    let customer_name = bookings[0].customer_name.clone();
    let mut found = Vec::with_capacity(bookings.len());
    for b in &bookings {
        let service = match b.service_id.as_deref() {
            Some(id) => match state.db.get_service(id) {
                Ok(s) => s.map(|s| s.name),
                Err(e) => return error_response(e.into()),
            },
            None => None,
        };
        found.push(FoundBooking {
            id: b.id.clone(),
            date: b.booking_date.clone(),
            time: b.booking_time.clone(),
            service: service.unwrap_or_else(|| "Servicio".to_string()),
            customer_name: b.customer_name.clone(),
        });
    }

    let message = match lang {
        Language::Es => {
            if found.len() == 1 {
                let b = &found[0];
                format!(
                    "Hola, {}! Tienes una cita: {} el {} a las {}",
                    customer_name, b.service, b.date, b.time
                )
            } else {
                let list: Vec<String> = found
                    .iter()
                    .enumerate()
                    .map(|(i, b)| format!("{}. {} el {} a las {}", i + 1, b.service, b.date, b.time))
                    .collect();
                format!(
                    "Hola, {}! Tienes {} citas: {}",
                    customer_name,
                    found.len(),
                    list.join("; ")
                )
            }
        }
        Language::En => {
            if found.len() == 1 {
                let b = &found[0];
                format!(
                    "Hi {}! You have one booking: {} on {} at {}",
                    customer_name, b.service, b.date, b.time
                )
            } else {
                let list: Vec<String> = found
                    .iter()
                    .enumerate()
                    .map(|(i, b)| format!("{}. {} on {} at {}", i + 1, b.service, b.date, b.time))
                    .collect();
                format!(
                    "Hi {}! You have {} bookings: {}",
                    customer_name,
                    found.len(),
                    list.join("; ")
                )
            }
        }
    };

    Json(FindBookingsResponse {
        found: true,
        count: found.len(),
        customer_name: Some(customer_name),
        bookings: found,
        message,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ModifyBookingRequest {
    pub booking_id: String,
    #[serde(default)]
    pub new_date: Option<String>,
    #[serde(default)]
    pub new_time: Option<String>,
    #[serde(default)]
    pub new_service: Option<String>,
}

#[derive(Serialize)]
pub struct MutationResponse {
    pub success: bool,
    pub message: String,
}

pub async fn modify_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ModifyBookingRequest>,
) -> Response {
    let reconciler = BookingReconciler::new(&state.db, state.calendar.as_ref());
    let summary = match reconciler
        .modify_booking(
            &req.booking_id,
            req.new_date.as_deref(),
            req.new_time.as_deref(),
            req.new_service.as_deref(),
        )
        .await
    {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    let lang = language_for(&state, &summary.booking.business_id);
    Json(MutationResponse {
        success: true,
        message: spoken::modified(lang, &summary.changes),
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub booking_id: String,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelBookingRequest>,
) -> Response {
    // Read the tenant language before the row flips to cancelled
    let lang = match state.db.get_booking(&req.booking_id) {
        Ok(Some(b)) => language_for(&state, &b.business_id),
        _ => Language::default(),
    };

    let reconciler = BookingReconciler::new(&state.db, state.calendar.as_ref());
    match reconciler.cancel_booking(&req.booking_id).await {
        Ok(summary) => Json(MutationResponse {
            success: true,
            message: spoken::cancelled(
                lang,
                &summary.service_name,
                &summary.booking_date,
                &summary.booking_time,
            ),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListBookingsQuery {
    #[serde(default)]
    pub from_date: Option<String>,
}

#[derive(Serialize)]
pub struct ListBookingsResponse {
    pub bookings: Vec<Booking>,
}

/// Dashboard listing for the authenticated tenant
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedBusiness(business)): Extension<AuthenticatedBusiness>,
    Query(query): Query<ListBookingsQuery>,
) -> Response {
    let from_date = query
        .from_date
        .unwrap_or_else(|| business.today().format("%Y-%m-%d").to_string());

    match state.db.list_upcoming_bookings(&business.id, &from_date) {
        Ok(bookings) => Json(ListBookingsResponse { bookings }).into_response(),
        Err(e) => error_response(e.into()),
    }
}

fn language_for(state: &AppState, business_id: &str) -> Language {
    state
        .db
        .get_business(business_id)
        .ok()
        .flatten()
        .map(|b| b.language)
        .unwrap_or_default()
}
