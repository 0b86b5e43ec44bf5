use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{error_response, spoken};
use crate::error::DomainError;
use crate::models::{resolve_service, Language, StaffSummary};
use crate::scheduling::{self, check_hours, suggest_times, HoursDecision};
use crate::server::AppState;
use crate::timeparse::{ParseContext, ParsedTime};

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub assistant_id: String,
    pub service_name: String,
    pub booking_date: String,
    pub booking_time: String,
    #[serde(default)]
    pub staff_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_staff: Option<StaffSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_staff: Option<Vec<StaffSummary>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggested_times: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disambiguation_needed: bool,
    pub message: String,
}

impl AvailabilityResponse {
    fn negative(reason: &str, message: String) -> Self {
        Self {
            available: false,
            reason: Some(reason.to_string()),
            actual_date: None,
            booking_time: None,
            service_name: None,
            assigned_staff: None,
            available_staff: None,
            suggested_times: Vec::new(),
            disambiguation_needed: false,
            message,
        }
    }
}

/// Synchronous mid-call availability check. The working-hours gate runs
/// before any calendar query; conflicts are a normal negative result
/// carrying up to three alternative times.
pub async fn check_availability(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AvailabilityRequest>,
) -> Response {
    for (field, value) in [
        ("assistant_id", &req.assistant_id),
        ("service_name", &req.service_name),
        ("booking_date", &req.booking_date),
        ("booking_time", &req.booking_time),
    ] {
        if value.trim().is_empty() {
            return error_response(DomainError::MissingField(field));
        }
    }

    let business = match state.db.get_business_by_assistant(&req.assistant_id) {
        Ok(Some(b)) => b,
        Ok(None) => return error_response(DomainError::NotFound("Business")),
        Err(e) => return error_response(e.into()),
    };
    let lang = business.language;

    let services = match state.db.active_services(&business.id) {
        Ok(s) => s,
        Err(e) => return error_response(e.into()),
    };
    let Some(service) = resolve_service(&services, &req.service_name).cloned() else {
        return error_response(DomainError::NotFound("Service"));
    };

    let schedule = match state.db.get_week_schedule(&business.id) {
        Ok(s) => s,
        Err(e) => return error_response(e.into()),
    };
    let today = business.today();
    let ctx = ParseContext {
        today,
        schedule: &schedule,
    };
    let parsed = state
        .parser
        .normalize(&req.booking_date, &req.booking_time, &ctx)
        .await;

    let time = match parsed.time {
        ParsedTime::Resolved(t) => t,
        ParsedTime::Ambiguous { .. } => {
            // Working hours could not disambiguate; ask instead of guessing
            let mut resp =
                AvailabilityResponse::negative("Ambiguous time", spoken::clarify_time(lang));
            resp.disambiguation_needed = true;
            return Json(resp).into_response();
        }
    };

    let mut date = parsed.date;
    if date < today {
        date += Duration::days(7);
    }
    let actual_date = date.format("%Y-%m-%d").to_string();

    // Gate on working hours before spending any calendar calls
    let window = match check_hours(&schedule, date, time) {
        HoursDecision::Closed => {
            let mut resp = AvailabilityResponse::negative("Salon closed", spoken::closed(lang));
            resp.actual_date = Some(actual_date);
            return Json(resp).into_response();
        }
        HoursDecision::OutsideHours(window) => {
            let mut resp = AvailabilityResponse::negative(
                "Outside working hours",
                spoken::outside_hours(lang, window),
            );
            resp.actual_date = Some(actual_date);
            return Json(resp).into_response();
        }
        HoursDecision::Open(window) => window,
    };

    let pool = match state.db.staff_for_service(&service.id) {
        Ok(assigned) if !assigned.is_empty() => assigned,
        Ok(_) => match state.db.active_staff(&business.id) {
            Ok(all) => all,
            Err(e) => return error_response(e.into()),
        },
        Err(e) => return error_response(e.into()),
    };

    let resolution = match scheduling::resolve(
        state.calendar.as_ref(),
        business.tz(),
        &pool,
        date,
        time,
        service.duration_minutes,
        req.staff_id.as_deref(),
    )
    .await
    {
        Ok(r) => r,
        Err(DomainError::CalendarUnavailable(e)) => {
            // Unknown, never "available"
            tracing::warn!("availability check degraded: {e}");
            let resp = AvailabilityResponse::negative(
                "Calendar unavailable",
                spoken::calendar_down(lang),
            );
            return (StatusCode::SERVICE_UNAVAILABLE, Json(resp)).into_response();
        }
        Err(e) => return error_response(e),
    };

    if resolution.available {
        let names: Vec<String> = resolution
            .available_staff
            .iter()
            .map(|s| s.name.clone())
            .collect();
        return Json(AvailabilityResponse {
            available: true,
            reason: None,
            actual_date: Some(actual_date),
            booking_time: Some(time.format("%H:%M").to_string()),
            service_name: Some(service.name.clone()),
            assigned_staff: resolution.assigned,
            available_staff: Some(resolution.available_staff),
            suggested_times: Vec::new(),
            disambiguation_needed: false,
            message: spoken::available(lang, &names),
        })
        .into_response();
    }

    let suggestions: Vec<String> = suggest_times(
        &resolution.busy_sets,
        business.tz(),
        date,
        window,
        service.duration_minutes,
        time,
    )
    .iter()
    .map(|t| t.format("%H:%M").to_string())
    .collect();

    let mut resp =
        AvailabilityResponse::negative("Slot taken", spoken::occupied(lang, &suggestions));
    resp.actual_date = Some(actual_date);
    resp.suggested_times = suggestions;
    Json(resp).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    pub assistant_id: String,
}

#[derive(Serialize)]
pub struct ContextResponse {
    pub business_name: String,
    pub language: Language,
    pub services: Vec<ServiceInfo>,
    pub hours: Vec<DayInfo>,
}

#[derive(Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub price_cents: i64,
    pub duration_minutes: i64,
}

#[derive(Serialize)]
pub struct DayInfo {
    pub day: &'static str,
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<String>,
}

/// Snapshot of services and hours injected into the assistant's system
/// prompt at call start
pub async fn assistant_context(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContextRequest>,
) -> Response {
    let business = match state.db.get_business_by_assistant(&req.assistant_id) {
        Ok(Some(b)) => b,
        Ok(None) => return error_response(DomainError::NotFound("Business")),
        Err(e) => return error_response(e.into()),
    };

    let services = match state.db.active_services(&business.id) {
        Ok(s) => s,
        Err(e) => return error_response(e.into()),
    };
    let schedule = match state.db.get_week_schedule(&business.id) {
        Ok(s) => s,
        Err(e) => return error_response(e.into()),
    };

    let hours = schedule
        .iter()
        .map(|(weekday, day_hours)| DayInfo {
            day: weekday_name(weekday),
            closed: day_hours.is_none(),
            open: day_hours.map(|h| h.open.format("%H:%M").to_string()),
            close: day_hours.map(|h| h.close.format("%H:%M").to_string()),
        })
        .collect();

    Json(ContextResponse {
        business_name: business.name,
        language: business.language,
        services: services
            .into_iter()
            .map(|s| ServiceInfo {
                name: s.name,
                price_cents: s.price_cents,
                duration_minutes: s.duration_minutes,
            })
            .collect(),
        hours,
    })
    .into_response()
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}
