use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::ErrorResponse;
use crate::booking::BookingReconciler;
use crate::server::AppState;

/// How many upcoming events to re-list per push notification
const RELIST_WINDOW: u32 = 10;

/// Inbound push notification from the external calendar. A `sync`
/// resource state is the subscription heartbeat and is acknowledged
/// without work; anything else re-lists the owning staff member's
/// upcoming events and reconciles them into bookings.
pub async fn calendar_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let channel_id = headers
        .get("x-goog-channel-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let resource_state = headers
        .get("x-goog-resource-state")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    tracing::info!(channel_id, resource_state, "calendar webhook received");

    if resource_state == "sync" {
        return Json(json!({ "received": true })).into_response();
    }

    let staff = match state.db.get_staff_by_channel(channel_id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            tracing::warn!(channel_id, "no staff registered for channel");
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Staff not found")),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response();
        }
    };

    let business = match state.db.get_business(&staff.business_id) {
        Ok(Some(b)) => b,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Business not found")),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response();
        }
    };

    let Some(calendar_id) = staff.calendar_id.as_deref() else {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("Staff has no calendar configured")),
        )
            .into_response();
    };

    let events = match state.calendar.list_upcoming(calendar_id, RELIST_WINDOW).await {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!("event re-list failed: {e}");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new("Calendar unavailable")),
            )
                .into_response();
        }
    };

    let reconciler = BookingReconciler::new(&state.db, state.calendar.as_ref());
    match reconciler
        .reconcile_remote_events(&business, &staff, &events)
        .await
    {
        Ok(created) => Json(json!({ "success": true, "created": created })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

/// Verification probe sent when the channel is registered
pub async fn verification() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}
