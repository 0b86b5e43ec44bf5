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
use crate::jobs;
use crate::server::AppState;

/// Cron-triggered endpoints authenticate with a dedicated bearer secret,
/// not a tenant API key: they sweep across every business.
fn check_cron_secret(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let expected = state.cron_secret.as_deref().ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Cron secret not configured")),
        )
            .into_response()
    })?;

    let provided = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    if provided != Some(expected) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Unauthorized")),
        )
            .into_response());
    }
    Ok(())
}

/// Renew expiring calendar webhook channels (10-day lead time)
pub async fn renew_channels(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_cron_secret(&state, &headers) {
        return resp;
    }

    match jobs::renew_channels(&state.db, state.calendar.as_ref(), &state.public_url).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

/// Retry calendar sync for bookings that were persisted but never mirrored
pub async fn resync_bookings(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_cron_secret(&state, &headers) {
        return resp;
    }

    let reconciler = BookingReconciler::new(&state.db, state.calendar.as_ref());
    match reconciler.retry_unsynced().await {
        Ok(synced) => Json(json!({ "synced": synced })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}
