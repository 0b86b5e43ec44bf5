use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;

use super::{error_response, ErrorResponse};
use crate::booking::BookingReconciler;
use crate::error::DomainError;
use crate::models::CallReport;
use crate::server::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between the platform's signature timestamp and now
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Serialize)]
pub struct CallReportResponse {
    pub received: bool,
    pub call_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    pub synced: bool,
}

/// End-of-call webhook from the voice platform. Verified against the
/// shared secret when one is configured, then handed to the reconciler.
/// The raw body is taken as a string so the signature covers exactly the
/// bytes that were signed.
pub async fn call_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Some(secret) = state.voice_webhook_secret.as_deref() {
        let signature = headers
            .get("x-voice-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let timestamp = headers
            .get("x-voice-timestamp")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        match verify_signature(&body, timestamp, signature, secret) {
            Ok(true) => {}
            _ => {
                tracing::warn!("rejected call report with bad signature");
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse::new("Invalid signature")),
                )
                    .into_response();
            }
        }
    }

    let report: CallReport = match serde_json::from_str(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(DomainError::invalid("body", e.to_string()));
        }
    };

    let business = match state.db.get_business_by_assistant(&report.assistant_id) {
        Ok(Some(b)) => b,
        Ok(None) => return error_response(DomainError::NotFound("Business")),
        Err(e) => return error_response(e.into()),
    };

    let reconciler = BookingReconciler::new(&state.db, state.calendar.as_ref());
    match reconciler
        .process_call_report(&business, &report, state.parser.as_ref())
        .await
    {
        Ok(outcome) => Json(CallReportResponse {
            received: true,
            call_id: outcome.call_id,
            booking_id: outcome.booking_id,
            synced: outcome.synced,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Verify an incoming webhook signature: HMAC-SHA256 over
/// "timestamp.payload", hex-encoded, with a bounded timestamp window.
fn verify_signature(payload: &str, timestamp: &str, signature: &str, secret: &str) -> anyhow::Result<bool> {
    let ts: i64 = timestamp.parse()?;
    let now = Utc::now().timestamp();
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Ok(false);
    }

    let message = format!("{}.{}", timestamp, payload);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(message.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    Ok(signature == expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &str, timestamp: &str, secret: &str) -> String {
        let message = format!("{}.{}", timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_signature_verification() {
        let payload = r#"{"outcome":"booked"}"#;
        let timestamp = Utc::now().timestamp().to_string();
        let secret = "test_secret_123";

        let signature = sign(payload, &timestamp, secret);

        assert!(verify_signature(payload, &timestamp, &signature, secret).unwrap());
        assert!(!verify_signature(payload, &timestamp, &signature, "wrong_secret").unwrap());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = r#"{"outcome":"booked"}"#;
        let stale = (Utc::now().timestamp() - 3600).to_string();
        let secret = "test_secret_123";

        let signature = sign(payload, &stale, secret);
        assert!(!verify_signature(payload, &stale, &signature, secret).unwrap());
    }

    #[test]
    fn test_garbage_timestamp_is_an_error() {
        assert!(verify_signature("{}", "not-a-number", "sig", "secret").is_err());
    }
}
