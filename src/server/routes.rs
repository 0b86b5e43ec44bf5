use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::auth_middleware;
use super::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Voice-platform and calendar-facing routes. The call-report webhook
    // is HMAC-verified when a secret is configured; the admin routes
    // check the cron secret themselves.
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/v1/availability",
            post(handlers::availability::check_availability),
        )
        .route(
            "/v1/context",
            post(handlers::availability::assistant_context),
        )
        .route("/v1/calls/report", post(handlers::calls::call_report))
        .route("/v1/bookings/find", post(handlers::bookings::find_bookings))
        .route(
            "/v1/bookings/modify",
            post(handlers::bookings::modify_booking),
        )
        .route(
            "/v1/bookings/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route(
            "/v1/webhooks/calendar",
            post(handlers::calendar::calendar_webhook).get(handlers::calendar::verification),
        )
        .route(
            "/v1/admin/channels/renew",
            post(handlers::admin::renew_channels),
        )
        .route(
            "/v1/admin/bookings/resync",
            post(handlers::admin::resync_bookings),
        );

    // Dashboard routes (require a tenant API key)
    let protected_routes = Router::new()
        .route("/v1/bookings", get(handlers::bookings::list_bookings))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
