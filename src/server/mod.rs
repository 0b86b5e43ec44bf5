mod handlers;
mod middleware;
mod routes;

pub use routes::create_router;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::calendar::{CalendarProvider, GoogleCalendar};
use crate::db::Database;
use crate::timeparse::{HeuristicParser, LlmTimeParser, TimeExpressionParser};

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub calendar: Arc<dyn CalendarProvider>,
    pub parser: Arc<dyn TimeExpressionParser>,
    pub public_url: String,
    /// Shared secret for verifying signed end-of-call webhooks
    pub voice_webhook_secret: Option<String>,
    /// Bearer token expected by the cron-triggered admin endpoints
    pub cron_secret: Option<String>,
}

impl AppState {
    pub fn new(
        db: Database,
        calendar: Arc<dyn CalendarProvider>,
        parser: Arc<dyn TimeExpressionParser>,
        public_url: String,
        voice_webhook_secret: Option<String>,
        cron_secret: Option<String>,
    ) -> Self {
        Self {
            db,
            calendar,
            parser,
            public_url,
            voice_webhook_secret,
            cron_secret,
        }
    }
}

/// Build the calendar adapter from environment credentials
pub fn calendar_from_env() -> Result<GoogleCalendar> {
    let client_id = std::env::var("GOOGLE_CLIENT_ID").unwrap_or_default();
    let client_secret = std::env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default();
    let refresh_token = std::env::var("GOOGLE_REFRESH_TOKEN").unwrap_or_default();
    if client_id.is_empty() || refresh_token.is_empty() {
        tracing::warn!("Google credentials missing; calendar calls will fail until configured");
    }
    GoogleCalendar::new(&client_id, &client_secret, &refresh_token)
}

/// Pick the time parser: LLM-backed when a key is configured, plain
/// heuristics otherwise
pub fn parser_from_env() -> Result<Arc<dyn TimeExpressionParser>> {
    match std::env::var("ANTHROPIC_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(Arc::new(LlmTimeParser::new(key)?)),
        _ => {
            tracing::info!("ANTHROPIC_API_KEY not set, using heuristic time parser only");
            Ok(Arc::new(HeuristicParser))
        }
    }
}

/// Run the API server
pub async fn run_server(addr: SocketAddr, db_path: &str, public_url: &str) -> Result<()> {
    let db = Database::open(db_path)?;
    let calendar: Arc<dyn CalendarProvider> = Arc::new(calendar_from_env()?);
    let parser = parser_from_env()?;

    let voice_webhook_secret = std::env::var("VOICE_WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());
    let cron_secret = std::env::var("CRON_SECRET").ok().filter(|s| !s.is_empty());

    let state = Arc::new(AppState::new(
        db,
        calendar,
        parser,
        public_url.to_string(),
        voice_webhook_secret,
        cron_secret,
    ));

    let app = create_router(state);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
