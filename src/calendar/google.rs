use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ChannelInfo, EventDraft, EventPatch, RemoteEvent};
use crate::models::BusyInterval;
use crate::EXTERNAL_CALL_TIMEOUT_SECS;

const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

/// Google Calendar implementation using direct API calls
pub struct GoogleCalendar {
    client: reqwest::Client,
    token_manager: Arc<RwLock<TokenManager>>,
}

struct TokenManager {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    access_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenManager {
    fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self {
            client_id,
            client_secret,
            refresh_token,
            access_token: None,
            expires_at: None,
        }
    }

    async fn get_access_token(&mut self, client: &reqwest::Client) -> Result<String> {
        // Reuse a token with at least 5 minutes of life left
        if let (Some(token), Some(expires)) = (&self.access_token, self.expires_at) {
            if Utc::now() < expires - chrono::Duration::minutes(5) {
                return Ok(token.clone());
            }
        }

        let resp = client
            .post("https://oauth2.googleapis.com/token")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("Failed to refresh token")?;

        if !resp.status().is_success() {
            let error = resp.text().await.unwrap_or_default();
            anyhow::bail!("Token refresh failed: {}", error);
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let tokens: TokenResponse = resp
            .json()
            .await
            .context("Failed to parse token response")?;

        self.access_token = Some(tokens.access_token.clone());
        self.expires_at = Some(Utc::now() + chrono::Duration::seconds(tokens.expires_in));

        Ok(tokens.access_token)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    date_time: String,
    time_zone: String,
}

impl EventDateTime {
    fn new(local: chrono::NaiveDateTime, timezone: &str) -> Self {
        Self {
            date_time: local.format("%Y-%m-%dT%H:%M:%S").to_string(),
            time_zone: timezone.to_string(),
        }
    }
}

impl GoogleCalendar {
    /// Create a new Google Calendar client with the given refresh token
    pub fn new(client_id: &str, client_secret: &str, refresh_token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(EXTERNAL_CALL_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        let token_manager = Arc::new(RwLock::new(TokenManager::new(
            client_id.to_string(),
            client_secret.to_string(),
            refresh_token.to_string(),
        )));

        Ok(Self {
            client,
            token_manager,
        })
    }

    async fn get_token(&self) -> Result<String> {
        let mut manager = self.token_manager.write().await;
        manager.get_access_token(&self.client).await
    }

    fn events_url(calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            CALENDAR_API,
            urlencoding::encode(calendar_id)
        )
    }
}

#[async_trait::async_trait]
impl super::CalendarProvider for GoogleCalendar {
    async fn busy_intervals(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>> {
        let token = self.get_token().await?;

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct FreeBusyRequest {
            time_min: DateTime<Utc>,
            time_max: DateTime<Utc>,
            items: Vec<FreeBusyItem>,
        }

        #[derive(Serialize)]
        struct FreeBusyItem {
            id: String,
        }

        let request = FreeBusyRequest {
            time_min: start,
            time_max: end,
            items: vec![FreeBusyItem {
                id: calendar_id.to_string(),
            }],
        };

        let resp = self
            .client
            .post(format!("{}/freeBusy", CALENDAR_API))
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .context("Failed to query free/busy")?;

        if !resp.status().is_success() {
            let error = resp.text().await.unwrap_or_default();
            anyhow::bail!("Free/busy query failed: {}", error);
        }

        #[derive(Deserialize)]
        struct FreeBusyResponse {
            calendars: Option<std::collections::HashMap<String, CalendarBusy>>,
        }

        #[derive(Deserialize)]
        struct CalendarBusy {
            busy: Option<Vec<BusySlot>>,
        }

        #[derive(Deserialize)]
        struct BusySlot {
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        }

        let response: FreeBusyResponse = resp
            .json()
            .await
            .context("Failed to parse free/busy response")?;

        let mut intervals = Vec::new();
        if let Some(calendars) = response.calendars {
            for (_cal_id, cal_data) in calendars {
                if let Some(busy_list) = cal_data.busy {
                    for busy in busy_list {
                        intervals.push(BusyInterval::new(busy.start, busy.end));
                    }
                }
            }
        }

        Ok(intervals)
    }

    async fn create_event(&self, calendar_id: &str, draft: &EventDraft) -> Option<String> {
        let token = match self.get_token().await {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("Calendar sync failed: could not get token: {}", e);
                return None;
            }
        };

        #[derive(Serialize)]
        struct EventRequest<'a> {
            summary: &'a str,
            description: &'a str,
            start: EventDateTime,
            end: EventDateTime,
            reminders: Reminders,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Reminders {
            use_default: bool,
            overrides: Vec<ReminderOverride>,
        }

        #[derive(Serialize)]
        struct ReminderOverride {
            method: &'static str,
            minutes: u32,
        }

        let event = EventRequest {
            summary: &draft.summary,
            description: &draft.description,
            start: EventDateTime::new(draft.start_local, &draft.timezone),
            end: EventDateTime::new(draft.end_local, &draft.timezone),
            reminders: Reminders {
                use_default: false,
                overrides: vec![
                    ReminderOverride {
                        method: "popup",
                        minutes: 30,
                    },
                    ReminderOverride {
                        method: "popup",
                        minutes: 10,
                    },
                ],
            },
        };

        let resp = self
            .client
            .post(Self::events_url(calendar_id))
            .bearer_auth(&token)
            .json(&event)
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("Calendar sync failed: {}", e);
                return None;
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let error = resp.text().await.unwrap_or_default();
            tracing::error!("Event creation failed: {} - {}", status, error);
            return None;
        }

        #[derive(Deserialize)]
        struct EventResponse {
            id: Option<String>,
        }

        match resp.json::<EventResponse>().await {
            Ok(created) => {
                if let Some(ref id) = created.id {
                    tracing::info!("Calendar event created: {}", id);
                }
                created.id
            }
            Err(e) => {
                tracing::error!("Failed to parse event response: {}", e);
                None
            }
        }
    }

    async fn update_event(&self, calendar_id: &str, event_id: &str, patch: &EventPatch) -> bool {
        let token = match self.get_token().await {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("Calendar update failed: could not get token: {}", e);
                return false;
            }
        };

        #[derive(Serialize)]
        struct EventUpdate<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            summary: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            description: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            start: Option<EventDateTime>,
            #[serde(skip_serializing_if = "Option::is_none")]
            end: Option<EventDateTime>,
        }

        let update = EventUpdate {
            summary: patch.summary.as_deref(),
            description: patch.description.as_deref(),
            start: patch
                .start_local
                .map(|t| EventDateTime::new(t, &patch.timezone)),
            end: patch
                .end_local
                .map(|t| EventDateTime::new(t, &patch.timezone)),
        };

        let resp = self
            .client
            .patch(format!("{}/{}", Self::events_url(calendar_id), event_id))
            .bearer_auth(&token)
            .json(&update)
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                tracing::info!("Calendar event updated: {}", event_id);
                true
            }
            Ok(r) => {
                tracing::error!("Calendar update failed: {}", r.status());
                false
            }
            Err(e) => {
                tracing::error!("Calendar update failed: {}", e);
                false
            }
        }
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> bool {
        let token = match self.get_token().await {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("Calendar delete failed: could not get token: {}", e);
                return false;
            }
        };

        let resp = self
            .client
            .delete(format!("{}/{}", Self::events_url(calendar_id), event_id))
            .bearer_auth(&token)
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                tracing::info!("Calendar event deleted: {}", event_id);
                true
            }
            // Already gone counts as deleted
            Ok(r) if r.status() == reqwest::StatusCode::NOT_FOUND
                || r.status() == reqwest::StatusCode::GONE =>
            {
                tracing::info!("Calendar event already gone: {}", event_id);
                true
            }
            Ok(r) => {
                tracing::error!("Calendar delete failed: {}", r.status());
                false
            }
            Err(e) => {
                tracing::error!("Calendar delete failed: {}", e);
                false
            }
        }
    }

    async fn list_upcoming(
        &self,
        calendar_id: &str,
        max_results: u32,
    ) -> Result<Vec<RemoteEvent>> {
        let token = self.get_token().await?;
        let time_min = Utc::now().to_rfc3339();
        let max_results = max_results.to_string();

        let resp = self
            .client
            .get(Self::events_url(calendar_id))
            .bearer_auth(&token)
            .query(&[
                ("timeMin", time_min.as_str()),
                ("maxResults", max_results.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await
            .context("Failed to list events")?;

        if !resp.status().is_success() {
            let error = resp.text().await.unwrap_or_default();
            anyhow::bail!("Event listing failed: {}", error);
        }

        #[derive(Deserialize)]
        struct EventsResponse {
            items: Option<Vec<EventItem>>,
        }

        #[derive(Deserialize)]
        struct EventItem {
            id: Option<String>,
            summary: Option<String>,
            start: Option<EventInstant>,
            end: Option<EventInstant>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct EventInstant {
            // Absent for all-day events, which carry only a date
            date_time: Option<DateTime<Utc>>,
        }

        let response: EventsResponse = resp
            .json()
            .await
            .context("Failed to parse events response")?;

        let events = response
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| {
                let id = item.id?;
                Some(RemoteEvent {
                    id,
                    summary: item.summary,
                    start: item.start.and_then(|s| s.date_time),
                    end: item.end.and_then(|e| e.date_time),
                })
            })
            .collect();

        Ok(events)
    }

    async fn watch(
        &self,
        calendar_id: &str,
        channel_id: &str,
        address: &str,
        expiration: DateTime<Utc>,
    ) -> Result<ChannelInfo> {
        let token = self.get_token().await?;

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct WatchRequest<'a> {
            id: &'a str,
            #[serde(rename = "type")]
            channel_type: &'static str,
            address: &'a str,
            expiration: String,
        }

        let request = WatchRequest {
            id: channel_id,
            channel_type: "web_hook",
            address,
            expiration: expiration.timestamp_millis().to_string(),
        };

        let resp = self
            .client
            .post(format!("{}/watch", Self::events_url(calendar_id)))
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .context("Failed to register watch channel")?;

        if !resp.status().is_success() {
            let error = resp.text().await.unwrap_or_default();
            anyhow::bail!("Watch registration failed: {}", error);
        }

        #[derive(Deserialize)]
        struct WatchResponse {
            id: String,
            expiration: Option<String>,
        }

        let watch: WatchResponse = resp
            .json()
            .await
            .context("Failed to parse watch response")?;

        let expires_at = watch
            .expiration
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| DateTime::from_timestamp_millis(ms))
            .unwrap_or(expiration);

        Ok(ChannelInfo {
            id: watch.id,
            expires_at,
        })
    }
}
