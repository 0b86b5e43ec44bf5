use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::json;

use super::{
    normalize_heuristic, ParseContext, ParseOutcome, ParsedTime, TimeExpressionParser,
};
use crate::EXTERNAL_CALL_TIMEOUT_SECS;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

/// LLM-backed date/time normalization. The deterministic heuristics run
/// first: a clean heuristic parse is returned as-is, an ambiguous bare
/// hour stays ambiguous (a model guess is worse than a clarifying
/// question), and only phrases the heuristics could not read are sent to
/// the model. Any model failure degrades back to the heuristic outcome.
pub struct LlmTimeParser {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl LlmTimeParser {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(EXTERNAL_CALL_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn ask_model(
        &self,
        date_phrase: &str,
        time_phrase: &str,
        today: NaiveDate,
    ) -> anyhow::Result<(NaiveDate, NaiveTime)> {
        let prompt = format!(
            r#"Parse this booking to JSON format:
- booking_date: "{date_phrase}"
- booking_time: "{time_phrase}"
- today: {today}

Examples:
Input: {{date: "mañana", time: "11 de la mañana", today: "2025-12-07"}}
Output: {{"normalized_date": "2025-12-08", "normalized_time": "11:00"}}

Input: {{date: "lunes", time: "3 de la tarde", today: "2025-12-07"}}
Output: {{"normalized_date": "2025-12-08", "normalized_time": "15:00"}}

Return only JSON with: normalized_date, normalized_time"#
        );

        let body = json!({
            "model": self.model,
            "max_tokens": 200,
            "system": "You are a JSON parser. Return ONLY valid JSON, no explanations.",
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error = resp.text().await.unwrap_or_default();
            anyhow::bail!("model request failed: {} - {}", status, error);
        }

        #[derive(Deserialize)]
        struct MessagesResponse {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(default)]
            text: String,
        }

        let response: MessagesResponse = resp.json().await?;
        let text = response
            .content
            .first()
            .map(|block| block.text.as_str())
            .unwrap_or_default();

        parse_model_payload(text).ok_or_else(|| anyhow::anyhow!("unusable model output: {text}"))
    }
}

/// Extract the normalized pair from the model's reply, tolerating
/// markdown code fences around the JSON.
fn parse_model_payload(text: &str) -> Option<(NaiveDate, NaiveTime)> {
    let cleaned = text
        .trim()
        .strip_prefix("```json")
        .or_else(|| text.trim().strip_prefix("```"))
        .unwrap_or(text.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    #[derive(Deserialize)]
    struct Normalized {
        normalized_date: String,
        normalized_time: String,
    }

    let parsed: Normalized = serde_json::from_str(cleaned).ok()?;
    let date = NaiveDate::parse_from_str(&parsed.normalized_date, "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(&parsed.normalized_time, "%H:%M").ok()?;
    Some((date, time))
}

#[async_trait]
impl TimeExpressionParser for LlmTimeParser {
    async fn normalize(
        &self,
        date_phrase: &str,
        time_phrase: &str,
        ctx: &ParseContext<'_>,
    ) -> ParseOutcome {
        let heuristic = normalize_heuristic(date_phrase, time_phrase, ctx);

        // Ambiguity is a signal for the caller, not something to paper
        // over with a model guess
        if matches!(heuristic.time, ParsedTime::Ambiguous { .. }) {
            return heuristic;
        }
        if !heuristic.fallback {
            return heuristic;
        }

        match self.ask_model(date_phrase, time_phrase, ctx.today).await {
            Ok((date, time)) => ParseOutcome {
                date,
                time: ParsedTime::Resolved(time),
                fallback: false,
            },
            Err(e) => {
                tracing::warn!("LLM parse failed, using heuristic fallback: {}", e);
                heuristic
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let (date, time) = parse_model_payload(
            r#"{"normalized_date": "2025-12-08", "normalized_time": "11:00"}"#,
        )
        .unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 12, 8).unwrap());
        assert_eq!(time, NaiveTime::from_hms_opt(11, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_fenced_json() {
        let payload = "```json\n{\"normalized_date\": \"2025-12-09\", \"normalized_time\": \"15:30\"}\n```";
        let (date, time) = parse_model_payload(payload).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 12, 9).unwrap());
        assert_eq!(time, NaiveTime::from_hms_opt(15, 30, 0).unwrap());
    }

    #[test]
    fn test_reject_malformed_payload() {
        assert!(parse_model_payload("sure! the date is tomorrow").is_none());
        assert!(parse_model_payload(r#"{"normalized_date": "soon"}"#).is_none());
        assert!(
            parse_model_payload(r#"{"normalized_date": "2025-13-40", "normalized_time": "11:00"}"#)
                .is_none()
        );
    }
}
