mod heuristic;
mod llm;

pub use heuristic::*;
pub use llm::*;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};

use crate::models::WeekSchedule;

/// Context for normalizing a human date/time phrase: "today" in the
/// business's timezone and the week schedule used to disambiguate bare
/// hour numbers.
#[derive(Debug, Clone)]
pub struct ParseContext<'a> {
    pub today: NaiveDate,
    pub schedule: &'a WeekSchedule,
}

/// A time phrase either resolves to one instant or stays ambiguous when
/// the working-hours window cannot pick between the two readings. An
/// ambiguous time requires a clarifying follow-up, never a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTime {
    Resolved(NaiveTime),
    Ambiguous {
        as_given: NaiveTime,
        shifted: NaiveTime,
    },
}

/// Normalized date/time pair. `fallback` marks the deterministic
/// next-day-noon default applied to unparseable input; those represent
/// lost intent and are logged, not celebrated.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub date: NaiveDate,
    pub time: ParsedTime,
    pub fallback: bool,
}

/// Pluggable date/time normalization capability. The LLM-backed
/// implementation degrades to the deterministic heuristics when the
/// model is unreachable, so nothing hard-depends on it.
#[async_trait]
pub trait TimeExpressionParser: Send + Sync {
    async fn normalize(
        &self,
        date_phrase: &str,
        time_phrase: &str,
        ctx: &ParseContext<'_>,
    ) -> ParseOutcome;
}
