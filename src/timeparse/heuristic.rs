use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};

use super::{ParseContext, ParseOutcome, ParsedTime, TimeExpressionParser};
use crate::models::DayHours;

/// Deterministic date/time heuristics for Spanish and English phrases.
/// This is the degraded-mode path the system falls back to when the LLM
/// parser is unavailable, and the primary authority for bare-hour
/// disambiguation.
pub struct HeuristicParser;

#[async_trait]
impl TimeExpressionParser for HeuristicParser {
    async fn normalize(
        &self,
        date_phrase: &str,
        time_phrase: &str,
        ctx: &ParseContext<'_>,
    ) -> ParseOutcome {
        normalize_heuristic(date_phrase, time_phrase, ctx)
    }
}

pub fn normalize_heuristic(
    date_phrase: &str,
    time_phrase: &str,
    ctx: &ParseContext<'_>,
) -> ParseOutcome {
    let (date, date_fallback) = match parse_date_phrase(date_phrase, ctx.today) {
        Some(d) => (d, false),
        None => {
            tracing::warn!(phrase = date_phrase, "unparseable date phrase, defaulting to next day");
            (ctx.today + Duration::days(1), true)
        }
    };

    let window = ctx.schedule.for_date(date);
    let (time, time_fallback) = match parse_time_phrase(time_phrase, window) {
        Some(t) => (t, false),
        None => {
            tracing::warn!(phrase = time_phrase, "unparseable time phrase, defaulting to noon");
            (
                ParsedTime::Resolved(NaiveTime::from_hms_opt(12, 0, 0).unwrap()),
                true,
            )
        }
    };

    ParseOutcome {
        date,
        time,
        fallback: date_fallback || time_fallback,
    }
}

/// Resolve a date phrase: ISO dates pass through, relative terms resolve
/// against `today` (in the business timezone), weekday names map to the
/// next future occurrence.
pub fn parse_date_phrase(phrase: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lowered = phrase.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(&lowered, "%Y-%m-%d") {
        return Some(date);
    }

    // Strip leading articles/qualifiers: "el lunes", "next monday"
    let stripped = ["el ", "la ", "next ", "este ", "próximo ", "proximo "]
        .iter()
        .find_map(|p| lowered.strip_prefix(p))
        .unwrap_or(&lowered);

    match stripped {
        "hoy" | "today" => return Some(today),
        "mañana" | "manana" | "tomorrow" => return Some(today + Duration::days(1)),
        "pasado mañana" | "pasado manana" => return Some(today + Duration::days(2)),
        _ => {}
    }

    let weekday = parse_weekday(stripped)?;
    Some(next_occurrence(today, weekday))
}

/// Next future occurrence of a weekday. When today already is that
/// weekday the result rolls forward a full week; a named weekday never
/// means "right now".
pub fn next_occurrence(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let today_idx = today.weekday().num_days_from_monday();
    let target_idx = weekday.num_days_from_monday();
    let mut days_ahead = (target_idx + 7 - today_idx) % 7;
    if days_ahead == 0 {
        days_ahead = 7;
    }
    today + Duration::days(days_ahead as i64)
}

pub fn parse_weekday(value: &str) -> Option<Weekday> {
    match value.trim() {
        "lunes" | "mon" | "monday" => Some(Weekday::Mon),
        "martes" | "tue" | "tues" | "tuesday" => Some(Weekday::Tue),
        "miércoles" | "miercoles" | "wed" | "wednesday" => Some(Weekday::Wed),
        "jueves" | "thu" | "thur" | "thurs" | "thursday" => Some(Weekday::Thu),
        "viernes" | "fri" | "friday" => Some(Weekday::Fri),
        "sábado" | "sabado" | "sat" | "saturday" => Some(Weekday::Sat),
        "domingo" | "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Resolve a time phrase. Explicit meridiem phrases ("de la tarde",
/// "pm") resolve directly; bare hours are disambiguated against the
/// day's working window, and stay ambiguous when the window cannot
/// decide.
pub fn parse_time_phrase(phrase: &str, window: Option<DayHours>) -> Option<ParsedTime> {
    let lowered = phrase.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    let (hour, minute, explicit_minutes) = extract_hour_minute(&lowered)?;
    if hour > 23 || minute > 59 {
        return None;
    }

    let is_pm = ["tarde", "noche", "pm", "p.m."]
        .iter()
        .any(|marker| lowered.contains(marker));
    let is_am = ["mañana", "manana", "madrugada", "am", "a.m."]
        .iter()
        .any(|marker| lowered.contains(marker));

    if is_pm {
        let h = if hour < 12 { hour + 12 } else { hour };
        return NaiveTime::from_hms_opt(h, minute, 0).map(ParsedTime::Resolved);
    }
    if is_am {
        let h = if hour == 12 { 0 } else { hour };
        return NaiveTime::from_hms_opt(h, minute, 0).map(ParsedTime::Resolved);
    }

    // Canonical "HH:MM" passes through; only bare hour numbers are
    // ambiguous enough to need the working-hours window
    if explicit_minutes || hour == 0 || hour > 12 {
        return NaiveTime::from_hms_opt(hour, minute, 0).map(ParsedTime::Resolved);
    }

    // Bare 1..=12: two plausible readings, as given and +12h
    let as_given = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let shifted = NaiveTime::from_hms_opt((hour + 12) % 24, minute, 0)?;

    let Some(window) = window else {
        return Some(ParsedTime::Ambiguous { as_given, shifted });
    };

    match (window.contains(as_given), window.contains(shifted)) {
        (true, false) => Some(ParsedTime::Resolved(as_given)),
        (false, true) => Some(ParsedTime::Resolved(shifted)),
        // Both or neither fit: flag instead of guessing
        _ => Some(ParsedTime::Ambiguous { as_given, shifted }),
    }
}

/// First "H" or "H:MM" group in the phrase; the bool marks explicit minutes
fn extract_hour_minute(s: &str) -> Option<(u32, u32, bool)> {
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() && !chars[i].is_ascii_digit() {
        i += 1;
    }
    if i == chars.len() {
        return None;
    }

    let mut hour = 0u32;
    while i < chars.len() && chars[i].is_ascii_digit() {
        hour = hour * 10 + chars[i].to_digit(10)?;
        if hour > 99 {
            return None;
        }
        i += 1;
    }

    let mut minute = 0u32;
    let mut explicit_minutes = false;
    if i < chars.len() && chars[i] == ':' {
        i += 1;
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            minute = minute * 10 + chars[i].to_digit(10)?;
            if minute > 99 {
                return None;
            }
            i += 1;
        }
        if i == start {
            return None;
        }
        explicit_minutes = true;
    }

    Some((hour, minute, explicit_minutes))
}
