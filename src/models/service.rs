use serde::{Deserialize, Serialize};

/// A bookable service offered by a business. `duration_minutes` is the
/// authoritative unit for computing an appointment's end time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub price_cents: i64,
    pub duration_minutes: i64,
    pub is_active: bool,
}

/// Domain synonyms folded before fuzzy matching, so "corte de pelo"
/// matches a service named "corte de cabello".
const SYNONYMS: &[(&str, &str)] = &[
    ("pelo", "cabello"),
    ("manicura", "manicure"),
    ("pedicura", "pedicure"),
];

/// Lowercase, collapse whitespace and fold domain synonyms
pub fn normalize_service_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let folded: Vec<String> = lowered
        .split_whitespace()
        .map(|word| {
            for (from, to) in SYNONYMS {
                if word == *from {
                    return (*to).to_string();
                }
            }
            word.to_string()
        })
        .collect();
    folded.join(" ")
}

/// Resolve a free-text service phrase against a business's services.
/// Case-insensitive exact match first, then a normalized substring match
/// in either direction. `None` means no booking should be created.
pub fn resolve_service<'a>(services: &'a [Service], requested: &str) -> Option<&'a Service> {
    let requested = requested.trim();
    if requested.is_empty() {
        return None;
    }

    if let Some(exact) = services
        .iter()
        .find(|s| s.name.trim().eq_ignore_ascii_case(requested))
    {
        return Some(exact);
    }

    let normalized = normalize_service_name(requested);
    if let Some(folded) = services
        .iter()
        .find(|s| normalize_service_name(&s.name) == normalized)
    {
        return Some(folded);
    }

    services.iter().find(|s| {
        let name = normalize_service_name(&s.name);
        name.contains(&normalized) || normalized.contains(&name)
    })
}

/// Infer a service from a calendar event title by substring match.
/// Used by inbound calendar reconciliation; unmatched titles are fine.
pub fn infer_service_from_title<'a>(
    services: &'a [Service],
    title: &str,
) -> Option<&'a Service> {
    let title = title.to_lowercase();
    services
        .iter()
        .find(|s| title.contains(&s.name.to_lowercase()))
}
