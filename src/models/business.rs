use chrono::{Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Fallback timezone when a business row carries an unparseable IANA name
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Madrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusinessStatus {
    #[default]
    Active,
    Inactive,
}

impl BusinessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessStatus::Active => "active",
            BusinessStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BusinessStatus::Active),
            "inactive" => Some(BusinessStatus::Inactive),
            _ => None,
        }
    }
}

/// Language the receptionist speaks for this tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    Es,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Es => "es",
            Language::En => "en",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "es" => Some(Language::Es),
            "en" => Some(Language::En),
            _ => None,
        }
    }
}

/// Tenant root. Fetched once per request as an immutable value object;
/// never cached process-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Voice-platform assistant identifier, unique per business
    pub assistant_id: String,
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    /// IANA timezone name, e.g. "Europe/Madrid"
    pub timezone: String,
    pub language: Language,
    pub status: BusinessStatus,
    pub created_at: i64,
}

impl Business {
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(DEFAULT_TIMEZONE)
    }

    /// Current date in the business's local timezone, not the server's
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz()).date_naive()
    }
}

/// Open/close window for one weekday
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl DayHours {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Result<Self, DomainError> {
        if open >= close {
            return Err(DomainError::invalid(
                "working_hours",
                format!("open_time {} must be before close_time {}", open, close),
            ));
        }
        Ok(Self { open, close })
    }

    /// Half-open containment: the close time itself is not bookable
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.open <= time && time < self.close
    }
}

/// Weekday -> hours map for one business. Index 0 = Monday. A `None`
/// entry means the business is closed that day for every staff member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekSchedule {
    days: [Option<DayHours>; 7],
}

impl WeekSchedule {
    pub fn set(&mut self, weekday: Weekday, hours: Option<DayHours>) {
        self.days[weekday.num_days_from_monday() as usize] = hours;
    }

    pub fn for_weekday(&self, weekday: Weekday) -> Option<DayHours> {
        self.days[weekday.num_days_from_monday() as usize]
    }

    pub fn for_date(&self, date: NaiveDate) -> Option<DayHours> {
        self.for_weekday(date.weekday())
    }

    /// True iff the business is open at `time` on `date`
    pub fn is_open(&self, date: NaiveDate, time: NaiveTime) -> bool {
        self.for_date(date).is_some_and(|h| h.contains(time))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Weekday, Option<DayHours>)> + '_ {
        const WEEKDAYS: [Weekday; 7] = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        WEEKDAYS.iter().map(|&w| (w, self.for_weekday(w)))
    }
}
