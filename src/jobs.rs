use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::calendar::CalendarProvider;
use crate::db::Database;
use crate::error::DomainError;
use crate::{CHANNEL_LIFETIME_DAYS, CHANNEL_RENEWAL_LEAD_DAYS};

/// Outcome of one renewal sweep
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RenewalReport {
    pub renewed: usize,
    pub total: usize,
}

/// Re-subscribe calendar webhook channels for every active staff member
/// whose channel is missing or expires within the lead window. Invoked
/// by an external cron trigger; per-staff failures are logged and do not
/// stop the sweep.
pub async fn renew_channels(
    db: &Database,
    calendar: &dyn CalendarProvider,
    public_url: &str,
) -> Result<RenewalReport, DomainError> {
    let cutoff = Utc::now() + Duration::days(CHANNEL_RENEWAL_LEAD_DAYS);
    let staff = db.staff_needing_channel_renewal(cutoff)?;

    if staff.is_empty() {
        tracing::info!("no webhook channels need renewal");
        return Ok(RenewalReport {
            renewed: 0,
            total: 0,
        });
    }

    tracing::info!("renewing {} webhook channels", staff.len());
    let address = format!(
        "{}/v1/webhooks/calendar",
        public_url.trim_end_matches('/')
    );

    let mut renewed = 0;
    for member in &staff {
        let Some(calendar_id) = member.calendar_id.as_deref() else {
            continue;
        };
        let channel_id = format!("staff-{}-{}", member.id, Uuid::new_v4().simple());
        let expiration = Utc::now() + Duration::days(CHANNEL_LIFETIME_DAYS);

        match calendar
            .watch(calendar_id, &channel_id, &address, expiration)
            .await
        {
            Ok(info) => {
                db.update_staff_channel(&member.id, &info.id, info.expires_at)?;
                tracing::info!(staff = %member.name, "renewed webhook channel");
                renewed += 1;
            }
            Err(e) => {
                tracing::warn!(staff = %member.name, "failed to renew webhook channel: {e}");
            }
        }
    }

    Ok(RenewalReport {
        renewed,
        total: staff.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::Mutex;

    use crate::calendar::{ChannelInfo, EventDraft, EventPatch, RemoteEvent};
    use crate::models::{Business, BusinessStatus, BusyInterval, Language, Staff};

    struct FakeCalendar {
        watched: Mutex<Vec<(String, String, String)>>,
    }

    impl FakeCalendar {
        fn new() -> Self {
            Self {
                watched: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl CalendarProvider for FakeCalendar {
        async fn busy_intervals(
            &self,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<Vec<BusyInterval>> {
            Ok(vec![])
        }

        async fn create_event(&self, _: &str, _: &EventDraft) -> Option<String> {
            None
        }

        async fn update_event(&self, _: &str, _: &str, _: &EventPatch) -> bool {
            false
        }

        async fn delete_event(&self, _: &str, _: &str) -> bool {
            false
        }

        async fn list_upcoming(&self, _: &str, _: u32) -> Result<Vec<RemoteEvent>> {
            Ok(vec![])
        }

        async fn watch(
            &self,
            calendar_id: &str,
            channel_id: &str,
            address: &str,
            expiration: DateTime<Utc>,
        ) -> Result<ChannelInfo> {
            self.watched.lock().unwrap().push((
                calendar_id.to_string(),
                channel_id.to_string(),
                address.to_string(),
            ));
            Ok(ChannelInfo {
                id: channel_id.to_string(),
                expires_at: expiration,
            })
        }
    }

    fn seed(db: &Database) -> Staff {
        let business = Business {
            id: "biz_1".to_string(),
            name: "Bella Vista".to_string(),
            phone: None,
            email: None,
            assistant_id: "asst_1".to_string(),
            api_key_hash: bcrypt::hash("key", 4).unwrap(),
            timezone: "Europe/Madrid".to_string(),
            language: Language::Es,
            status: BusinessStatus::Active,
            created_at: Utc::now().timestamp(),
        };
        db.create_business(&business).unwrap();

        let staff = Staff {
            id: "stf_ana".to_string(),
            business_id: business.id,
            name: "Ana".to_string(),
            email: None,
            calendar_id: Some("cal_ana".to_string()),
            is_active: true,
            channel_id: None,
            channel_expires_at: None,
        };
        db.create_staff(&staff).unwrap();
        staff
    }

    #[tokio::test]
    async fn test_renews_missing_channel_and_persists_expiry() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let cal = FakeCalendar::new();

        let report = renew_channels(&db, &cal, "https://salond.example.com/")
            .await
            .unwrap();
        assert_eq!(report.renewed, 1);
        assert_eq!(report.total, 1);

        let watched = cal.watched.lock().unwrap();
        assert_eq!(watched[0].0, "cal_ana");
        assert_eq!(watched[0].2, "https://salond.example.com/v1/webhooks/calendar");

        let staff = db.get_staff("stf_ana").unwrap().unwrap();
        assert!(staff.channel_id.is_some());
        let expires = staff.channel_expires_at.unwrap();
        assert!(expires > Utc::now() + Duration::days(CHANNEL_LIFETIME_DAYS - 1));
    }

    #[tokio::test]
    async fn test_fresh_channels_left_alone() {
        let db = Database::open_in_memory().unwrap();
        let staff = seed(&db);
        db.update_staff_channel(&staff.id, "chan_live", Utc::now() + Duration::days(25))
            .unwrap();

        let cal = FakeCalendar::new();
        let report = renew_channels(&db, &cal, "https://salond.example.com")
            .await
            .unwrap();
        assert_eq!(report.renewed, 0);
        assert_eq!(report.total, 0);
        assert!(cal.watched.lock().unwrap().is_empty());
    }
}
