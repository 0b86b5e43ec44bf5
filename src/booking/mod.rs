use chrono::{Duration, NaiveDate, NaiveTime, Utc};

use crate::calendar::{CalendarProvider, EventDraft, EventPatch, RemoteEvent};
use crate::db::Database;
use crate::error::DomainError;
use crate::models::{
    infer_service_from_title, new_booking_id, resolve_service, Booking, BookingSource,
    BookingStatus, Business, CallOutcome, CallRecord, CallReport, Service, Staff,
};
use crate::scheduling;
use crate::timeparse::{ParseContext, ParsedTime, TimeExpressionParser};

/// Result of processing one end-of-call report
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub call_id: String,
    pub booking_id: Option<String>,
    pub synced: bool,
}

/// What changed in a modify operation, for the spoken confirmation
#[derive(Debug, Clone)]
pub struct ModifySummary {
    pub booking: Booking,
    pub changes: Vec<String>,
}

/// Details of a cancelled booking, for the spoken confirmation
#[derive(Debug, Clone)]
pub struct CancelSummary {
    pub service_name: String,
    pub booking_date: String,
    pub booking_time: String,
}

/// Orchestrator invoked at call-completion time and by the inbound
/// calendar webhook. The booking row is the primary write: it is
/// persisted before any calendar call, and a failed sync leaves the row
/// unsynced rather than rolling it back - a missed appointment costs the
/// salon more than a calendar gap the resync pass can close later.
pub struct BookingReconciler<'a> {
    db: &'a Database,
    calendar: &'a dyn CalendarProvider,
}

impl<'a> BookingReconciler<'a> {
    pub fn new(db: &'a Database, calendar: &'a dyn CalendarProvider) -> Self {
        Self { db, calendar }
    }

    /// received -> service_resolved -> booking_persisted ->
    /// calendar_synced (optional) -> done. The call record is archived
    /// unconditionally, whatever happens later.
    pub async fn process_call_report(
        &self,
        business: &Business,
        report: &CallReport,
        parser: &dyn TimeExpressionParser,
    ) -> Result<ReconcileOutcome, DomainError> {
        let call = CallRecord {
            id: uuid::Uuid::new_v4().to_string(),
            business_id: business.id.clone(),
            platform_call_id: report.platform_call_id.clone(),
            customer_name: report
                .customer_name
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            phone: report.customer_phone.clone(),
            duration_seconds: report.call_duration_seconds(),
            outcome: report.outcome,
            transcript: report.transcript.clone().unwrap_or_default(),
            recording_url: report.recording_url.clone(),
            started_at: report.started_at,
            ended_at: report.ended_at,
            summary: None,
            created_at: Utc::now().timestamp(),
        };
        self.db.create_call(&call)?;
        tracing::info!(call_id = %call.id, outcome = call.outcome.as_str(), "call archived");

        if report.outcome != CallOutcome::Booked {
            return Ok(ReconcileOutcome {
                call_id: call.id,
                booking_id: None,
                synced: false,
            });
        }

        let services = self.db.active_services(&business.id)?;

        // Structured extraction is primary; scanning the transcript for a
        // service name is the degraded path for reports missing it
        let service = report
            .service_requested
            .as_deref()
            .and_then(|requested| resolve_service(&services, requested))
            .or_else(|| {
                report
                    .transcript
                    .as_deref()
                    .and_then(|t| infer_service_from_title(&services, t))
            })
            .cloned();

        let Some(service) = service else {
            tracing::warn!(
                call_id = %call.id,
                requested = report.service_requested.as_deref().unwrap_or(""),
                "no matching service, call kept as inquiry"
            );
            self.db
                .update_call_outcome(&call.id, CallOutcome::InquiryOnly)?;
            return Ok(ReconcileOutcome {
                call_id: call.id,
                booking_id: None,
                synced: false,
            });
        };

        let (Some(date_phrase), Some(time_phrase)) =
            (report.booking_date.as_deref(), report.booking_time.as_deref())
        else {
            tracing::warn!(call_id = %call.id, "booked outcome without date/time, call kept as inquiry");
            self.db
                .update_call_outcome(&call.id, CallOutcome::InquiryOnly)?;
            return Ok(ReconcileOutcome {
                call_id: call.id,
                booking_id: None,
                synced: false,
            });
        };

        let schedule = self.db.get_week_schedule(&business.id)?;
        let today = business.today();
        let ctx = ParseContext {
            today,
            schedule: &schedule,
        };
        let parsed = parser.normalize(date_phrase, time_phrase, &ctx).await;

        let time = match parsed.time {
            ParsedTime::Resolved(t) => t,
            // Nobody is left on the line to clarify; take the literal
            // reading and flag it
            ParsedTime::Ambiguous { as_given, .. } => {
                tracing::warn!(
                    call_id = %call.id,
                    phrase = time_phrase,
                    "ambiguous time at reconcile, taking literal reading"
                );
                as_given
            }
        };

        // A resolved date in the past means the speaker meant the next
        // occurrence: advance the resolved date by a week
        let mut date = parsed.date;
        if date < today {
            date += Duration::days(7);
            tracing::info!(call_id = %call.id, "past booking date repaired to {}", date);
        }

        let staff = match self.pick_staff(business, &service, date, time).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(call_id = %call.id, "staff assignment skipped: {e}");
                None
            }
        };

        let booking = Booking {
            id: new_booking_id(),
            business_id: business.id.clone(),
            service_id: Some(service.id.clone()),
            staff_id: staff.as_ref().map(|s| s.id.clone()),
            customer_name: call.customer_name.clone(),
            customer_phone: report.customer_phone.clone(),
            booking_phone: report
                .booking_phone
                .clone()
                .unwrap_or_else(|| report.customer_phone.clone()),
            booking_date: date.format("%Y-%m-%d").to_string(),
            booking_time: time.format("%H:%M").to_string(),
            duration_minutes: service.duration_minutes,
            status: BookingStatus::Booked,
            booking_source: BookingSource::Phone,
            call_id: Some(call.id.clone()),
            calendar_event_id: None,
            synced_at: None,
            created_at: Utc::now().timestamp(),
        };
        self.db.create_booking(&booking)?;
        tracing::info!(booking_id = %booking.id, "booking persisted");

        let synced = self
            .sync_booking(business, &booking, &service.name, staff.as_ref())
            .await;

        Ok(ReconcileOutcome {
            call_id: call.id,
            booking_id: Some(booking.id),
            synced,
        })
    }

    /// Best-effort staff assignment for a fresh booking: first
    /// conflict-free qualified staff member, or nobody
    async fn pick_staff(
        &self,
        business: &Business,
        service: &Service,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<Staff>, DomainError> {
        let mut pool = self.db.staff_for_service(&service.id)?;
        if pool.is_empty() {
            pool = self.db.active_staff(&business.id)?;
        }
        if pool.is_empty() {
            return Ok(None);
        }

        let resolution = scheduling::resolve(
            self.calendar,
            business.tz(),
            &pool,
            date,
            time,
            service.duration_minutes,
            None,
        )
        .await?;

        let Some(assigned) = resolution.assigned else {
            tracing::warn!("no conflict-free staff at reconcile time, booking left unassigned");
            return Ok(None);
        };
        Ok(pool.into_iter().find(|s| s.id == assigned.id))
    }

    /// Mirror a booking into the assigned staff member's calendar. The
    /// event summary carries the service's canonical name so
    /// transcription typos never leak into calendar entries. Returns
    /// false (and leaves the booking unsynced) on any failure.
    async fn sync_booking(
        &self,
        business: &Business,
        booking: &Booking,
        service_name: &str,
        staff: Option<&Staff>,
    ) -> bool {
        let Some(staff) = staff else {
            tracing::warn!(booking_id = %booking.id, "no staff assigned, booking left unsynced");
            return false;
        };
        let Some(calendar_id) = staff.calendar_id.as_deref() else {
            tracing::warn!(booking_id = %booking.id, "staff has no calendar, booking left unsynced");
            return false;
        };
        let Some(draft) = event_draft_for(business, booking, service_name) else {
            tracing::warn!(booking_id = %booking.id, "malformed booking date/time, left unsynced");
            return false;
        };

        match self.calendar.create_event(calendar_id, &draft).await {
            Some(event_id) => match self.db.mark_booking_synced(&booking.id, &event_id) {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(booking_id = %booking.id, "failed to record sync: {e}");
                    false
                }
            },
            None => {
                tracing::warn!(booking_id = %booking.id, "calendar sync failed, booking remains unsynced");
                false
            }
        }
    }

    /// Apply date/time/service changes to a live booking and propagate
    /// them to the calendar when an event exists. A calendar failure is
    /// tolerated: the database remains the booking of record.
    pub async fn modify_booking(
        &self,
        booking_id: &str,
        new_date: Option<&str>,
        new_time: Option<&str>,
        new_service: Option<&str>,
    ) -> Result<ModifySummary, DomainError> {
        if booking_id.trim().is_empty() {
            return Err(DomainError::MissingField("booking_id"));
        }
        if new_date.is_none() && new_time.is_none() && new_service.is_none() {
            return Err(DomainError::MissingField("new_date, new_time or new_service"));
        }

        let booking = self
            .db
            .get_booking(booking_id)?
            .ok_or(DomainError::NotFound("Booking"))?;
        if booking.status == BookingStatus::Cancelled {
            return Err(DomainError::AlreadyCancelled);
        }
        let business = self
            .db
            .get_business(&booking.business_id)?
            .ok_or(DomainError::NotFound("Business"))?;

        if let Some(date) = new_date {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| DomainError::invalid("new_date", "expected YYYY-MM-DD"))?;
        }
        if let Some(time) = new_time {
            NaiveTime::parse_from_str(time, "%H:%M")
                .map_err(|_| DomainError::invalid("new_time", "expected HH:MM"))?;
        }

        let service = match new_service {
            Some(requested) => {
                let services = self.db.active_services(&business.id)?;
                Some(
                    resolve_service(&services, requested)
                        .ok_or(DomainError::NotFound("Service"))?
                        .clone(),
                )
            }
            None => None,
        };

        self.db.update_booking(
            booking_id,
            new_date,
            new_time,
            service.as_ref().map(|s| s.id.as_str()),
            service.as_ref().map(|s| s.duration_minutes),
        )?;

        let updated = self
            .db
            .get_booking(booking_id)?
            .ok_or(DomainError::NotFound("Booking"))?;

        // Propagate to the calendar only when the booking was synced
        if let Some(event_id) = updated.calendar_event_id.as_deref() {
            if let Some(calendar_id) = self.calendar_id_for(&updated)? {
                let service_name = match &service {
                    Some(s) => Some(s.name.clone()),
                    None => match updated.service_id.as_deref() {
                        Some(id) => self.db.get_service(id)?.map(|s| s.name),
                        None => None,
                    },
                };

                let patch = event_patch_for(&business, &updated, service_name.as_deref());
                if !self
                    .calendar
                    .update_event(&calendar_id, event_id, &patch)
                    .await
                {
                    tracing::warn!(booking_id, "calendar update failed, booking modified anyway");
                }
            }
        }

        let mut changes = Vec::new();
        if let Some(date) = new_date {
            changes.push(format!("fecha: {}", date));
        }
        if let Some(time) = new_time {
            changes.push(format!("hora: {}", time));
        }
        if let Some(s) = &service {
            changes.push(format!("servicio: {}", s.name));
        }

        Ok(ModifySummary {
            booking: updated,
            changes,
        })
    }

    /// Cancel a booking and best-effort delete its calendar event
    pub async fn cancel_booking(
        &self,
        booking_id: &str,
    ) -> Result<CancelSummary, DomainError> {
        if booking_id.trim().is_empty() {
            return Err(DomainError::MissingField("booking_id"));
        }

        let booking = self
            .db
            .get_booking(booking_id)?
            .ok_or(DomainError::NotFound("Booking"))?;
        if booking.status == BookingStatus::Cancelled {
            return Err(DomainError::AlreadyCancelled);
        }

        let service_name = match booking.service_id.as_deref() {
            Some(id) => self
                .db
                .get_service(id)?
                .map(|s| s.name)
                .unwrap_or_else(|| "Servicio".to_string()),
            None => "Servicio".to_string(),
        };

        self.db
            .set_booking_status(booking_id, BookingStatus::Cancelled)?;
        tracing::info!(booking_id, "booking cancelled");

        if let Some(event_id) = booking.calendar_event_id.as_deref() {
            if let Some(calendar_id) = self.calendar_id_for(&booking)? {
                if !self.calendar.delete_event(&calendar_id, event_id).await {
                    tracing::warn!(booking_id, "calendar delete failed, booking cancelled anyway");
                }
            }
        }

        Ok(CancelSummary {
            service_name,
            booking_date: booking.booking_date,
            booking_time: booking.booking_time,
        })
    }

    /// Reconciliation pass over bookings that were persisted but never
    /// mirrored into the calendar. Returns how many synced this round.
    pub async fn retry_unsynced(&self) -> Result<usize, DomainError> {
        let pending = self.db.unsynced_bookings()?;
        let mut synced = 0;

        for booking in pending {
            let Some(business) = self.db.get_business(&booking.business_id)? else {
                continue;
            };
            let Some(staff_id) = booking.staff_id.as_deref() else {
                continue;
            };
            let Some(staff) = self.db.get_staff(staff_id)? else {
                continue;
            };
            let service_name = match booking.service_id.as_deref() {
                Some(id) => self.db.get_service(id)?.map(|s| s.name),
                None => None,
            };
            let Some(service_name) = service_name else {
                continue;
            };

            if self
                .sync_booking(&business, &booking, &service_name, Some(&staff))
                .await
            {
                synced += 1;
            }
        }

        Ok(synced)
    }

    /// Inbound reconciliation: turn externally-created calendar events
    /// into bookings so the ledger keeps up with staff who book by hand.
    /// Returns how many bookings were created.
    pub async fn reconcile_remote_events(
        &self,
        business: &Business,
        staff: &Staff,
        events: &[RemoteEvent],
    ) -> Result<usize, DomainError> {
        let services = self.db.active_services(&business.id)?;
        let tz = business.tz();
        let mut created = 0;

        for event in events {
            // All-day events carry no start instant
            let Some(start) = event.start else { continue };

            if self.db.booking_exists_for_event(&event.id)? {
                continue;
            }

            let end = event.end.unwrap_or(start);
            let duration_minutes = (end - start).num_minutes().max(0);

            let local_start = start.with_timezone(&tz);
            let summary = event.summary.as_deref().unwrap_or("Manual Entry");

            let service = infer_service_from_title(&services, summary);
            let customer_name = match service {
                Some(s) => strip_service_from_title(summary, &s.name),
                None => summary.trim().to_string(),
            };
            let customer_name = if customer_name.is_empty() {
                "Manual Entry".to_string()
            } else {
                customer_name
            };

            let booking = Booking {
                id: new_booking_id(),
                business_id: business.id.clone(),
                service_id: service.map(|s| s.id.clone()),
                staff_id: Some(staff.id.clone()),
                customer_name,
                customer_phone: String::new(),
                booking_phone: String::new(),
                booking_date: local_start.format("%Y-%m-%d").to_string(),
                booking_time: local_start.format("%H:%M").to_string(),
                duration_minutes,
                status: BookingStatus::Confirmed,
                booking_source: BookingSource::Owner,
                call_id: None,
                calendar_event_id: Some(event.id.clone()),
                synced_at: Some(Utc::now()),
                created_at: Utc::now().timestamp(),
            };

            match self.db.create_booking(&booking) {
                Ok(()) => {
                    tracing::info!(event_id = %event.id, "booking created from calendar event");
                    created += 1;
                }
                Err(e) => {
                    let e = DomainError::from(e);
                    // A slot collision here means the ledger already has
                    // this slot; preserve the existing row and move on
                    tracing::warn!(event_id = %event.id, "skipping event: {e}");
                }
            }
        }

        Ok(created)
    }

    fn calendar_id_for(&self, booking: &Booking) -> Result<Option<String>, DomainError> {
        let Some(staff_id) = booking.staff_id.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .db
            .get_staff(staff_id)?
            .and_then(|s| s.calendar_id))
    }
}

fn event_draft_for(
    business: &Business,
    booking: &Booking,
    service_name: &str,
) -> Option<EventDraft> {
    let date = NaiveDate::parse_from_str(&booking.booking_date, "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(&booking.booking_time, "%H:%M").ok()?;
    let start_local = date.and_time(time);
    let end_local = start_local + Duration::minutes(booking.duration_minutes);
    Some(EventDraft {
        summary: format!("{} - {}", service_name, booking.customer_name),
        description: format!(
            "Booking Phone: {}\nCustomer Called From: {}",
            booking.booking_phone, booking.customer_phone
        ),
        start_local,
        end_local,
        timezone: business.timezone.clone(),
    })
}

/// Patch for a modified booking: start/end always reflect the final
/// date+time+duration, so changing only the date leaves the wall-clock
/// time and duration untouched.
fn event_patch_for(
    business: &Business,
    booking: &Booking,
    service_name: Option<&str>,
) -> EventPatch {
    let times = NaiveDate::parse_from_str(&booking.booking_date, "%Y-%m-%d")
        .ok()
        .zip(NaiveTime::parse_from_str(&booking.booking_time, "%H:%M").ok())
        .map(|(date, time)| {
            let start = date.and_time(time);
            (start, start + Duration::minutes(booking.duration_minutes))
        });

    EventPatch {
        summary: service_name.map(|name| format!("{} - {}", name, booking.customer_name)),
        description: None,
        start_local: times.map(|(s, _)| s),
        end_local: times.map(|(_, e)| e),
        timezone: business.timezone.clone(),
    }
}

fn strip_service_from_title(title: &str, service_name: &str) -> String {
    let lower_title = title.to_lowercase();
    let lower_service = service_name.to_lowercase();
    let stripped = match lower_title.find(&lower_service) {
        Some(pos) => {
            let mut s = String::with_capacity(title.len());
            s.push_str(&title[..pos]);
            s.push_str(&title[pos + service_name.len()..]);
            s
        }
        None => title.to_string(),
    };
    stripped
        .trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '–' || c == '—')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Mutex;

    use crate::calendar::ChannelInfo;
    use crate::models::{BusinessStatus, BusyInterval, Language};
    use crate::timeparse::HeuristicParser;

    /// Recording fake: busy intervals per calendar, created/updated/
    /// deleted events captured for assertions, optional create failure.
    struct FakeCalendar {
        busy: Mutex<Vec<BusyInterval>>,
        created: Mutex<Vec<(String, EventDraft)>>,
        updated: Mutex<Vec<(String, EventPatch)>>,
        deleted: Mutex<Vec<String>>,
        fail_create: bool,
    }

    impl FakeCalendar {
        fn new() -> Self {
            Self {
                busy: Mutex::new(vec![]),
                created: Mutex::new(vec![]),
                updated: Mutex::new(vec![]),
                deleted: Mutex::new(vec![]),
                fail_create: false,
            }
        }

        fn failing_create() -> Self {
            Self {
                fail_create: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl CalendarProvider for FakeCalendar {
        async fn busy_intervals(
            &self,
            _calendar_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<BusyInterval>> {
            Ok(self.busy.lock().unwrap().clone())
        }

        async fn create_event(&self, calendar_id: &str, draft: &EventDraft) -> Option<String> {
            if self.fail_create {
                return None;
            }
            self.created
                .lock()
                .unwrap()
                .push((calendar_id.to_string(), draft.clone()));
            Some(format!("evt_{}", self.created.lock().unwrap().len()))
        }

        async fn update_event(
            &self,
            _calendar_id: &str,
            event_id: &str,
            patch: &EventPatch,
        ) -> bool {
            self.updated
                .lock()
                .unwrap()
                .push((event_id.to_string(), patch.clone()));
            true
        }

        async fn delete_event(&self, _calendar_id: &str, event_id: &str) -> bool {
            self.deleted.lock().unwrap().push(event_id.to_string());
            true
        }

        async fn list_upcoming(&self, _: &str, _: u32) -> Result<Vec<RemoteEvent>> {
            Ok(vec![])
        }

        async fn watch(&self, _: &str, _: &str, _: &str, _: DateTime<Utc>) -> Result<ChannelInfo> {
            anyhow::bail!("not implemented")
        }
    }

    struct Fixture {
        db: Database,
        business: Business,
        service: Service,
        staff: Staff,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
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

        let service = Service {
            id: "svc_corte".to_string(),
            business_id: business.id.clone(),
            name: "Corte de Cabello".to_string(),
            price_cents: 2500,
            duration_minutes: 45,
            is_active: true,
        };
        db.create_service(&service).unwrap();

        let staff = Staff {
            id: "stf_ana".to_string(),
            business_id: business.id.clone(),
            name: "Ana".to_string(),
            email: None,
            calendar_id: Some("cal_ana".to_string()),
            is_active: true,
            channel_id: None,
            channel_expires_at: None,
        };
        db.create_staff(&staff).unwrap();

        Fixture {
            db,
            business,
            service,
            staff,
        }
    }

    fn report(service: &str, date: &str, time: &str) -> CallReport {
        CallReport {
            assistant_id: "asst_1".to_string(),
            platform_call_id: "call_1".to_string(),
            customer_name: Some("María".to_string()),
            customer_phone: "+34600000001".to_string(),
            booking_phone: Some("+34600000002".to_string()),
            service_requested: Some(service.to_string()),
            booking_date: Some(date.to_string()),
            booking_time: Some(time.to_string()),
            outcome: CallOutcome::Booked,
            transcript: Some("transcript".to_string()),
            duration_seconds: Some(120),
            recording_url: None,
            started_at: None,
            ended_at: None,
        }
    }

    fn future_date(days: i64) -> String {
        (Utc::now().date_naive() + Duration::days(days))
            .format("%Y-%m-%d")
            .to_string()
    }

    #[tokio::test]
    async fn test_booking_created_and_synced_with_canonical_name() {
        let fx = fixture();
        let cal = FakeCalendar::new();
        let reconciler = BookingReconciler::new(&fx.db, &cal);

        // Raw phrase says "pelo"; the service is named "Cabello"
        let outcome = reconciler
            .process_call_report(
                &fx.business,
                &report("corte de pelo", &future_date(3), "15:00"),
                &HeuristicParser,
            )
            .await
            .unwrap();

        let booking_id = outcome.booking_id.unwrap();
        assert!(outcome.synced);

        let booking = fx.db.get_booking(&booking_id).unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Booked);
        assert_eq!(booking.staff_id.as_deref(), Some("stf_ana"));
        assert_eq!(booking.customer_phone, "+34600000001");
        assert_eq!(booking.booking_phone, "+34600000002");
        assert!(booking.calendar_event_id.is_some());

        let created = cal.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0, "cal_ana");
        // Canonical service name, not the raw transcription
        assert_eq!(created[0].1.summary, "Corte de Cabello - María");
        assert!(created[0].1.description.contains("+34600000002"));
        assert!(created[0].1.description.contains("+34600000001"));
    }

    #[tokio::test]
    async fn test_sync_failure_does_not_roll_back_booking() {
        let fx = fixture();
        let cal = FakeCalendar::failing_create();
        let reconciler = BookingReconciler::new(&fx.db, &cal);

        let outcome = reconciler
            .process_call_report(
                &fx.business,
                &report("corte de cabello", &future_date(3), "15:00"),
                &HeuristicParser,
            )
            .await
            .unwrap();

        assert!(!outcome.synced);
        let booking = fx.db.get_booking(&outcome.booking_id.unwrap()).unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Booked);
        assert!(booking.calendar_event_id.is_none());
        assert!(booking.synced_at.is_none());
    }

    #[tokio::test]
    async fn test_unknown_service_keeps_call_as_inquiry() {
        let fx = fixture();
        let cal = FakeCalendar::new();
        let reconciler = BookingReconciler::new(&fx.db, &cal);

        let outcome = reconciler
            .process_call_report(
                &fx.business,
                &report("masaje tailandés", &future_date(3), "15:00"),
                &HeuristicParser,
            )
            .await
            .unwrap();

        assert!(outcome.booking_id.is_none());
        assert!(cal.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_past_date_advances_one_week() {
        let fx = fixture();
        let cal = FakeCalendar::new();
        let reconciler = BookingReconciler::new(&fx.db, &cal);

        // Resolved date a week in the past repairs to exactly today
        let outcome = reconciler
            .process_call_report(
                &fx.business,
                &report("corte de cabello", &future_date(-7), "15:00"),
                &HeuristicParser,
            )
            .await
            .unwrap();

        let booking = fx.db.get_booking(&outcome.booking_id.unwrap()).unwrap().unwrap();
        assert_eq!(booking.booking_date, future_date(0));
    }

    #[tokio::test]
    async fn test_non_booked_outcome_archives_call_only() {
        let fx = fixture();
        let cal = FakeCalendar::new();
        let reconciler = BookingReconciler::new(&fx.db, &cal);

        let mut r = report("corte de cabello", &future_date(3), "15:00");
        r.outcome = CallOutcome::InquiryOnly;

        let outcome = reconciler
            .process_call_report(&fx.business, &r, &HeuristicParser)
            .await
            .unwrap();
        assert!(outcome.booking_id.is_none());
        assert!(!outcome.call_id.is_empty());
    }

    #[tokio::test]
    async fn test_modify_date_only_preserves_time_and_duration() {
        let fx = fixture();
        let cal = FakeCalendar::new();
        let reconciler = BookingReconciler::new(&fx.db, &cal);

        let outcome = reconciler
            .process_call_report(
                &fx.business,
                &report("corte de cabello", &future_date(3), "15:00"),
                &HeuristicParser,
            )
            .await
            .unwrap();
        let booking_id = outcome.booking_id.unwrap();

        let new_date = future_date(5);
        let summary = reconciler
            .modify_booking(&booking_id, Some(&new_date), None, None)
            .await
            .unwrap();
        assert_eq!(summary.booking.booking_date, new_date);
        assert_eq!(summary.booking.booking_time, "15:00");

        let updated = cal.updated.lock().unwrap();
        assert_eq!(updated.len(), 1);
        let (_, patch) = &updated[0];
        let start = patch.start_local.unwrap();
        let end = patch.end_local.unwrap();
        assert_eq!(start.format("%Y-%m-%d").to_string(), new_date);
        assert_eq!(start.format("%H:%M").to_string(), "15:00");
        assert_eq!((end - start).num_minutes(), 45);
    }

    #[tokio::test]
    async fn test_modify_requires_a_change_and_a_live_booking() {
        let fx = fixture();
        let cal = FakeCalendar::new();
        let reconciler = BookingReconciler::new(&fx.db, &cal);

        let err = reconciler
            .modify_booking("bkg_missing", Some("2099-01-01"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound("Booking")));

        let outcome = reconciler
            .process_call_report(
                &fx.business,
                &report("corte de cabello", &future_date(3), "15:00"),
                &HeuristicParser,
            )
            .await
            .unwrap();
        let booking_id = outcome.booking_id.unwrap();

        let err = reconciler
            .modify_booking(&booking_id, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::MissingField(_)));
    }

    #[tokio::test]
    async fn test_cancel_deletes_event_and_rejects_double_cancel() {
        let fx = fixture();
        let cal = FakeCalendar::new();
        let reconciler = BookingReconciler::new(&fx.db, &cal);

        let outcome = reconciler
            .process_call_report(
                &fx.business,
                &report("corte de cabello", &future_date(3), "15:00"),
                &HeuristicParser,
            )
            .await
            .unwrap();
        let booking_id = outcome.booking_id.unwrap();

        let summary = reconciler.cancel_booking(&booking_id).await.unwrap();
        assert_eq!(summary.service_name, "Corte de Cabello");
        assert_eq!(cal.deleted.lock().unwrap().len(), 1);

        let booking = fx.db.get_booking(&booking_id).unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);

        let err = reconciler.cancel_booking(&booking_id).await.unwrap_err();
        assert!(matches!(err, DomainError::AlreadyCancelled));
    }

    #[tokio::test]
    async fn test_retry_unsynced_closes_the_gap() {
        let fx = fixture();

        // First pass: calendar down, booking saved unsynced
        let down = FakeCalendar::failing_create();
        let booking_id = {
            let reconciler = BookingReconciler::new(&fx.db, &down);
            reconciler
                .process_call_report(
                    &fx.business,
                    &report("corte de cabello", &future_date(3), "15:00"),
                    &HeuristicParser,
                )
                .await
                .unwrap()
                .booking_id
                .unwrap()
        };

        // Second pass: calendar back up
        let up = FakeCalendar::new();
        let reconciler = BookingReconciler::new(&fx.db, &up);
        let synced = reconciler.retry_unsynced().await.unwrap();
        assert_eq!(synced, 1);

        let booking = fx.db.get_booking(&booking_id).unwrap().unwrap();
        assert!(booking.calendar_event_id.is_some());

        // Nothing left to do
        assert_eq!(reconciler.retry_unsynced().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remote_events_become_owner_bookings() {
        let fx = fixture();
        let cal = FakeCalendar::new();
        let reconciler = BookingReconciler::new(&fx.db, &cal);

        let start = Utc::now() + Duration::days(2);
        let events = vec![
            RemoteEvent {
                id: "evt_manual".to_string(),
                summary: Some("Corte de Cabello - Laura".to_string()),
                start: Some(start),
                end: Some(start + Duration::minutes(45)),
            },
            // All-day event: no start instant, skipped
            RemoteEvent {
                id: "evt_allday".to_string(),
                summary: Some("Vacaciones".to_string()),
                start: None,
                end: None,
            },
        ];

        let created = reconciler
            .reconcile_remote_events(&fx.business, &fx.staff, &events)
            .await
            .unwrap();
        assert_eq!(created, 1);

        assert!(fx.db.booking_exists_for_event("evt_manual").unwrap());
        let bookings = fx.db.list_upcoming_bookings(&fx.business.id, "2000-01-01").unwrap();
        let booking = bookings
            .iter()
            .find(|b| b.calendar_event_id.as_deref() == Some("evt_manual"))
            .unwrap();
        assert_eq!(booking.booking_source, BookingSource::Owner);
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.service_id.as_deref(), Some("svc_corte"));
        assert_eq!(booking.customer_name, "Laura");
        assert_eq!(booking.duration_minutes, 45);

        // Replaying the same events is a no-op
        let again = reconciler
            .reconcile_remote_events(&fx.business, &fx.staff, &events)
            .await
            .unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_unmatched_title_still_produces_a_booking() {
        let fx = fixture();
        let cal = FakeCalendar::new();
        let reconciler = BookingReconciler::new(&fx.db, &cal);

        let start = Utc::now() + Duration::days(2);
        let events = vec![RemoteEvent {
            id: "evt_opaque".to_string(),
            summary: Some("Cita personal".to_string()),
            start: Some(start),
            end: Some(start + Duration::minutes(30)),
        }];

        let created = reconciler
            .reconcile_remote_events(&fx.business, &fx.staff, &events)
            .await
            .unwrap();
        assert_eq!(created, 1);

        let bookings = fx.db.list_upcoming_bookings(&fx.business.id, "2000-01-01").unwrap();
        let booking = bookings
            .iter()
            .find(|b| b.calendar_event_id.as_deref() == Some("evt_opaque"))
            .unwrap();
        assert!(booking.service_id.is_none());
        assert_eq!(booking.customer_name, "Cita personal");
    }

    #[test]
    fn test_strip_service_from_title() {
        assert_eq!(strip_service_from_title("Corte - Laura", "Corte"), "Laura");
        assert_eq!(strip_service_from_title("corte Laura", "Corte"), "Laura");
        assert_eq!(strip_service_from_title("Corte", "Corte"), "");
    }
}
