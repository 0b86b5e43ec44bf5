use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::models::{
    Booking, BookingSource, BookingStatus, Business, BusinessStatus, CallOutcome, CallRecord,
    DayHours, Language, Service, Staff, WeekSchedule,
};

const MIGRATION_001: &str = include_str!("migrations/001_initial.sql");

/// Database connection wrapper
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// True if the error is the staff/slot unique-index violation raised by
/// two bookings racing for the same slot.
pub fn is_slot_conflict(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(e, msg)) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && msg
                    .as_deref()
                    .is_some_and(|m| m.contains("staff_id") || m.contains("idx_bookings_staff_slot"))
        }
        _ => false,
    }
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(MIGRATION_001)
            .context("Failed to run migration 001")?;
        Ok(())
    }

    // ==================== Business Operations ====================

    pub fn create_business(&self, business: &Business) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO businesses (id, name, phone, email, assistant_id, api_key_hash,
                                    timezone, language, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                business.id,
                business.name,
                business.phone,
                business.email,
                business.assistant_id,
                business.api_key_hash,
                business.timezone,
                business.language.as_str(),
                business.status.as_str(),
                business.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_business(&self, id: &str) -> Result<Option<Business>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE id = ?1"
        ))?;
        stmt.query_row(params![id], business_from_row)
            .optional()
            .context("Failed to get business")
    }

    /// Tenant lookup for inbound voice-platform requests. No fallback id:
    /// an unknown assistant is a not-found, full stop.
    pub fn get_business_by_assistant(&self, assistant_id: &str) -> Result<Option<Business>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE assistant_id = ?1 AND status = 'active'"
        ))?;
        stmt.query_row(params![assistant_id], business_from_row)
            .optional()
            .context("Failed to get business by assistant")
    }

    /// Find a business by validating an API key against stored hashes
    pub fn find_business_by_api_key(&self, api_key: &str) -> Result<Option<Business>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE status = 'active'"
        ))?;
        let businesses = stmt.query_map([], business_from_row)?;

        for business in businesses {
            let business = business?;
            if bcrypt::verify(api_key, &business.api_key_hash).unwrap_or(false) {
                return Ok(Some(business));
            }
        }
        Ok(None)
    }

    // ==================== Working Hours ====================

    /// Upsert one weekday row. `None` marks the day closed.
    pub fn set_working_hours(
        &self,
        business_id: &str,
        weekday: Weekday,
        hours: Option<DayHours>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let weekday_idx = weekday.num_days_from_monday() as i64;
        match hours {
            Some(h) => conn.execute(
                r#"
                INSERT INTO working_hours (business_id, weekday, is_closed, open_time, close_time)
                VALUES (?1, ?2, 0, ?3, ?4)
                ON CONFLICT (business_id, weekday)
                DO UPDATE SET is_closed = 0, open_time = ?3, close_time = ?4
                "#,
                params![
                    business_id,
                    weekday_idx,
                    h.open.format("%H:%M").to_string(),
                    h.close.format("%H:%M").to_string(),
                ],
            )?,
            None => conn.execute(
                r#"
                INSERT INTO working_hours (business_id, weekday, is_closed, open_time, close_time)
                VALUES (?1, ?2, 1, NULL, NULL)
                ON CONFLICT (business_id, weekday)
                DO UPDATE SET is_closed = 1, open_time = NULL, close_time = NULL
                "#,
                params![business_id, weekday_idx],
            )?,
        };
        Ok(())
    }

    /// Full weekday -> hours map for one business. Absent rows and
    /// is_closed rows both come back as closed days.
    pub fn get_week_schedule(&self, business_id: &str) -> Result<WeekSchedule> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT weekday, is_closed, open_time, close_time
             FROM working_hours WHERE business_id = ?1",
        )?;

        let mut schedule = WeekSchedule::default();
        let rows = stmt.query_map(params![business_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        for row in rows {
            let (weekday_idx, is_closed, open, close) = row?;
            if is_closed {
                continue;
            }
            let (Some(open), Some(close)) = (open, close) else {
                continue;
            };
            let open = NaiveTime::parse_from_str(&open, "%H:%M")
                .context("Malformed open_time in working_hours")?;
            let close = NaiveTime::parse_from_str(&close, "%H:%M")
                .context("Malformed close_time in working_hours")?;
            if let (Ok(hours), Some(weekday)) = (DayHours::new(open, close), weekday_from_idx(weekday_idx)) {
                schedule.set(weekday, Some(hours));
            }
        }
        Ok(schedule)
    }

    // ==================== Services ====================

    pub fn create_service(&self, service: &Service) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO services (id, business_id, name, price_cents, duration_minutes, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                service.id,
                service.business_id,
                service.name,
                service.price_cents,
                service.duration_minutes,
                service.is_active,
            ],
        )?;
        Ok(())
    }

    pub fn get_service(&self, id: &str) -> Result<Option<Service>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?1"
        ))?;
        stmt.query_row(params![id], service_from_row)
            .optional()
            .context("Failed to get service")
    }

    pub fn active_services(&self, business_id: &str) -> Result<Vec<Service>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services
             WHERE business_id = ?1 AND is_active = 1 ORDER BY name ASC"
        ))?;
        let services = stmt.query_map(params![business_id], service_from_row)?;
        services
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list services")
    }

    // ==================== Staff ====================

    pub fn create_staff(&self, staff: &Staff) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO staff (id, business_id, name, email, calendar_id, is_active,
                               channel_id, channel_expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                staff.id,
                staff.business_id,
                staff.name,
                staff.email,
                staff.calendar_id,
                staff.is_active,
                staff.channel_id,
                staff.channel_expires_at.map(|t| t.timestamp()),
            ],
        )?;
        Ok(())
    }

    pub fn get_staff(&self, id: &str) -> Result<Option<Staff>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT {STAFF_COLUMNS} FROM staff WHERE id = ?1"))?;
        stmt.query_row(params![id], staff_from_row)
            .optional()
            .context("Failed to get staff")
    }

    pub fn active_staff(&self, business_id: &str) -> Result<Vec<Staff>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {STAFF_COLUMNS} FROM staff
             WHERE business_id = ?1 AND is_active = 1 ORDER BY name ASC"
        ))?;
        let staff = stmt.query_map(params![business_id], staff_from_row)?;
        staff
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list staff")
    }

    /// Active staff across every business whose webhook channel is absent
    /// or expires before the cutoff. Input to the renewal job.
    pub fn staff_needing_channel_renewal(&self, cutoff: DateTime<Utc>) -> Result<Vec<Staff>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {STAFF_COLUMNS} FROM staff
             WHERE is_active = 1 AND calendar_id IS NOT NULL
               AND (channel_expires_at IS NULL OR channel_expires_at < ?1)
             ORDER BY name ASC"
        ))?;
        let staff = stmt.query_map(params![cutoff.timestamp()], staff_from_row)?;
        staff
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list staff needing renewal")
    }

    pub fn get_staff_by_channel(&self, channel_id: &str) -> Result<Option<Staff>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {STAFF_COLUMNS} FROM staff WHERE channel_id = ?1"
        ))?;
        stmt.query_row(params![channel_id], staff_from_row)
            .optional()
            .context("Failed to get staff by channel")
    }

    pub fn update_staff_channel(
        &self,
        staff_id: &str,
        channel_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE staff SET channel_id = ?1, channel_expires_at = ?2 WHERE id = ?3",
            params![channel_id, expires_at.timestamp(), staff_id],
        )?;
        Ok(())
    }

    pub fn assign_staff_to_service(&self, service_id: &str, staff_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO service_staff (service_id, staff_id) VALUES (?1, ?2)",
            params![service_id, staff_id],
        )?;
        Ok(())
    }

    /// Active staff qualified for a service. Empty when the service has
    /// no explicit assignments; the caller then falls back to all active
    /// staff.
    pub fn staff_for_service(&self, service_id: &str) -> Result<Vec<Staff>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {STAFF_COLUMNS_QUALIFIED} FROM staff s
             JOIN service_staff ss ON ss.staff_id = s.id
             WHERE ss.service_id = ?1 AND s.is_active = 1
             ORDER BY s.name ASC"
        ))?;
        let staff = stmt.query_map(params![service_id], staff_from_row)?;
        staff
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list staff for service")
    }

    // ==================== Bookings ====================

    pub fn create_booking(&self, booking: &Booking) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO bookings (id, business_id, service_id, staff_id, customer_name,
                                  customer_phone, booking_phone, booking_date, booking_time,
                                  duration_minutes, status, booking_source, call_id,
                                  calendar_event_id, synced_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                booking.id,
                booking.business_id,
                booking.service_id,
                booking.staff_id,
                booking.customer_name,
                booking.customer_phone,
                booking.booking_phone,
                booking.booking_date,
                booking.booking_time,
                booking.duration_minutes,
                booking.status.as_str(),
                booking.booking_source.as_str(),
                booking.call_id,
                booking.calendar_event_id,
                booking.synced_at.map(|t| t.timestamp()),
                booking.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_booking(&self, id: &str) -> Result<Option<Booking>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"
        ))?;
        stmt.query_row(params![id], booking_from_row)
            .optional()
            .context("Failed to get booking")
    }

    pub fn booking_exists_for_event(&self, calendar_event_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT 1 FROM bookings WHERE calendar_event_id = ?1")?;
        Ok(stmt.exists(params![calendar_event_id])?)
    }

    /// Partial update used by the modify operation; None leaves a field as-is
    pub fn update_booking(
        &self,
        id: &str,
        new_date: Option<&str>,
        new_time: Option<&str>,
        new_service_id: Option<&str>,
        new_duration_minutes: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE bookings SET
                booking_date = COALESCE(?1, booking_date),
                booking_time = COALESCE(?2, booking_time),
                service_id = COALESCE(?3, service_id),
                duration_minutes = COALESCE(?4, duration_minutes)
            WHERE id = ?5
            "#,
            params![new_date, new_time, new_service_id, new_duration_minutes, id],
        )?;
        Ok(())
    }

    pub fn set_booking_status(&self, id: &str, status: BookingStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE bookings SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    pub fn mark_booking_synced(&self, id: &str, calendar_event_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE bookings SET calendar_event_id = ?1, synced_at = ?2 WHERE id = ?3",
            params![calendar_event_id, Utc::now().timestamp(), id],
        )?;
        Ok(())
    }

    /// Upcoming non-cancelled bookings matching either retained phone number
    pub fn find_bookings_by_phone(
        &self,
        business_id: &str,
        phone: &str,
        from_date: &str,
    ) -> Result<Vec<Booking>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE business_id = ?1 AND status IN ('booked', 'confirmed')
               AND booking_date >= ?2
               AND (customer_phone = ?3 OR booking_phone = ?3)
             ORDER BY booking_date ASC, booking_time ASC"
        ))?;
        let bookings = stmt.query_map(params![business_id, from_date, phone], booking_from_row)?;
        bookings
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to find bookings by phone")
    }

    /// Fallback search: name substring plus a secondary phone number
    pub fn find_bookings_by_name_and_phone(
        &self,
        business_id: &str,
        customer_name: &str,
        phone: &str,
        from_date: &str,
    ) -> Result<Vec<Booking>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{}%", customer_name);
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE business_id = ?1 AND status IN ('booked', 'confirmed')
               AND booking_date >= ?2
               AND customer_name LIKE ?3
               AND (customer_phone = ?4 OR booking_phone = ?4)
             ORDER BY booking_date ASC, booking_time ASC"
        ))?;
        let bookings = stmt.query_map(
            params![business_id, from_date, pattern, phone],
            booking_from_row,
        )?;
        bookings
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to find bookings by name and phone")
    }

    pub fn list_upcoming_bookings(&self, business_id: &str, from_date: &str) -> Result<Vec<Booking>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE business_id = ?1 AND booking_date >= ?2
             ORDER BY booking_date ASC, booking_time ASC"
        ))?;
        let bookings = stmt.query_map(params![business_id, from_date], booking_from_row)?;
        bookings
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list bookings")
    }

    /// Bookings written but never mirrored into the calendar. Input to
    /// the resync pass.
    pub fn unsynced_bookings(&self) -> Result<Vec<Booking>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE status IN ('booked', 'confirmed') AND calendar_event_id IS NULL
             ORDER BY created_at ASC"
        ))?;
        let bookings = stmt.query_map([], booking_from_row)?;
        bookings
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list unsynced bookings")
    }

    // ==================== Calls ====================

    pub fn create_call(&self, call: &CallRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO calls (id, business_id, platform_call_id, customer_name, phone,
                               duration_seconds, outcome, transcript, recording_url,
                               started_at, ended_at, summary, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                call.id,
                call.business_id,
                call.platform_call_id,
                call.customer_name,
                call.phone,
                call.duration_seconds,
                call.outcome.as_str(),
                call.transcript,
                call.recording_url,
                call.started_at.map(|t| t.timestamp()),
                call.ended_at.map(|t| t.timestamp()),
                call.summary,
                call.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn update_call_outcome(&self, id: &str, outcome: CallOutcome) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE calls SET outcome = ?1 WHERE id = ?2",
            params![outcome.as_str(), id],
        )?;
        Ok(())
    }

    /// The only permitted mutation of a call record besides its outcome
    pub fn set_call_summary(&self, id: &str, summary: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE calls SET summary = ?1 WHERE id = ?2",
            params![summary, id],
        )?;
        Ok(())
    }
}

// ==================== Row Mapping ====================

const BUSINESS_COLUMNS: &str =
    "id, name, phone, email, assistant_id, api_key_hash, timezone, language, status, created_at";

fn business_from_row(row: &Row<'_>) -> rusqlite::Result<Business> {
    Ok(Business {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        assistant_id: row.get(4)?,
        api_key_hash: row.get(5)?,
        timezone: row.get(6)?,
        language: Language::parse(&row.get::<_, String>(7)?).unwrap_or_default(),
        status: BusinessStatus::parse(&row.get::<_, String>(8)?).unwrap_or_default(),
        created_at: row.get(9)?,
    })
}

const SERVICE_COLUMNS: &str = "id, business_id, name, price_cents, duration_minutes, is_active";

fn service_from_row(row: &Row<'_>) -> rusqlite::Result<Service> {
    Ok(Service {
        id: row.get(0)?,
        business_id: row.get(1)?,
        name: row.get(2)?,
        price_cents: row.get(3)?,
        duration_minutes: row.get(4)?,
        is_active: row.get(5)?,
    })
}

const STAFF_COLUMNS: &str =
    "id, business_id, name, email, calendar_id, is_active, channel_id, channel_expires_at";

const STAFF_COLUMNS_QUALIFIED: &str =
    "s.id, s.business_id, s.name, s.email, s.calendar_id, s.is_active, s.channel_id, s.channel_expires_at";

fn staff_from_row(row: &Row<'_>) -> rusqlite::Result<Staff> {
    Ok(Staff {
        id: row.get(0)?,
        business_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        calendar_id: row.get(4)?,
        is_active: row.get(5)?,
        channel_id: row.get(6)?,
        channel_expires_at: row
            .get::<_, Option<i64>>(7)?
            .and_then(|t| DateTime::from_timestamp(t, 0)),
    })
}

const BOOKING_COLUMNS: &str =
    "id, business_id, service_id, staff_id, customer_name, customer_phone, booking_phone,
     booking_date, booking_time, duration_minutes, status, booking_source, call_id,
     calendar_event_id, synced_at, created_at";

fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: row.get(0)?,
        business_id: row.get(1)?,
        service_id: row.get(2)?,
        staff_id: row.get(3)?,
        customer_name: row.get(4)?,
        customer_phone: row.get(5)?,
        booking_phone: row.get(6)?,
        booking_date: row.get(7)?,
        booking_time: row.get(8)?,
        duration_minutes: row.get(9)?,
        status: BookingStatus::parse(&row.get::<_, String>(10)?).unwrap_or_default(),
        booking_source: BookingSource::parse(&row.get::<_, String>(11)?).unwrap_or_default(),
        call_id: row.get(12)?,
        calendar_event_id: row.get(13)?,
        synced_at: row
            .get::<_, Option<i64>>(14)?
            .and_then(|t| DateTime::from_timestamp(t, 0)),
        created_at: row.get(15)?,
    })
}

fn weekday_from_idx(idx: i64) -> Option<Weekday> {
    match idx {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::new_booking_id;
    use chrono::NaiveTime;

    fn test_business() -> Business {
        Business {
            id: uuid::Uuid::new_v4().to_string(),
            name: "Bella Vista".to_string(),
            phone: Some("+34910000000".to_string()),
            email: None,
            assistant_id: uuid::Uuid::new_v4().to_string(),
            api_key_hash: bcrypt::hash("test_api_key", 4).unwrap(),
            timezone: "Europe/Madrid".to_string(),
            language: Language::Es,
            status: BusinessStatus::Active,
            created_at: Utc::now().timestamp(),
        }
    }

    fn test_booking(business_id: &str, staff_id: Option<&str>, date: &str, time: &str) -> Booking {
        Booking {
            id: new_booking_id(),
            business_id: business_id.to_string(),
            service_id: None,
            staff_id: staff_id.map(|s| s.to_string()),
            customer_name: "María".to_string(),
            customer_phone: "+34600000001".to_string(),
            booking_phone: "+34600000002".to_string(),
            booking_date: date.to_string(),
            booking_time: time.to_string(),
            duration_minutes: 45,
            status: BookingStatus::Booked,
            booking_source: BookingSource::Phone,
            call_id: None,
            calendar_event_id: None,
            synced_at: None,
            created_at: Utc::now().timestamp(),
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_open_on_disk_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("salond.db");

        let business = test_business();
        {
            let db = Database::open(&path).unwrap();
            db.create_business(&business).unwrap();
        }

        // Reopen: migrations are idempotent and data survives
        let db = Database::open(&path).unwrap();
        let found = db.get_business(&business.id).unwrap().unwrap();
        assert_eq!(found.name, business.name);
    }

    #[test]
    fn test_create_and_get_business() {
        let db = Database::open_in_memory().unwrap();
        let business = test_business();
        db.create_business(&business).unwrap();

        let by_assistant = db
            .get_business_by_assistant(&business.assistant_id)
            .unwrap()
            .unwrap();
        assert_eq!(by_assistant.id, business.id);
        assert_eq!(by_assistant.name, "Bella Vista");

        assert!(db.get_business_by_assistant("unknown").unwrap().is_none());
    }

    #[test]
    fn test_find_business_by_api_key() {
        let db = Database::open_in_memory().unwrap();
        let business = test_business();
        db.create_business(&business).unwrap();

        let found = db.find_business_by_api_key("test_api_key").unwrap();
        assert!(found.is_some());
        assert!(db.find_business_by_api_key("wrong_key").unwrap().is_none());
    }

    #[test]
    fn test_week_schedule_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let business = test_business();
        db.create_business(&business).unwrap();

        let hours = DayHours::new(t(9, 0), t(18, 0)).unwrap();
        db.set_working_hours(&business.id, Weekday::Mon, Some(hours))
            .unwrap();
        db.set_working_hours(&business.id, Weekday::Sun, None).unwrap();

        let schedule = db.get_week_schedule(&business.id).unwrap();
        assert_eq!(schedule.for_weekday(Weekday::Mon), Some(hours));
        assert_eq!(schedule.for_weekday(Weekday::Sun), None);
        // No row at all also means closed
        assert_eq!(schedule.for_weekday(Weekday::Tue), None);
    }

    #[test]
    fn test_double_booking_same_slot_rejected() {
        let db = Database::open_in_memory().unwrap();
        let business = test_business();
        db.create_business(&business).unwrap();

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

        let first = test_booking(&business.id, Some("stf_ana"), "2025-12-15", "10:00");
        db.create_booking(&first).unwrap();

        let second = test_booking(&business.id, Some("stf_ana"), "2025-12-15", "10:00");
        let err = db.create_booking(&second).unwrap_err();
        assert!(is_slot_conflict(&err));

        // Cancelling the first frees the slot
        db.set_booking_status(&first.id, BookingStatus::Cancelled)
            .unwrap();
        let third = test_booking(&business.id, Some("stf_ana"), "2025-12-15", "10:00");
        db.create_booking(&third).unwrap();
    }

    #[test]
    fn test_unassigned_bookings_never_conflict() {
        let db = Database::open_in_memory().unwrap();
        let business = test_business();
        db.create_business(&business).unwrap();

        db.create_booking(&test_booking(&business.id, None, "2025-12-15", "10:00"))
            .unwrap();
        db.create_booking(&test_booking(&business.id, None, "2025-12-15", "10:00"))
            .unwrap();
    }

    #[test]
    fn test_find_bookings_by_phone_matches_either_number() {
        let db = Database::open_in_memory().unwrap();
        let business = test_business();
        db.create_business(&business).unwrap();

        let booking = test_booking(&business.id, None, "2099-01-05", "10:00");
        db.create_booking(&booking).unwrap();

        let by_origin = db
            .find_bookings_by_phone(&business.id, "+34600000001", "2025-01-01")
            .unwrap();
        assert_eq!(by_origin.len(), 1);

        let by_stated = db
            .find_bookings_by_phone(&business.id, "+34600000002", "2025-01-01")
            .unwrap();
        assert_eq!(by_stated.len(), 1);

        let none = db
            .find_bookings_by_phone(&business.id, "+34699999999", "2025-01-01")
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_unsynced_bookings_and_mark_synced() {
        let db = Database::open_in_memory().unwrap();
        let business = test_business();
        db.create_business(&business).unwrap();

        let booking = test_booking(&business.id, None, "2099-01-05", "10:00");
        db.create_booking(&booking).unwrap();
        assert_eq!(db.unsynced_bookings().unwrap().len(), 1);

        db.mark_booking_synced(&booking.id, "evt_123").unwrap();
        assert!(db.unsynced_bookings().unwrap().is_empty());

        let synced = db.get_booking(&booking.id).unwrap().unwrap();
        assert_eq!(synced.calendar_event_id.as_deref(), Some("evt_123"));
        assert!(synced.synced_at.is_some());
        assert!(db.booking_exists_for_event("evt_123").unwrap());
    }

    #[test]
    fn test_staff_for_service_falls_back_when_unassigned() {
        let db = Database::open_in_memory().unwrap();
        let business = test_business();
        db.create_business(&business).unwrap();

        let service = Service {
            id: "svc_corte".to_string(),
            business_id: business.id.clone(),
            name: "Corte".to_string(),
            price_cents: 2000,
            duration_minutes: 30,
            is_active: true,
        };
        db.create_service(&service).unwrap();

        let ana = Staff {
            id: "stf_ana".to_string(),
            business_id: business.id.clone(),
            name: "Ana".to_string(),
            email: None,
            calendar_id: Some("cal_ana".to_string()),
            is_active: true,
            channel_id: None,
            channel_expires_at: None,
        };
        db.create_staff(&ana).unwrap();

        // No assignment rows yet: qualified list is empty
        assert!(db.staff_for_service("svc_corte").unwrap().is_empty());

        db.assign_staff_to_service("svc_corte", "stf_ana").unwrap();
        let qualified = db.staff_for_service("svc_corte").unwrap();
        assert_eq!(qualified.len(), 1);
        assert_eq!(qualified[0].name, "Ana");
    }

    #[test]
    fn test_call_summary_is_appended() {
        let db = Database::open_in_memory().unwrap();
        let business = test_business();
        db.create_business(&business).unwrap();

        let call = CallRecord {
            id: "call_1".to_string(),
            business_id: business.id.clone(),
            platform_call_id: "pcall_1".to_string(),
            customer_name: "María".to_string(),
            phone: "+34600000001".to_string(),
            duration_seconds: 95,
            outcome: CallOutcome::Booked,
            transcript: "hola".to_string(),
            recording_url: None,
            started_at: None,
            ended_at: None,
            summary: None,
            created_at: Utc::now().timestamp(),
        };
        db.create_call(&call).unwrap();
        db.set_call_summary("call_1", "booked a haircut for Monday")
            .unwrap();
        db.update_call_outcome("call_1", CallOutcome::InquiryOnly)
            .unwrap();
    }

    #[test]
    fn test_staff_needing_channel_renewal() {
        let db = Database::open_in_memory().unwrap();
        let business = test_business();
        db.create_business(&business).unwrap();

        let fresh = Staff {
            id: "stf_fresh".to_string(),
            business_id: business.id.clone(),
            name: "Fresh".to_string(),
            email: None,
            calendar_id: Some("cal_fresh".to_string()),
            is_active: true,
            channel_id: Some("chan_1".to_string()),
            channel_expires_at: Some(Utc::now() + chrono::Duration::days(20)),
        };
        let stale = Staff {
            id: "stf_stale".to_string(),
            business_id: business.id.clone(),
            name: "Stale".to_string(),
            email: None,
            calendar_id: Some("cal_stale".to_string()),
            is_active: true,
            channel_id: None,
            channel_expires_at: None,
        };
        db.create_staff(&fresh).unwrap();
        db.create_staff(&stale).unwrap();

        let cutoff = Utc::now() + chrono::Duration::days(10);
        let needing = db.staff_needing_channel_renewal(cutoff).unwrap();
        assert_eq!(needing.len(), 1);
        assert_eq!(needing[0].id, "stf_stale");
    }
}
