use chrono::{Duration, NaiveDate, NaiveTime, Timelike};
use chrono_tz::Tz;
use std::collections::BTreeSet;

use super::local_to_utc;
use crate::models::{BusyInterval, DayHours};

/// Candidate grid granularity
pub const SUGGESTION_STEP_MINUTES: i64 = 30;
/// Search neighborhood on each side of the requested time
pub const SUGGESTION_WINDOW_MINUTES: i64 = 120;
/// Cap on returned alternatives
pub const MAX_SUGGESTIONS: usize = 3;

/// Propose up to three alternative start times near a rejected request.
///
/// The search window is the anchor +/- two hours clipped to the working
/// window. Candidates are the half-hour grid plus the end times of busy
/// intervals inside the window (so a 45-minute appointment ending at
/// 10:45 yields 10:45). A candidate is valid when at least one of the
/// given busy sets (one per staff member) has no overlap and the slot
/// finishes by closing time. The rejected anchor itself is never
/// suggested. Results come back closest-first, ties to the earlier time.
pub fn suggest_times(
    busy_sets: &[Vec<BusyInterval>],
    tz: Tz,
    date: NaiveDate,
    window: DayHours,
    duration_minutes: i64,
    anchor: NaiveTime,
) -> Vec<NaiveTime> {
    if busy_sets.is_empty() || duration_minutes <= 0 {
        return Vec::new();
    }

    let open_min = minutes_of_day(window.open);
    let close_min = minutes_of_day(window.close);
    let anchor_min = minutes_of_day(anchor);

    let lo = open_min.max(anchor_min - SUGGESTION_WINDOW_MINUTES);
    let hi = close_min.min(anchor_min + SUGGESTION_WINDOW_MINUTES);

    let mut candidates = BTreeSet::new();
    let mut grid = lo + (SUGGESTION_STEP_MINUTES - lo.rem_euclid(SUGGESTION_STEP_MINUTES))
        % SUGGESTION_STEP_MINUTES;
    while grid <= hi {
        candidates.insert(grid);
        grid += SUGGESTION_STEP_MINUTES;
    }
    for busy_set in busy_sets {
        for busy in busy_set {
            let local_end = busy.end.with_timezone(&tz);
            if local_end.date_naive() == date {
                let end_min = minutes_of_day(local_end.time());
                if (lo..=hi).contains(&end_min) {
                    candidates.insert(end_min);
                }
            }
        }
    }
    candidates.remove(&anchor_min);

    let mut valid: Vec<i64> = candidates
        .into_iter()
        .filter(|&start_min| start_min + duration_minutes <= close_min)
        .filter(|&start_min| {
            let Some(start_time) = time_from_minutes(start_min) else {
                return false;
            };
            let Ok(slot_start) = local_to_utc(tz, date, start_time) else {
                return false;
            };
            let slot_end = slot_start + Duration::minutes(duration_minutes);
            busy_sets
                .iter()
                .any(|set| !set.iter().any(|b| b.conflicts_with(slot_start, slot_end)))
        })
        .collect();

    valid.sort_by_key(|&c| ((c - anchor_min).abs(), c));
    valid.truncate(MAX_SUGGESTIONS);

    valid
        .into_iter()
        .filter_map(time_from_minutes)
        .collect()
}

fn minutes_of_day(time: NaiveTime) -> i64 {
    (time.hour() * 60 + time.minute()) as i64
}

fn time_from_minutes(minutes: i64) -> Option<NaiveTime> {
    if !(0..24 * 60).contains(&minutes) {
        return None;
    }
    NaiveTime::from_hms_opt((minutes / 60) as u32, (minutes % 60) as u32, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::local_to_utc;

    fn madrid() -> Tz {
        chrono_tz::Europe::Madrid
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 8).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(open: (u32, u32), close: (u32, u32)) -> DayHours {
        DayHours::new(t(open.0, open.1), t(close.0, close.1)).unwrap()
    }

    fn busy_local(from: (u32, u32), to: (u32, u32)) -> BusyInterval {
        let start = local_to_utc(madrid(), monday(), t(from.0, from.1)).unwrap();
        let end = local_to_utc(madrid(), monday(), t(to.0, to.1)).unwrap();
        BusyInterval::new(start, end)
    }

    #[test]
    fn test_busy_interval_end_becomes_a_suggestion() {
        // One staff member, one 10:00-10:45 appointment, 45-minute service
        let busy = vec![vec![busy_local((10, 0), (10, 45))]];
        let suggestions = suggest_times(&busy, madrid(), monday(), window((9, 0), (18, 0)), 45, t(10, 0));

        assert!(suggestions.contains(&t(10, 45)));
        assert!(!suggestions.contains(&t(10, 0)));
        assert!(suggestions.len() <= MAX_SUGGESTIONS);
    }

    #[test]
    fn test_rejected_time_never_suggested_even_when_free() {
        // Nothing is busy, but the anchor must still be excluded
        let busy = vec![vec![]];
        let suggestions = suggest_times(&busy, madrid(), monday(), window((9, 0), (18, 0)), 30, t(10, 0));
        assert!(!suggestions.is_empty());
        assert!(!suggestions.contains(&t(10, 0)));
    }

    #[test]
    fn test_slots_never_run_past_closing() {
        // 90-minute service, close at 18:00: 17:00 would end at 18:30
        let busy = vec![vec![]];
        let suggestions = suggest_times(&busy, madrid(), monday(), window((9, 0), (18, 0)), 90, t(17, 0));
        for s in &suggestions {
            let end_min = s.hour() as i64 * 60 + s.minute() as i64 + 90;
            assert!(end_min <= 18 * 60, "suggestion {s} overruns closing time");
        }
    }

    #[test]
    fn test_fully_booked_day_yields_nothing() {
        let busy = vec![vec![busy_local((9, 0), (18, 0))]];
        let suggestions = suggest_times(&busy, madrid(), monday(), window((9, 0), (18, 0)), 30, t(11, 0));
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_closest_alternatives_come_first() {
        let busy = vec![vec![busy_local((10, 0), (10, 45))]];
        let suggestions = suggest_times(&busy, madrid(), monday(), window((9, 0), (18, 0)), 45, t(10, 0));

        // 10:45 (45 min away) beats 9:00 and 11:00 (60 min away);
        // the 60-minute tie breaks to the earlier time
        assert_eq!(suggestions, vec![t(10, 45), t(9, 0), t(11, 0)]);
    }

    #[test]
    fn test_any_free_staff_member_validates_a_slot() {
        // Ana busy 10:00-12:00, Berta free: slots inside that range are
        // still suggestible thanks to Berta
        let busy = vec![
            vec![busy_local((10, 0), (12, 0))],
            vec![],
        ];
        let suggestions = suggest_times(&busy, madrid(), monday(), window((9, 0), (18, 0)), 30, t(10, 0));
        assert!(suggestions.contains(&t(10, 30)));
    }

    #[test]
    fn test_no_staff_means_no_suggestions() {
        let suggestions = suggest_times(&[], madrid(), monday(), window((9, 0), (18, 0)), 30, t(10, 0));
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_window_clips_to_working_hours() {
        // Anchor 9:30 with open 9:00: nothing before 9:00 appears
        let busy = vec![vec![]];
        let suggestions = suggest_times(&busy, madrid(), monday(), window((9, 0), (18, 0)), 30, t(9, 30));
        for s in &suggestions {
            assert!(*s >= t(9, 0));
        }
    }
}
