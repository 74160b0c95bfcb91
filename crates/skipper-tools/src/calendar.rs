//! Shared booking calendar.
//!
//! The real deployment reads a hosted calendar; the assistant only needs
//! two queries (events overlapping a window, and event creation), so the
//! backend sits behind [`Calendar`]. [`InMemoryCalendar`] is the default
//! backend and the one tests use.
//!
//! Free-slot computation is plain interval subtraction over the working day.

use crate::error::ToolError;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Working day bounds for charters.
pub const DAY_START_HOUR: u32 = 8;
pub const DAY_END_HOUR: u32 = 20;

/// A booked calendar entry. Event summaries carry the yacht name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl CalendarEvent {
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start < end && start < self.end
    }
}

/// A free window on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl FreeSlot {
    /// Hebrew display text, e.g. `בין 08:00 ל-10:00`.
    pub fn display_text(&self) -> String {
        format!(
            "בין {} ל-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

#[async_trait]
pub trait Calendar: Send + Sync {
    /// Events overlapping `[start, end)`, in any order.
    async fn events_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>, ToolError>;

    async fn create_event(&self, event: CalendarEvent) -> Result<(), ToolError>;
}

/// Process-local calendar.
#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    events: RwLock<Vec<CalendarEvent>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        match self.events.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Calendar for InMemoryCalendar {
    async fn events_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>, ToolError> {
        let events = self
            .events
            .read()
            .map_err(|_| ToolError::State("calendar lock poisoned".to_string()))?;
        Ok(events
            .iter()
            .filter(|e| e.overlaps(start, end))
            .cloned()
            .collect())
    }

    async fn create_event(&self, event: CalendarEvent) -> Result<(), ToolError> {
        self.events
            .write()
            .map_err(|_| ToolError::State("calendar lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

/// Whether a calendar entry belongs to `yacht` (case-insensitive match on
/// the summary).
pub fn is_event_for_yacht(summary: &str, yacht: &str) -> bool {
    let yacht = yacht.trim().to_lowercase();
    !yacht.is_empty() && summary.to_lowercase().contains(&yacht)
}

/// Parses the date formats callers and the model produce: ISO
/// `YYYY-MM-DD`, or day-first `DD-MM-YYYY` with `-`, `.` or `/` separators.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let cleaned: String = input
        .trim()
        .chars()
        .map(|c| if c == '.' || c == '/' { '-' } else { c })
        .collect();
    NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&cleaned, "%d-%m-%Y"))
        .ok()
}

pub fn parse_time(input: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M").ok()
}

/// Longest charter that fits in the working day.
pub const MAX_DURATION_HOURS: f64 = (DAY_END_HOUR - DAY_START_HOUR) as f64;

/// Converts fractional hours to a duration. Values that are not positive or
/// exceed [`MAX_DURATION_HOURS`] are rejected.
pub fn hours(duration_hours: f64) -> Option<Duration> {
    if !duration_hours.is_finite()
        || duration_hours <= 0.0
        || duration_hours > MAX_DURATION_HOURS
    {
        return None;
    }
    Duration::try_minutes((duration_hours * 60.0).round() as i64)
}

/// Subtracts `busy` intervals from `[day_start, day_end)` and keeps the gaps
/// that are at least `min_len` long.
pub fn free_slots(
    busy: &[(NaiveDateTime, NaiveDateTime)],
    day_start: NaiveDateTime,
    day_end: NaiveDateTime,
    min_len: Duration,
) -> Vec<FreeSlot> {
    let mut busy: Vec<_> = busy.to_vec();
    busy.sort_by_key(|(start, _)| *start);

    let mut slots = Vec::new();
    let mut cursor = day_start;
    for (start, end) in busy {
        if start > cursor && start - cursor >= min_len {
            slots.push(FreeSlot {
                start: cursor,
                end: start.min(day_end),
            });
        }
        if end > cursor {
            cursor = end;
        }
    }
    if cursor < day_end && day_end - cursor >= min_len {
        slots.push(FreeSlot {
            start: cursor,
            end: day_end,
        });
    }
    slots.retain(|s| s.end - s.start >= min_len);
    slots
}

fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_hms_opt(DAY_START_HOUR, 0, 0).unwrap_or_default();
    let end = date.and_hms_opt(DAY_END_HOUR, 0, 0).unwrap_or_default();
    (start, end)
}

/// Free windows of at least `duration` for `yacht` on `date`.
pub async fn check_availability(
    calendar: &dyn Calendar,
    date: NaiveDate,
    duration: Duration,
    yacht: &str,
) -> Result<Vec<FreeSlot>, ToolError> {
    let (day_start, day_end) = day_bounds(date);
    let busy: Vec<_> = calendar
        .events_between(day_start, day_end)
        .await?
        .into_iter()
        .filter(|e| is_event_for_yacht(&e.summary, yacht))
        .map(|e| (e.start, e.end))
        .collect();
    Ok(free_slots(&busy, day_start, day_end, duration))
}

/// Whether `[start, end)` is still free for `yacht`.
pub async fn is_slot_available(
    calendar: &dyn Calendar,
    start: NaiveDateTime,
    end: NaiveDateTime,
    yacht: &str,
) -> Result<bool, ToolError> {
    let conflicts = calendar
        .events_between(start, end)
        .await?
        .into_iter()
        .filter(|e| is_event_for_yacht(&e.summary, yacht))
        .count();
    Ok(conflicts == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 7, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn empty_day_is_one_slot() {
        let slots = free_slots(&[], at(8, 0), at(20, 0), Duration::hours(2));
        assert_eq!(
            slots,
            vec![FreeSlot {
                start: at(8, 0),
                end: at(20, 0)
            }]
        );
    }

    #[test]
    fn busy_blocks_split_the_day_and_short_gaps_drop() {
        let busy = vec![(at(13, 0), at(15, 0)), (at(9, 0), at(12, 0))];
        let slots = free_slots(&busy, at(8, 0), at(20, 0), Duration::hours(2));
        // 08:00-09:00 is too short, 12:00-13:00 too short.
        assert_eq!(
            slots,
            vec![FreeSlot {
                start: at(15, 0),
                end: at(20, 0)
            }]
        );
    }

    #[test]
    fn overlapping_busy_blocks_do_not_rewind_cursor() {
        let busy = vec![(at(8, 0), at(14, 0)), (at(10, 0), at(11, 0))];
        let slots = free_slots(&busy, at(8, 0), at(20, 0), Duration::hours(1));
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start, at(14, 0));
    }

    #[test]
    fn hours_reject_values_outside_the_working_day() {
        assert_eq!(hours(2.5), Some(Duration::minutes(150)));
        assert_eq!(hours(12.0), Some(Duration::hours(12)));
        assert_eq!(hours(12.5), None);
        assert_eq!(hours(1e300), None);
        assert_eq!(hours(f64::NAN), None);
        assert_eq!(hours(0.0), None);
    }

    #[test]
    fn dates_parse_in_both_orders() {
        let expected = NaiveDate::from_ymd_opt(2026, 7, 14);
        assert_eq!(parse_date("2026-07-14"), expected);
        assert_eq!(parse_date("14.07.2026"), expected);
        assert_eq!(parse_date("14/07/2026"), expected);
        assert_eq!(parse_date("next tuesday"), None);
    }

    #[test]
    fn yacht_match_is_case_insensitive() {
        assert!(is_event_for_yacht("Bagira - Dana (#1001)", "bagira"));
        assert!(!is_event_for_yacht("King - Avi", "Bagira"));
        assert!(!is_event_for_yacht("anything", "  "));
    }

    #[test]
    fn display_text_uses_hebrew_range() {
        let slot = FreeSlot {
            start: at(8, 0),
            end: at(10, 30),
        };
        assert_eq!(slot.display_text(), "בין 08:00 ל-10:30");
    }

    #[tokio::test]
    async fn availability_ignores_other_yachts() {
        let calendar = InMemoryCalendar::with_events(vec![CalendarEvent {
            summary: "King - Avi".to_string(),
            description: String::new(),
            start: at(8, 0),
            end: at(20, 0),
        }]);
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let slots = check_availability(&calendar, date, Duration::hours(3), "Bagira")
            .await
            .unwrap();
        assert_eq!(slots.len(), 1);
        assert!(
            !is_slot_available(&calendar, at(10, 0), at(12, 0), "King")
                .await
                .unwrap()
        );
    }
}
