//! Calendar operations over the local store, mirrored to the remote
//! calendar when one is attached. The local record always wins: remote
//! failures are logged and never block the local change.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use mailbox::{CalendarClient, RemoteEventInput};
use mailroom_core::error::{MailroomError, Result};
use mailroom_core::types::{BusyInterval, CalendarEvent, EventPatch, NewCalendarEvent, TimeSlot};
use std::sync::Arc;
use storage::SqliteStorage;
use tracing::{info, warn};

const WORKDAY_START_HOUR: u32 = 9;
const WORKDAY_END_HOUR: u32 = 17;
const MAX_SLOTS: usize = 10;
const MAX_DAYS_AHEAD: i64 = 366;

fn remote_input(event: &CalendarEvent) -> RemoteEventInput {
    RemoteEventInput {
        title: event.title.clone(),
        description: event.description.clone(),
        location: event.location.clone(),
        start: event.start_at,
        end: event.end_at,
        timezone: event.timezone.clone(),
        attendees: event.attendees.clone(),
    }
}

fn at_hour(day: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&day.date_naive().and_time(time))
}

/// Candidate slots of `duration` on weekdays between 09:00 and 17:00, on
/// the hour, from the day of `now` through `days_ahead` days. Slots that
/// start in the past or overlap a busy interval are dropped.
pub fn scan_free_slots(
    busy: &[BusyInterval],
    duration: Duration,
    days_ahead: i64,
    now: DateTime<Utc>,
) -> Vec<TimeSlot> {
    let mut slots = Vec::new();
    if duration <= Duration::zero() {
        return slots;
    }

    for offset in 0..days_ahead.max(1) {
        let Some(day) = Duration::try_days(offset).and_then(|d| now.checked_add_signed(d)) else {
            break;
        };
        if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }

        let day_end = at_hour(day, WORKDAY_END_HOUR);
        let mut start = at_hour(day, WORKDAY_START_HOUR);
        while let Some(end) = start.checked_add_signed(duration).filter(|end| *end <= day_end) {
            let slot = TimeSlot { start, end };
            if slot.start >= now && !busy.iter().any(|b| slot.overlaps(b)) {
                slots.push(slot);
                if slots.len() == MAX_SLOTS {
                    return slots;
                }
            }
            start += Duration::hours(1);
        }
    }
    slots
}

pub struct CalendarService {
    store: Arc<SqliteStorage>,
    calendar: Option<Arc<dyn CalendarClient>>,
    timeout: std::time::Duration,
}

impl CalendarService {
    pub fn new(
        store: Arc<SqliteStorage>,
        calendar: Option<Arc<dyn CalendarClient>>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            calendar,
            timeout,
        }
    }

    /// Stores the event, then tries to create it remotely and attach the
    /// remote id.
    pub async fn create_event(&self, event: &NewCalendarEvent) -> Result<CalendarEvent> {
        if event.end_at < event.start_at {
            return Err(MailroomError::Validation("Event ends before it starts".into()));
        }
        let mut stored = self.store.create_event(event).await?;

        let Some(calendar) = &self.calendar else {
            return Ok(stored);
        };
        if stored.external_id.is_some() {
            return Ok(stored);
        }

        match tokio::time::timeout(self.timeout, calendar.create_event(&remote_input(&stored))).await {
            Ok(Ok(remote)) => {
                self.store.set_event_external_id(stored.id, &remote.external_id).await?;
                info!("Event {} created remotely as {}", stored.id, remote.external_id);
                stored.external_id = Some(remote.external_id);
            }
            Ok(Err(e)) => warn!("Remote create for event {} failed: {}", stored.id, e),
            Err(_) => warn!("Remote create for event {} timed out", stored.id),
        }
        Ok(stored)
    }

    pub async fn get_event(&self, id: i64) -> Result<CalendarEvent> {
        self.store.get_event(id).await
    }

    pub async fn list_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<CalendarEvent>> {
        self.store.list_events(from, to).await
    }

    pub async fn update_event(&self, id: i64, patch: &EventPatch) -> Result<CalendarEvent> {
        let updated = self.store.update_event(id, patch).await?;

        if let (Some(calendar), Some(external_id)) = (&self.calendar, &updated.external_id) {
            match tokio::time::timeout(self.timeout, calendar.update_event(external_id, &remote_input(&updated))).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Remote update for event {} failed: {}", id, e),
                Err(_) => warn!("Remote update for event {} timed out", id),
            }
        }
        Ok(updated)
    }

    pub async fn delete_event(&self, id: i64) -> Result<()> {
        let event = self.store.get_event(id).await?;

        if let (Some(calendar), Some(external_id)) = (&self.calendar, &event.external_id) {
            match tokio::time::timeout(self.timeout, calendar.delete_event(external_id)).await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => info!("Remote event {} was already gone", external_id),
                Ok(Err(e)) => warn!("Remote delete for event {} failed: {}", id, e),
                Err(_) => warn!("Remote delete for event {} timed out", id),
            }
        }

        if !self.store.delete_event(id).await? {
            return Err(MailroomError::not_found("calendar event", id));
        }
        Ok(())
    }

    /// Busy time from the remote calendar, or from local events when there
    /// is no calendar or it cannot answer.
    async fn busy_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<BusyInterval>> {
        if let Some(calendar) = &self.calendar {
            match tokio::time::timeout(self.timeout, calendar.query_free_busy(from, to)).await {
                Ok(Ok(busy)) => return Ok(busy),
                Ok(Err(e)) => warn!("Free/busy query failed, using local events: {}", e),
                Err(_) => warn!("Free/busy query timed out, using local events"),
            }
        }
        self.store.busy_intervals(from, to).await
    }

    pub async fn find_free_slots(
        &self,
        duration_minutes: i64,
        days_ahead: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimeSlot>> {
        if duration_minutes <= 0 {
            return Err(MailroomError::Validation("Duration must be positive".into()));
        }
        if !(1..=MAX_DAYS_AHEAD).contains(&days_ahead) {
            return Err(MailroomError::Validation(format!(
                "Look-ahead must be between 1 and {} days, got {}",
                MAX_DAYS_AHEAD, days_ahead
            )));
        }
        let duration = Duration::try_minutes(duration_minutes)
            .ok_or_else(|| MailroomError::Validation(format!("Duration of {} minutes is out of range", duration_minutes)))?;
        let window_end = Duration::try_days(days_ahead)
            .and_then(|d| now.checked_add_signed(d))
            .map(|day| at_hour(day, 0))
            .ok_or_else(|| MailroomError::Validation("Look-ahead window is out of range".into()))?;

        let busy = self.busy_between(now, window_end).await?;
        Ok(scan_free_slots(&busy, duration, days_ahead, now))
    }
}
