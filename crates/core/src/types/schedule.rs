use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::Priority;

/// Notification lead time, in minutes, for reminders created directly by a caller.
pub const DEFAULT_NOTIFY_LEAD_MINUTES: i64 = 60;

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ReminderKind {
    #[default]
    Task,
    Meeting,
    Followup,
    Deadline,
    Call,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub due_at: DateTime<Utc>,
    pub notify_at: DateTime<Utc>,
    pub kind: ReminderKind,
    pub priority: Priority,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_snoozed: bool,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub message_id: Option<i64>,
    pub event_id: Option<i64>,
    pub calendar_event_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReminder {
    pub title: String,
    pub description: String,
    pub due_at: DateTime<Utc>,
    pub notify_at: DateTime<Utc>,
    pub kind: ReminderKind,
    pub priority: Priority,
    pub message_id: Option<i64>,
    pub event_id: Option<i64>,
    pub calendar_event_ref: Option<String>,
}

impl NewReminder {
    /// A medium-priority task notifying [`DEFAULT_NOTIFY_LEAD_MINUTES`] before it is due.
    pub fn new(title: impl Into<String>, due_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            due_at,
            notify_at: due_at - Duration::minutes(DEFAULT_NOTIFY_LEAD_MINUTES),
            kind: ReminderKind::Task,
            priority: Priority::Medium,
            message_id: None,
            event_id: None,
            calendar_event_ref: None,
        }
    }

    pub fn notify_before(mut self, lead: Duration) -> Self {
        self.notify_at = self.due_at - lead;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReminderPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub is_completed: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ReminderFilter {
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub kind: Option<ReminderKind>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// The local record is authoritative; `external_id` is attached once the
/// remote calendar accepts the event and may stay `None` forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: i64,
    pub external_id: Option<String>,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub timezone: String,
    pub attendees: Vec<String>,
    pub organizer: Option<String>,
    pub status: EventStatus,
    pub source_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCalendarEvent {
    pub external_id: Option<String>,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub timezone: String,
    pub attendees: Vec<String>,
    pub organizer: Option<String>,
    pub status: EventStatus,
    pub source_message_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub attendees: Option<Vec<String>>,
    pub status: Option<EventStatus>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.start_at.is_none()
            && self.end_at.is_none()
            && self.attendees.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    /// Open-interval overlap: touching endpoints do not conflict.
    pub fn overlaps(&self, busy: &BusyInterval) -> bool {
        self.start < busy.end && self.end > busy.start
    }
}
