//! Insert-only merge of fetched provider items into the local store, keyed
//! by external id.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use mailroom_core::error::{MailroomError, Result};
use mailroom_core::types::{EventStatus, FetchedEvent, FetchedMessage, NewCalendarEvent, NewMessage};
use serde::Serialize;
use storage::sqlite::content_hash;
use storage::SqliteStorage;
use tracing::{debug, warn};

const UNREAD_LABEL: &str = "UNREAD";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub inserted: usize,
    pub already_present: usize,
    pub failed: usize,
    pub inserted_ids: Vec<i64>,
}

enum ItemOutcome {
    Inserted(i64),
    Present,
}

impl SyncReport {
    fn record(&mut self, external_id: &str, outcome: Result<ItemOutcome>) {
        self.attempted += 1;
        match outcome {
            Ok(ItemOutcome::Inserted(id)) => {
                self.inserted += 1;
                self.inserted_ids.push(id);
            }
            Ok(ItemOutcome::Present) => self.already_present += 1,
            Err(e) => {
                warn!("Skipping {} during sync: {}", external_id, e);
                self.failed += 1;
            }
        }
    }
}

/// Provider timestamps arrive as RFC 3339 (with `Z`) or as an RFC 2822
/// `Date` header.
pub fn parse_provider_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| MailroomError::MalformedPayload(format!("Unparseable timestamp '{}'", raw)))
}

/// Event bounds are either timed (RFC 3339) or all-day (`YYYY-MM-DD`).
fn parse_event_bound(raw: &str) -> Result<DateTime<Utc>> {
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(date) => Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))),
        Err(_) => parse_provider_timestamp(raw),
    }
}

pub fn to_new_message(fetched: &FetchedMessage) -> Result<NewMessage> {
    if fetched.external_id.trim().is_empty() {
        return Err(MailroomError::MalformedPayload("Message without an id".into()));
    }

    Ok(NewMessage {
        external_id: fetched.external_id.clone(),
        thread_id: fetched.thread_id.clone(),
        sender: fetched.sender.clone(),
        recipient: fetched.recipient.clone(),
        subject: fetched.subject.clone(),
        received_at: parse_provider_timestamp(&fetched.timestamp)?,
        body_text: fetched.body_text.clone(),
        body_html: fetched.body_html.clone(),
        has_attachment: fetched.has_attachment,
        labels: fetched.labels.clone(),
        hash: content_hash(&fetched.subject, &fetched.body_text),
        is_read: !fetched.labels.iter().any(|l| l == UNREAD_LABEL),
    })
}

/// Missing end means a one-hour event; unknown statuses read as confirmed.
pub fn to_new_event(fetched: &FetchedEvent) -> Result<NewCalendarEvent> {
    if fetched.external_id.trim().is_empty() {
        return Err(MailroomError::MalformedPayload("Event without an id".into()));
    }

    let start_at = parse_event_bound(&fetched.start)?;
    let end_at = if fetched.end.trim().is_empty() {
        start_at + Duration::hours(1)
    } else {
        parse_event_bound(&fetched.end)?
    };

    Ok(NewCalendarEvent {
        external_id: Some(fetched.external_id.clone()),
        title: fetched.title.clone(),
        description: fetched.description.clone(),
        location: fetched.location.clone(),
        start_at,
        end_at,
        timezone: fetched.timezone.clone().unwrap_or_else(|| "UTC".to_string()),
        attendees: fetched.attendees.clone(),
        organizer: fetched.organizer.clone(),
        status: fetched
            .status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(EventStatus::Confirmed),
        source_message_id: None,
    })
}

async fn reconcile_message(store: &SqliteStorage, fetched: &FetchedMessage) -> Result<ItemOutcome> {
    if store.message_id_by_external(&fetched.external_id).await?.is_some() {
        return Ok(ItemOutcome::Present);
    }
    let message = to_new_message(fetched)?;
    Ok(match store.try_insert_message(&message).await? {
        Some(id) => ItemOutcome::Inserted(id),
        // Lost a race with a concurrent sync
        None => ItemOutcome::Present,
    })
}

async fn reconcile_event(store: &SqliteStorage, fetched: &FetchedEvent) -> Result<ItemOutcome> {
    if store.event_id_by_external(&fetched.external_id).await?.is_some() {
        return Ok(ItemOutcome::Present);
    }
    let event = to_new_event(fetched)?;
    Ok(match store.try_insert_event(&event).await? {
        Some(id) => ItemOutcome::Inserted(id),
        None => ItemOutcome::Present,
    })
}

pub async fn reconcile_messages(store: &SqliteStorage, batch: &[FetchedMessage]) -> SyncReport {
    let mut report = SyncReport::default();
    for fetched in batch {
        let outcome = reconcile_message(store, fetched).await;
        report.record(&fetched.external_id, outcome);
    }
    debug!("Message reconciliation: {:?}", report);
    report
}

pub async fn reconcile_events(store: &SqliteStorage, batch: &[FetchedEvent]) -> SyncReport {
    let mut report = SyncReport::default();
    for fetched in batch {
        let outcome = reconcile_event(store, fetched).await;
        report.record(&fetched.external_id, outcome);
    }
    debug!("Event reconciliation: {:?}", report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(id: &str, timestamp: &str) -> FetchedMessage {
        FetchedMessage {
            external_id: id.into(),
            thread_id: None,
            sender: "ana@example.com".into(),
            recipient: "me@example.com".into(),
            subject: format!("Subject {}", id),
            body_text: "Body".into(),
            body_html: None,
            timestamp: timestamp.into(),
            has_attachment: false,
            labels: vec!["INBOX".into()],
        }
    }

    #[test]
    fn accepts_rfc3339_and_rfc2822() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        assert_eq!(parse_provider_timestamp("2026-10-19T09:00:00Z").unwrap(), expected);
        assert_eq!(parse_provider_timestamp("Mon, 19 Oct 2026 11:00:00 +0200").unwrap(), expected);
        assert!(parse_provider_timestamp("yesterday-ish").is_err());
    }

    #[test]
    fn read_state_follows_unread_label() {
        let mut item = fetched("m1", "2026-10-19T09:00:00Z");
        assert!(to_new_message(&item).unwrap().is_read);

        item.labels.push("UNREAD".into());
        assert!(!to_new_message(&item).unwrap().is_read);
    }

    #[test]
    fn all_day_events_and_defaults() {
        let event = FetchedEvent {
            external_id: "ev1".into(),
            title: "Offsite".into(),
            description: String::new(),
            location: None,
            start: "2026-10-20".into(),
            end: String::new(),
            timezone: None,
            attendees: vec![],
            organizer: None,
            status: Some("mystery".into()),
        };
        let new = to_new_event(&event).unwrap();
        assert_eq!(new.start_at, Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap());
        assert_eq!(new.end_at - new.start_at, Duration::hours(1));
        assert_eq!(new.status, EventStatus::Confirmed);
        assert_eq!(new.timezone, "UTC");
    }

    #[tokio::test]
    async fn second_run_inserts_nothing() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let batch = vec![
            fetched("a", "2026-10-19T09:00:00Z"),
            fetched("b", "2026-10-19T10:00:00Z"),
        ];

        let first = reconcile_messages(&store, &batch).await;
        assert_eq!(first.inserted, 2);
        assert_eq!(first.inserted_ids.len(), 2);

        let second = reconcile_messages(&store, &batch).await;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.already_present, 2);
        assert_eq!(store.count_messages().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn bad_item_does_not_abort_batch() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let batch = vec![
            fetched("a", "not a date"),
            fetched("b", "2026-10-19T10:00:00Z"),
        ];

        let report = reconcile_messages(&store, &batch).await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.inserted, 1);
        assert!(store.message_id_by_external("b").await.unwrap().is_some());
    }
}
