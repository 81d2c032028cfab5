use chrono::{DateTime, Utc};
use mailroom_core::error::{MailroomError, Result};
use mailroom_core::types::{BusyInterval, CalendarEvent, EventPatch, EventStatus, NewCalendarEvent};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{enum_column, is_unique_violation, json_column, storage_err, to_json, SqliteStorage};

fn event_from_row(row: &SqliteRow) -> Result<CalendarEvent> {
    Ok(CalendarEvent {
        id: row.get("id"),
        external_id: row.get("external_id"),
        title: row.get("title"),
        description: row.get("description"),
        location: row.get("location"),
        start_at: row.get("start_at"),
        end_at: row.get("end_at"),
        timezone: row.get("timezone"),
        attendees: json_column(row, "attendees")?,
        organizer: row.get("organizer"),
        status: enum_column(row, "status")?,
        source_message_id: row.get("source_message_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

async fn fetch(conn: &mut SqliteConnection, id: i64) -> Result<Option<CalendarEvent>> {
    let row = sqlx::query("SELECT * FROM calendar_events WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage_err)?;

    row.as_ref().map(event_from_row).transpose()
}

/// Raw insert; surfaces unique violations on `external_id` as storage errors.
pub async fn insert(conn: &mut SqliteConnection, event: &NewCalendarEvent) -> Result<CalendarEvent> {
    let id = insert_row(conn, event).await.map_err(storage_err)?;
    fetch(conn, id)
        .await?
        .ok_or_else(|| MailroomError::Internal(format!("Inserted event {} vanished", id)))
}

async fn insert_row(
    conn: &mut SqliteConnection,
    event: &NewCalendarEvent,
) -> std::result::Result<i64, sqlx::Error> {
    let now = Utc::now();
    let attendees = serde_json::to_string(&event.attendees).unwrap_or_else(|_| "[]".into());
    let done = sqlx::query(
        "INSERT INTO calendar_events (external_id, title, description, location, start_at, end_at, \
         timezone, attendees, organizer, status, source_message_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.external_id)
    .bind(&event.title)
    .bind(&event.description)
    .bind(&event.location)
    .bind(event.start_at)
    .bind(event.end_at)
    .bind(&event.timezone)
    .bind(attendees)
    .bind(&event.organizer)
    .bind(event.status.to_string())
    .bind(event.source_message_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(done.last_insert_rowid())
}

impl SqliteStorage {
    pub async fn create_event(&self, event: &NewCalendarEvent) -> Result<CalendarEvent> {
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;
        insert(&mut conn, event).await
    }

    /// Insert for remote reconciliation: `None` if the external id is taken.
    pub async fn try_insert_event(&self, event: &NewCalendarEvent) -> Result<Option<i64>> {
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;
        match insert_row(&mut conn, event).await {
            Ok(id) => Ok(Some(id)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    pub async fn event_id_by_external(&self, external_id: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT id FROM calendar_events WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.map(|r| r.get::<i64, _>("id")))
    }

    pub async fn get_event(&self, id: i64) -> Result<CalendarEvent> {
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;
        fetch(&mut conn, id)
            .await?
            .ok_or_else(|| MailroomError::not_found("calendar event", id))
    }

    /// Events overlapping `[from, to)`, earliest first.
    pub async fn list_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM calendar_events WHERE start_at < ? AND end_at > ? ORDER BY start_at, id",
        )
        .bind(to)
        .bind(from)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(event_from_row).collect()
    }

    /// Non-cancelled events overlapping the window, as busy intervals.
    pub async fn busy_intervals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>> {
        Ok(self
            .list_events(from, to)
            .await?
            .into_iter()
            .filter(|e| e.status != EventStatus::Cancelled)
            .map(|e| BusyInterval {
                start: e.start_at,
                end: e.end_at,
            })
            .collect())
    }

    pub async fn set_event_external_id(&self, id: i64, external_id: &str) -> Result<()> {
        sqlx::query("UPDATE calendar_events SET external_id = ?, updated_at = ? WHERE id = ?")
            .bind(external_id)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn update_event(&self, id: i64, patch: &EventPatch) -> Result<CalendarEvent> {
        let mut event = self.get_event(id).await?;
        if let Some(title) = &patch.title {
            event.title = title.clone();
        }
        if let Some(description) = &patch.description {
            event.description = description.clone();
        }
        if let Some(location) = &patch.location {
            event.location = Some(location.clone());
        }
        if let Some(start) = patch.start_at {
            event.start_at = start;
        }
        if let Some(end) = patch.end_at {
            event.end_at = end;
        }
        if let Some(attendees) = &patch.attendees {
            event.attendees = attendees.clone();
        }
        if let Some(status) = patch.status {
            event.status = status;
        }

        if event.end_at < event.start_at {
            return Err(MailroomError::Validation(
                "Event end must not be before its start".into(),
            ));
        }

        sqlx::query(
            "UPDATE calendar_events SET title = ?, description = ?, location = ?, start_at = ?, \
             end_at = ?, attendees = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.start_at)
        .bind(event.end_at)
        .bind(to_json(&event.attendees)?)
        .bind(event.status.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        self.get_event(id).await
    }

    pub async fn delete_event(&self, id: i64) -> Result<bool> {
        let done = sqlx::query("DELETE FROM calendar_events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(done.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, 0, 0).unwrap()
    }

    fn new_event(external_id: Option<&str>, start: u32, end: u32) -> NewCalendarEvent {
        NewCalendarEvent {
            external_id: external_id.map(String::from),
            title: "Design review".into(),
            description: String::new(),
            location: None,
            start_at: at(start),
            end_at: at(end),
            timezone: "UTC".into(),
            attendees: vec!["ana@example.com".into()],
            organizer: None,
            status: EventStatus::Confirmed,
            source_message_id: None,
        }
    }

    #[tokio::test]
    async fn local_events_may_share_a_missing_external_id() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.create_event(&new_event(None, 9, 10)).await.unwrap();
        store.create_event(&new_event(None, 11, 12)).await.unwrap();

        assert!(store.try_insert_event(&new_event(Some("g-1"), 13, 14)).await.unwrap().is_some());
        assert!(store.try_insert_event(&new_event(Some("g-1"), 13, 14)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn window_listing_uses_overlap() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.create_event(&new_event(None, 9, 10)).await.unwrap();
        store.create_event(&new_event(None, 10, 11)).await.unwrap();
        let cancelled = store.create_event(&new_event(None, 12, 13)).await.unwrap();
        store
            .update_event(
                cancelled.id,
                &EventPatch {
                    status: Some(EventStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let listed = store.list_events(at(10), at(14)).await.unwrap();
        assert_eq!(listed.len(), 2);

        let busy = store.busy_intervals(at(0), at(0) + Duration::days(1)).await.unwrap();
        assert_eq!(busy.len(), 2);
        assert_eq!(busy[0].start, at(9));
    }

    #[tokio::test]
    async fn patch_rejects_inverted_range() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let event = store.create_event(&new_event(None, 9, 10)).await.unwrap();

        let err = store
            .update_event(
                event.id,
                &EventPatch {
                    end_at: Some(at(8)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::Validation(_)));

        let moved = store
            .update_event(
                event.id,
                &EventPatch {
                    title: Some("Moved review".into()),
                    start_at: Some(at(15)),
                    end_at: Some(at(16)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.title, "Moved review");
        assert_eq!(moved.start_at, at(15));
    }

    #[tokio::test]
    async fn external_id_attaches_after_creation() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let event = store.create_event(&new_event(None, 9, 10)).await.unwrap();
        store.set_event_external_id(event.id, "g-42").await.unwrap();

        assert_eq!(store.event_id_by_external("g-42").await.unwrap(), Some(event.id));
        assert!(store.delete_event(event.id).await.unwrap());
        assert!(matches!(
            store.get_event(event.id).await.unwrap_err(),
            MailroomError::NotFound { .. }
        ));
    }
}
