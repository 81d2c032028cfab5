use chrono::{DateTime, Duration, Utc};
use mailroom_core::error::{MailroomError, Result};
use mailroom_core::types::{NewReminder, Reminder, ReminderFilter, ReminderPatch};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{enum_column, storage_err, SqliteStorage};

fn reminder_from_row(row: &SqliteRow) -> Result<Reminder> {
    Ok(Reminder {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        due_at: row.get("due_at"),
        notify_at: row.get("notify_at"),
        kind: enum_column(row, "kind")?,
        priority: enum_column(row, "priority")?,
        is_completed: row.get("is_completed"),
        completed_at: row.get("completed_at"),
        is_snoozed: row.get("is_snoozed"),
        snoozed_until: row.get("snoozed_until"),
        message_id: row.get("message_id"),
        event_id: row.get("event_id"),
        calendar_event_ref: row.get("calendar_event_ref"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

async fn fetch(conn: &mut SqliteConnection, id: i64) -> Result<Option<Reminder>> {
    let row = sqlx::query("SELECT * FROM reminders WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage_err)?;

    row.as_ref().map(reminder_from_row).transpose()
}

pub async fn insert(conn: &mut SqliteConnection, reminder: &NewReminder) -> Result<Reminder> {
    let now = Utc::now();
    let done = sqlx::query(
        "INSERT INTO reminders (title, description, due_at, notify_at, kind, priority, \
         message_id, event_id, calendar_event_ref, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&reminder.title)
    .bind(&reminder.description)
    .bind(reminder.due_at)
    .bind(reminder.notify_at)
    .bind(reminder.kind.to_string())
    .bind(reminder.priority.to_string())
    .bind(reminder.message_id)
    .bind(reminder.event_id)
    .bind(&reminder.calendar_event_ref)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(storage_err)?;

    let id = done.last_insert_rowid();
    fetch(conn, id)
        .await?
        .ok_or_else(|| MailroomError::Internal(format!("Inserted reminder {} vanished", id)))
}

impl SqliteStorage {
    pub async fn create_reminder(&self, reminder: &NewReminder) -> Result<Reminder> {
        if reminder.title.trim().is_empty() {
            return Err(MailroomError::Validation("Reminder title is required".into()));
        }
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;
        insert(&mut conn, reminder).await
    }

    pub async fn get_reminder(&self, id: i64) -> Result<Reminder> {
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;
        fetch(&mut conn, id)
            .await?
            .ok_or_else(|| MailroomError::not_found("reminder", id))
    }

    /// Ordered by due time.
    pub async fn list_reminders(&self, filter: &ReminderFilter) -> Result<Vec<Reminder>> {
        let mut query = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM reminders WHERE 1 = 1");
        if let Some(completed) = filter.completed {
            query.push(" AND is_completed = ").push_bind(completed);
        }
        if let Some(priority) = filter.priority {
            query.push(" AND priority = ").push_bind(priority.to_string());
        }
        if let Some(kind) = filter.kind {
            query.push(" AND kind = ").push_bind(kind.to_string());
        }
        query
            .push(" ORDER BY due_at, id LIMIT ")
            .push_bind(filter.limit.unwrap_or(100))
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0));

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.iter().map(reminder_from_row).collect()
    }

    pub async fn reminders_for_message(&self, message_id: i64) -> Result<Vec<Reminder>> {
        let rows = sqlx::query("SELECT * FROM reminders WHERE message_id = ? ORDER BY due_at, id")
            .bind(message_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.iter().map(reminder_from_row).collect()
    }

    /// Applies the fields present in `patch`. Completing through a patch
    /// stamps `completed_at`; reopening clears it.
    pub async fn update_reminder(&self, id: i64, patch: &ReminderPatch) -> Result<Reminder> {
        let mut reminder = self.get_reminder(id).await?;
        if let Some(title) = &patch.title {
            reminder.title = title.clone();
        }
        if let Some(description) = &patch.description {
            reminder.description = description.clone();
        }
        if let Some(due) = patch.due_at {
            let lead = reminder.due_at - reminder.notify_at;
            reminder.notify_at = due.checked_sub_signed(lead).unwrap_or(due);
            reminder.due_at = due;
        }
        if let Some(priority) = patch.priority {
            reminder.priority = priority;
        }
        if let Some(done) = patch.is_completed {
            reminder.completed_at = match (done, reminder.is_completed) {
                (true, false) => Some(Utc::now()),
                (true, true) => reminder.completed_at,
                (false, _) => None,
            };
            reminder.is_completed = done;
        }

        sqlx::query(
            "UPDATE reminders SET title = ?, description = ?, due_at = ?, notify_at = ?, priority = ?, \
             is_completed = ?, completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&reminder.title)
        .bind(&reminder.description)
        .bind(reminder.due_at)
        .bind(reminder.notify_at)
        .bind(reminder.priority.to_string())
        .bind(reminder.is_completed)
        .bind(reminder.completed_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        self.get_reminder(id).await
    }

    pub async fn complete_reminder(&self, id: i64) -> Result<Reminder> {
        let now = Utc::now();
        let done = sqlx::query(
            "UPDATE reminders SET is_completed = 1, completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if done.rows_affected() == 0 {
            return Err(MailroomError::not_found("reminder", id));
        }
        self.get_reminder(id).await
    }

    pub async fn snooze_reminder(&self, id: i64, until: DateTime<Utc>) -> Result<Reminder> {
        let done = sqlx::query(
            "UPDATE reminders SET is_snoozed = 1, snoozed_until = ?, updated_at = ? WHERE id = ?",
        )
        .bind(until)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if done.rows_affected() == 0 {
            return Err(MailroomError::not_found("reminder", id));
        }
        self.get_reminder(id).await
    }

    pub async fn delete_reminder(&self, id: i64) -> Result<bool> {
        let done = sqlx::query("DELETE FROM reminders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(done.rows_affected() > 0)
    }

    /// Open, unsnoozed reminders already past due.
    pub async fn overdue_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let rows = sqlx::query(
            "SELECT * FROM reminders WHERE due_at < ? AND is_completed = 0 AND is_snoozed = 0 \
             ORDER BY due_at, id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(reminder_from_row).collect()
    }

    /// Open, unsnoozed reminders due within the next `hours`.
    pub async fn upcoming_reminders(&self, now: DateTime<Utc>, hours: i64) -> Result<Vec<Reminder>> {
        let rows = sqlx::query(
            "SELECT * FROM reminders WHERE due_at >= ? AND due_at <= ? AND is_completed = 0 \
             AND is_snoozed = 0 ORDER BY due_at, id",
        )
        .bind(now)
        .bind(now + Duration::hours(hours))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(reminder_from_row).collect()
    }
}
