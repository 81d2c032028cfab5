use chrono::Utc;
use mailroom_core::error::{MailroomError, Result};
use mailroom_core::types::{Message, MessageAnalysis, MessageFilter, NewMessage};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{
    is_unique_violation, json_column, opt_enum_column, storage_err, to_json, SqliteStorage,
};

/// Hex SHA-256 over subject and body.
pub fn content_hash(subject: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    hasher.update(b"\n");
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    Ok(Message {
        id: row.get("id"),
        external_id: row.get("external_id"),
        thread_id: row.get("thread_id"),
        sender: row.get("sender"),
        recipient: row.get("recipient"),
        subject: row.get("subject"),
        received_at: row.get("received_at"),
        body_text: row.get("body_text"),
        body_html: row.get("body_html"),
        has_attachment: row.get("has_attachment"),
        labels: json_column(row, "labels")?,
        hash: row.get("hash"),
        is_read: row.get("is_read"),
        priority: opt_enum_column(row, "priority")?,
        category: opt_enum_column(row, "category")?,
        sentiment: opt_enum_column(row, "sentiment")?,
        urgency_score: row.get("urgency_score"),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Inserts `message` unless its external id is already stored.
/// Returns the new row id, or `None` when the unique constraint fired.
pub async fn try_insert(conn: &mut SqliteConnection, message: &NewMessage) -> Result<Option<i64>> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO messages (external_id, thread_id, sender, recipient, subject, received_at, \
         body_text, body_html, has_attachment, labels, hash, is_read, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&message.external_id)
    .bind(&message.thread_id)
    .bind(&message.sender)
    .bind(&message.recipient)
    .bind(&message.subject)
    .bind(message.received_at)
    .bind(&message.body_text)
    .bind(&message.body_html)
    .bind(message.has_attachment)
    .bind(to_json(&message.labels)?)
    .bind(&message.hash)
    .bind(message.is_read)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(done) => Ok(Some(done.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(storage_err(e)),
    }
}

pub async fn fetch(conn: &mut SqliteConnection, id: i64) -> Result<Option<Message>> {
    let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage_err)?;

    row.as_ref().map(message_from_row).transpose()
}

impl SqliteStorage {
    pub async fn try_insert_message(&self, message: &NewMessage) -> Result<Option<i64>> {
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;
        try_insert(&mut conn, message).await
    }

    pub async fn message_id_by_external(&self, external_id: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT id FROM messages WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.map(|r| r.get::<i64, _>("id")))
    }

    pub async fn find_message(&self, id: i64) -> Result<Option<Message>> {
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;
        fetch(&mut conn, id).await
    }

    pub async fn get_message(&self, id: i64) -> Result<Message> {
        self.find_message(id)
            .await?
            .ok_or_else(|| MailroomError::not_found("message", id))
    }

    /// Newest first.
    pub async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        let mut query = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM messages WHERE 1 = 1");
        if let Some(category) = filter.category {
            query.push(" AND category = ").push_bind(category.to_string());
        }
        if let Some(priority) = filter.priority {
            query.push(" AND priority = ").push_bind(priority.to_string());
        }
        if let Some(is_read) = filter.is_read {
            query.push(" AND is_read = ").push_bind(is_read);
        }
        query
            .push(" ORDER BY received_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(100))
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0));

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.iter().map(message_from_row).collect()
    }

    /// Writes analysis fields once. Returns `false` if the message was
    /// already analyzed or does not exist.
    pub async fn mark_analyzed(&self, id: i64, analysis: &MessageAnalysis) -> Result<bool> {
        let now = Utc::now();
        let done = sqlx::query(
            "UPDATE messages SET priority = ?, category = ?, sentiment = ?, urgency_score = ?, \
             processed_at = ?, updated_at = ? WHERE id = ? AND processed_at IS NULL",
        )
        .bind(analysis.priority.to_string())
        .bind(analysis.category.to_string())
        .bind(analysis.sentiment.to_string())
        .bind(analysis.urgency_score)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(done.rows_affected() == 1)
    }

    pub async fn mark_read(&self, id: i64, is_read: bool) -> Result<()> {
        let done = sqlx::query("UPDATE messages SET is_read = ?, updated_at = ? WHERE id = ?")
            .bind(is_read)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        if done.rows_affected() == 0 {
            return Err(MailroomError::not_found("message", id));
        }
        Ok(())
    }

    /// Cascades to the summary; reminders and events keep a null reference.
    pub async fn delete_message(&self, id: i64) -> Result<bool> {
        let done = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(done.rows_affected() > 0)
    }

    pub async fn count_messages(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM messages")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get("n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::fixtures::new_message;
    use chrono::Duration;
    use mailroom_core::types::{Category, Priority, Sentiment};

    fn analysis() -> MessageAnalysis {
        MessageAnalysis {
            priority: Priority::High,
            category: Category::Work,
            sentiment: Sentiment::Neutral,
            urgency_score: 8.0,
        }
    }

    #[tokio::test]
    async fn duplicate_external_id_is_not_inserted() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let first = store.try_insert_message(&new_message("m-1")).await.unwrap();
        assert!(first.is_some());

        let second = store.try_insert_message(&new_message("m-1")).await.unwrap();
        assert_eq!(second, None);
        assert_eq!(store.count_messages().await.unwrap(), 1);
        assert_eq!(store.message_id_by_external("m-1").await.unwrap(), first);
    }

    #[tokio::test]
    async fn stored_message_round_trips_labels() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let id = store.try_insert_message(&new_message("m-1")).await.unwrap().unwrap();

        let message = store.get_message(id).await.unwrap();
        assert_eq!(message.labels, vec!["INBOX", "UNREAD"]);
        assert!(!message.is_analyzed());
        assert_eq!(message.priority, None);
    }

    #[tokio::test]
    async fn analysis_is_written_once() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let id = store.try_insert_message(&new_message("m-1")).await.unwrap().unwrap();

        assert!(store.mark_analyzed(id, &analysis()).await.unwrap());
        let again = MessageAnalysis {
            priority: Priority::Low,
            ..analysis()
        };
        assert!(!store.mark_analyzed(id, &again).await.unwrap());

        let message = store.get_message(id).await.unwrap();
        assert_eq!(message.priority, Some(Priority::High));
        assert!(message.processed_at.is_some());
    }

    #[tokio::test]
    async fn missing_message_is_not_found() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let err = store.get_message(42).await.unwrap_err();
        assert!(matches!(err, MailroomError::NotFound { .. }));
        assert!(matches!(
            store.mark_read(42, true).await.unwrap_err(),
            MailroomError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn listing_filters_and_orders_newest_first() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut older = new_message("old");
        older.received_at -= Duration::days(1);
        let old_id = store.try_insert_message(&older).await.unwrap().unwrap();
        let new_id = store.try_insert_message(&new_message("new")).await.unwrap().unwrap();
        store.mark_analyzed(old_id, &analysis()).await.unwrap();
        store.mark_read(new_id, true).await.unwrap();

        let all = store.list_messages(&MessageFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|m| m.id).collect::<Vec<_>>(), vec![new_id, old_id]);

        let high = store
            .list_messages(&MessageFilter {
                priority: Some(Priority::High),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].id, old_id);

        let unread = store
            .list_messages(&MessageFilter {
                is_read: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].external_id, "old");
    }

    #[test]
    fn hash_is_stable_hex() {
        let a = content_hash("Hello", "World");
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_hash("Hello", "World"));
        assert_ne!(a, content_hash("Hello", "World!"));
    }
}
