use chrono::Utc;
use mailroom_core::error::Result;
use mailroom_core::types::{NewSummary, Summary};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::{enum_column, is_unique_violation, json_column, storage_err, to_json, SqliteStorage};

fn summary_from_row(row: &SqliteRow) -> Result<Summary> {
    Ok(Summary {
        id: row.get("id"),
        message_id: row.get("message_id"),
        narrative: row.get("narrative"),
        key_points: json_column(row, "key_points")?,
        action_items: json_column(row, "action_items")?,
        entities: json_column(row, "entities")?,
        sentiment_score: row.get("sentiment_score"),
        urgency_score: row.get("urgency_score"),
        complexity_score: row.get("complexity_score"),
        suggested_reply: row.get("suggested_reply"),
        reply_tone: enum_column(row, "reply_tone")?,
        provider: row.get("provider"),
        model: row.get("model"),
        processing_ms: row.get("processing_ms"),
        confidence: row.get("confidence"),
        degraded: row.get("degraded"),
        created_at: row.get("created_at"),
    })
}

impl SqliteStorage {
    /// Stores the summary unless the message already has one.
    ///
    /// The unique index on `message_id` decides concurrent races; the loser
    /// gets `Ok(None)` and nothing is overwritten.
    pub async fn try_insert_summary(&self, summary: &NewSummary) -> Result<Option<Summary>> {
        let result = sqlx::query(
            "INSERT INTO summaries (message_id, narrative, key_points, action_items, entities, \
             sentiment_score, urgency_score, complexity_score, suggested_reply, reply_tone, \
             provider, model, processing_ms, confidence, degraded, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(summary.message_id)
        .bind(&summary.narrative)
        .bind(to_json(&summary.key_points)?)
        .bind(to_json(&summary.action_items)?)
        .bind(to_json(&summary.entities)?)
        .bind(summary.sentiment_score)
        .bind(summary.urgency_score)
        .bind(summary.complexity_score)
        .bind(&summary.suggested_reply)
        .bind(summary.reply_tone.to_string())
        .bind(&summary.provider)
        .bind(&summary.model)
        .bind(summary.processing_ms)
        .bind(summary.confidence)
        .bind(summary.degraded)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => {
                let row = sqlx::query("SELECT * FROM summaries WHERE id = ?")
                    .bind(done.last_insert_rowid())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(storage_err)?;
                summary_from_row(&row).map(Some)
            }
            Err(e) if is_unique_violation(&e) => {
                debug!("Summary for message {} already stored", summary.message_id);
                Ok(None)
            }
            Err(e) => Err(storage_err(e)),
        }
    }

    pub async fn summary_for_message(&self, message_id: i64) -> Result<Option<Summary>> {
        let row = sqlx::query("SELECT * FROM summaries WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.as_ref().map(summary_from_row).transpose()
    }

    /// Removing the summary allows it to be generated again.
    pub async fn delete_summary(&self, message_id: i64) -> Result<bool> {
        let done = sqlx::query("DELETE FROM summaries WHERE message_id = ?")
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(done.rows_affected() > 0)
    }
}
