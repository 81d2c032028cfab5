pub mod draft;

use ai::{ExtractedEvent, ExtractedTask, StructuredExtractor};
use analysis::HeuristicAnalyzer;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use mailroom_core::error::{MailroomError, Result};
use mailroom_core::types::{
    AnalysisResult, CalendarEvent, EventStatus, Generated, NewCalendarEvent, NewReminder, NewSummary,
    Priority, ProviderKind, ReminderKind, ReplyTone, Summary,
};
use serde::Serialize;
use sqlx::{Connection, SqliteConnection};
use std::sync::Arc;
use std::time::Instant;
use storage::sqlite::{events, messages, reminders};
use storage::SqliteStorage;
use tracing::{error, info, warn};

use crate::engine::queue::{TaskHandle, TaskQueue};

const TASK_DEFAULT_DUE_DAYS: i64 = 7;
const TASK_NOTIFY_LEAD_HOURS: i64 = 2;
const EVENT_NOTIFY_LEAD_MINUTES: i64 = 15;
const EVENT_DEFAULT_MINUTES: i64 = 60;

fn storage_err(e: sqlx::Error) -> MailroomError {
    MailroomError::Storage(e.to_string())
}

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub provider: Option<ProviderKind>,
    pub include_reply: bool,
    pub tone: ReplyTone,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            provider: None,
            include_reply: true,
            tone: ReplyTone::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SummaryOutcome {
    Created(Summary),
    AlreadyExists(Summary),
}

impl SummaryOutcome {
    pub fn summary(&self) -> &Summary {
        match self {
            SummaryOutcome::Created(s) | SummaryOutcome::AlreadyExists(s) => s,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, SummaryOutcome::Created(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummaryReport {
    pub requested: usize,
    pub created: usize,
    pub already_present: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionReport {
    pub tasks_found: usize,
    pub events_found: usize,
    pub reminders_created: usize,
    pub events_created: usize,
    pub skipped: usize,
    pub degraded: bool,
}

/// Reminder for an extracted task. A missing due date means a week from
/// `now`; an unreadable one rejects the task.
pub fn plan_task(task: &ExtractedTask, message_id: i64, now: DateTime<Utc>) -> std::result::Result<NewReminder, String> {
    let due_at = task
        .due_at()?
        .unwrap_or_else(|| now + Duration::days(TASK_DEFAULT_DUE_DAYS));

    let mut reminder = NewReminder::new(task.title.clone(), due_at)
        .notify_before(Duration::hours(TASK_NOTIFY_LEAD_HOURS));
    reminder.description = task.description().to_string();
    reminder.kind = task.reminder_kind();
    reminder.priority = task.priority();
    reminder.message_id = Some(message_id);
    Ok(reminder)
}

/// Calendar event for an extracted event. Start is mandatory; a missing
/// end means one hour.
pub fn plan_event(event: &ExtractedEvent, message_id: i64) -> std::result::Result<NewCalendarEvent, String> {
    let start_at = event.start_at()?.ok_or("event has no start time")?;
    let end_at = event
        .end_at()?
        .unwrap_or_else(|| start_at + Duration::minutes(EVENT_DEFAULT_MINUTES));
    if end_at < start_at {
        return Err(format!("event '{}' ends before it starts", event.title));
    }

    Ok(NewCalendarEvent {
        external_id: None,
        title: event.title.clone(),
        description: event.description().to_string(),
        location: event.location().map(str::to_string),
        start_at,
        end_at,
        timezone: "UTC".to_string(),
        attendees: event.attendee_addresses(),
        organizer: None,
        status: EventStatus::Confirmed,
        source_message_id: Some(message_id),
    })
}

/// Pre-event notification tied to a stored event.
pub fn companion_reminder(event: &CalendarEvent, kind: ReminderKind, message_id: i64) -> NewReminder {
    let prefix = match kind {
        ReminderKind::Call => "Call",
        _ => "Meeting",
    };
    let mut reminder = NewReminder::new(format!("{}: {}", prefix, event.title), event.start_at)
        .notify_before(Duration::minutes(EVENT_NOTIFY_LEAD_MINUTES));
    reminder.description = format!("Upcoming {} at {}", prefix.to_lowercase(), event.start_at.to_rfc3339());
    reminder.kind = kind;
    reminder.priority = Priority::Medium;
    reminder.message_id = Some(message_id);
    reminder.event_id = Some(event.id);
    reminder
}

async fn insert_event_with_reminder(
    conn: &mut SqliteConnection,
    event: &NewCalendarEvent,
    kind: ReminderKind,
    message_id: i64,
) -> Result<CalendarEvent> {
    let stored = events::insert(conn, event).await?;
    reminders::insert(conn, &companion_reminder(&stored, kind, message_id)).await?;
    Ok(stored)
}

/// Enrichment for stored messages: offline analysis, then on request a
/// summary and task/event extraction.
///
/// Callers must not run two extractions for the same message at once;
/// summaries are protected by the store's uniqueness constraint instead.
pub struct EnrichmentPipeline {
    store: Arc<SqliteStorage>,
    analyzer: HeuristicAnalyzer,
    extractor: Arc<StructuredExtractor>,
    queue: TaskQueue,
}

impl EnrichmentPipeline {
    pub fn new(
        store: Arc<SqliteStorage>,
        analyzer: HeuristicAnalyzer,
        extractor: Arc<StructuredExtractor>,
        queue: TaskQueue,
    ) -> Self {
        Self {
            store,
            analyzer,
            extractor,
            queue,
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn extractor(&self) -> &Arc<StructuredExtractor> {
        &self.extractor
    }

    /// Runs the heuristic analyzer and stamps its labels on the message.
    /// An already analyzed message keeps its stored labels.
    pub async fn analyze_message(&self, id: i64) -> Result<AnalysisResult> {
        let message = self.store.get_message(id).await?;
        let result = self.analyzer.analyze(&message.subject, &message.body_text);

        if !self.store.mark_analyzed(id, &result.message_analysis()).await? {
            info!("Message {} was already analyzed, keeping stored labels", id);
        }
        Ok(result)
    }

    /// Analyzes each message independently; failures are logged and counted.
    pub async fn analyze_many(&self, ids: &[i64]) -> usize {
        let outcomes = join_all(ids.iter().map(|&id| self.analyze_message(id))).await;
        ids.iter()
            .zip(outcomes)
            .filter(|(id, outcome)| match outcome {
                Ok(_) => true,
                Err(e) => {
                    error!("Analysis of message {} failed: {}", id, e);
                    false
                }
            })
            .count()
    }

    pub async fn summarize(&self, id: i64, options: &SummaryOptions) -> Result<SummaryOutcome> {
        let message = self.store.get_message(id).await?;
        if let Some(existing) = self.store.summary_for_message(id).await? {
            info!("Summary for message {} already exists", id);
            return Ok(SummaryOutcome::AlreadyExists(existing));
        }

        let started = Instant::now();
        let generated = self
            .extractor
            .summarize(&message.envelope_text(), options.provider)
            .await?;
        if let Some(reason) = generated.fallback_reason() {
            warn!("Summary for message {} degraded: {}", id, reason);
        }

        let suggested_reply = if options.include_reply {
            self.reply_for_summary(id, &message.subject_and_body(), options).await
        } else {
            None
        };

        let provider = generated.provider();
        let degraded = generated.is_degraded();
        let draft = generated.into_value();
        let model = provider
            .and_then(|kind| self.extractor.registry().get(kind))
            .map(|p| p.model().to_string())
            .unwrap_or_else(|| "none".to_string());

        let new_summary = NewSummary {
            message_id: id,
            narrative: draft.narrative,
            key_points: draft.key_points,
            action_items: draft.action_items,
            entities: draft.entities,
            sentiment_score: draft.sentiment_score,
            urgency_score: draft.urgency_score,
            complexity_score: draft.complexity_score,
            suggested_reply,
            reply_tone: options.tone,
            provider: provider.map(|p| p.to_string()).unwrap_or_else(|| "fallback".to_string()),
            model,
            processing_ms: started.elapsed().as_millis() as i64,
            confidence: draft.confidence,
            degraded,
        };

        match self.store.try_insert_summary(&new_summary).await? {
            Some(summary) => {
                info!("Summary created for message {}", id);
                Ok(SummaryOutcome::Created(summary))
            }
            None => {
                let existing = self
                    .store
                    .summary_for_message(id)
                    .await?
                    .ok_or_else(|| MailroomError::Internal(format!("Summary for {} vanished", id)))?;
                Ok(SummaryOutcome::AlreadyExists(existing))
            }
        }
    }

    /// Only a real provider reply is kept; templates and failures leave
    /// the summary without one.
    async fn reply_for_summary(&self, id: i64, content: &str, options: &SummaryOptions) -> Option<String> {
        match self
            .extractor
            .generate_reply(content, options.tone, "", options.provider)
            .await
        {
            Ok(Generated::Provider { value, .. }) => Some(value),
            Ok(Generated::Fallback { reason, .. }) => {
                warn!("Suggested reply for message {} unavailable: {}", id, reason);
                None
            }
            Err(e) => {
                warn!("Suggested reply for message {} failed: {}", id, e);
                None
            }
        }
    }

    pub async fn summarize_many(&self, ids: &[i64], options: &SummaryOptions) -> BatchSummaryReport {
        let outcomes = join_all(ids.iter().map(|&id| self.summarize(id, options))).await;

        let mut report = BatchSummaryReport {
            requested: ids.len(),
            ..Default::default()
        };
        for (id, outcome) in ids.iter().zip(outcomes) {
            match outcome {
                Ok(SummaryOutcome::Created(_)) => report.created += 1,
                Ok(SummaryOutcome::AlreadyExists(_)) => report.already_present += 1,
                Err(e) => {
                    error!("Summary generation failed for message {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Turns extracted tasks into reminders and extracted events into
    /// calendar events with a companion reminder, in one transaction. A bad
    /// item is skipped inside its own savepoint.
    pub async fn extract(&self, id: i64) -> Result<ExtractionReport> {
        let message = self.store.get_message(id).await?;
        let generated = self
            .extractor
            .extract_tasks_and_events(&message.subject_and_body(), None)
            .await?;
        if let Some(reason) = generated.fallback_reason() {
            warn!("Extraction for message {} degraded: {}", id, reason);
        }

        let degraded = generated.is_degraded();
        let items = generated.into_value();
        let mut report = ExtractionReport {
            tasks_found: items.tasks.len(),
            events_found: items.events.len(),
            skipped: items.rejected,
            degraded,
            ..Default::default()
        };
        if items.is_empty() {
            return Ok(report);
        }

        let now = Utc::now();
        let mut tx = self.store.pool().begin().await.map_err(storage_err)?;
        if messages::fetch(&mut tx, id).await?.is_none() {
            tx.rollback().await.map_err(storage_err)?;
            return Err(MailroomError::not_found("message", id));
        }

        for task in &items.tasks {
            let reminder = match plan_task(task, id, now) {
                Ok(reminder) => reminder,
                Err(e) => {
                    warn!("Skipping task '{}' from message {}: {}", task.title, id, e);
                    report.skipped += 1;
                    continue;
                }
            };

            let mut savepoint = Connection::begin(&mut *tx).await.map_err(storage_err)?;
            match reminders::insert(&mut savepoint, &reminder).await {
                Ok(_) => {
                    savepoint.commit().await.map_err(storage_err)?;
                    report.reminders_created += 1;
                }
                Err(e) => {
                    warn!("Skipping task '{}' from message {}: {}", task.title, id, e);
                    savepoint.rollback().await.map_err(storage_err)?;
                    report.skipped += 1;
                }
            }
        }

        for event in &items.events {
            let planned = match plan_event(event, id) {
                Ok(planned) => planned,
                Err(e) => {
                    warn!("Skipping event '{}' from message {}: {}", event.title, id, e);
                    report.skipped += 1;
                    continue;
                }
            };

            let mut savepoint = Connection::begin(&mut *tx).await.map_err(storage_err)?;
            match insert_event_with_reminder(&mut savepoint, &planned, event.reminder_kind(), id).await {
                Ok(_) => {
                    savepoint.commit().await.map_err(storage_err)?;
                    report.events_created += 1;
                    report.reminders_created += 1;
                }
                Err(e) => {
                    warn!("Skipping event '{}' from message {}: {}", event.title, id, e);
                    savepoint.rollback().await.map_err(storage_err)?;
                    report.skipped += 1;
                }
            }
        }

        tx.commit().await.map_err(storage_err)?;
        info!(
            "Processed message {} for reminders and events: {} reminders, {} events, {} skipped",
            id, report.reminders_created, report.events_created, report.skipped
        );
        Ok(report)
    }

    /// Queues [`extract`](Self::extract) on the worker pool.
    pub fn spawn_extraction(self: &Arc<Self>, id: i64) -> TaskHandle {
        let pipeline = Arc::clone(self);
        self.queue.submit(format!("extract:{}", id), async move {
            let report = pipeline.extract(id).await?;
            serde_json::to_string(&report).map_err(|e| MailroomError::Internal(e.to_string()))
        })
    }

    /// Queues [`summarize`](Self::summarize) on the worker pool.
    pub fn spawn_summary(self: &Arc<Self>, id: i64, options: SummaryOptions) -> TaskHandle {
        let pipeline = Arc::clone(self);
        self.queue.submit(format!("summarize:{}", id), async move {
            let outcome = pipeline.summarize(id, &options).await?;
            Ok(if outcome.is_created() {
                "created".to_string()
            } else {
                "already exists".to_string()
            })
        })
    }
}
