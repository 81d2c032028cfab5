#![allow(dead_code)]

use agent::{EnrichmentPipeline, TaskQueue};
use ai::provider::Usage;
use ai::{AiProvider, ChatRequest, ChatResponse, ProviderRegistry, StructuredExtractor};
use analysis::HeuristicAnalyzer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailbox::{CalendarClient, MailboxClient, RemoteEventInput};
use mailroom_core::error::{MailroomError, Result};
use mailroom_core::types::{BusyInterval, FetchedEvent, FetchedMessage, ProviderKind};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage::SqliteStorage;

pub const TIMEOUT: Duration = Duration::from_millis(500);

pub fn fetched(id: &str, subject: &str, body: &str) -> FetchedMessage {
    FetchedMessage {
        external_id: id.into(),
        thread_id: Some(format!("thread-{}", id)),
        sender: "ana@example.com".into(),
        recipient: "me@example.com".into(),
        subject: subject.into(),
        body_text: body.into(),
        body_html: None,
        timestamp: "2026-10-18T09:30:00Z".into(),
        has_attachment: false,
        labels: vec!["INBOX".into(), "UNREAD".into()],
    }
}

#[derive(Default)]
pub struct FakeMailbox {
    pub inbox: Vec<FetchedMessage>,
    pub fail_fetch: bool,
    pub fail_mark_read: bool,
    pub sent: Mutex<Vec<(String, String, String)>>,
    pub marked: Mutex<Vec<String>>,
}

#[async_trait]
impl MailboxClient for FakeMailbox {
    async fn fetch_messages(&self, _query: &str, max_results: u32) -> Result<Vec<FetchedMessage>> {
        if self.fail_fetch {
            return Err(MailroomError::UpstreamUnavailable("mailbox offline".into()));
        }
        Ok(self.inbox.iter().take(max_results as usize).cloned().collect())
    }

    async fn send_message(&self, to: &str, subject: &str, body: &str, _html_body: Option<&str>) -> Result<String> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.into(), subject.into(), body.into()));
        Ok(format!("sent-{}", sent.len()))
    }

    async fn mark_read(&self, external_id: &str) -> Result<()> {
        if self.fail_mark_read {
            return Err(MailroomError::UpstreamUnavailable("mailbox offline".into()));
        }
        self.marked.lock().unwrap().push(external_id.into());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCalendar {
    pub upcoming: Vec<FetchedEvent>,
    pub busy: Vec<BusyInterval>,
    pub offline: bool,
    pub created: Mutex<Vec<RemoteEventInput>>,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeCalendar {
    fn check(&self) -> Result<()> {
        if self.offline {
            Err(MailroomError::UpstreamUnavailable("calendar offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CalendarClient for FakeCalendar {
    async fn list_upcoming(&self, max_results: u32) -> Result<Vec<FetchedEvent>> {
        self.check()?;
        Ok(self.upcoming.iter().take(max_results as usize).cloned().collect())
    }

    async fn create_event(&self, event: &RemoteEventInput) -> Result<FetchedEvent> {
        self.check()?;
        let mut created = self.created.lock().unwrap();
        created.push(event.clone());
        Ok(FetchedEvent {
            external_id: format!("remote-{}", created.len()),
            title: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start: event.start.to_rfc3339(),
            end: event.end.to_rfc3339(),
            timezone: Some(event.timezone.clone()),
            attendees: event.attendees.clone(),
            organizer: None,
            status: Some("confirmed".into()),
        })
    }

    async fn update_event(&self, external_id: &str, event: &RemoteEventInput) -> Result<FetchedEvent> {
        self.check()?;
        Ok(FetchedEvent {
            external_id: external_id.into(),
            title: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start: event.start.to_rfc3339(),
            end: event.end.to_rfc3339(),
            timezone: Some(event.timezone.clone()),
            attendees: event.attendees.clone(),
            organizer: None,
            status: None,
        })
    }

    async fn delete_event(&self, external_id: &str) -> Result<bool> {
        self.check()?;
        self.deleted.lock().unwrap().push(external_id.into());
        Ok(true)
    }

    async fn query_free_busy(&self, _from: DateTime<Utc>, _to: DateTime<Utc>) -> Result<Vec<BusyInterval>> {
        self.check()?;
        Ok(self.busy.clone())
    }
}

/// Replays canned completions in order; an exhausted script fails.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String>>>,
    pub calls: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn chat_completion(&self, _request: ChatRequest) -> Result<ChatResponse> {
        *self.calls.lock().unwrap() += 1;
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(MailroomError::UpstreamUnavailable("script exhausted".into())));
        next.map(|content| ChatResponse {
            content,
            usage: Usage::default(),
        })
    }
}

pub fn extractor(providers: Vec<Arc<dyn AiProvider>>) -> Arc<StructuredExtractor> {
    let registry = ProviderRegistry::new(ProviderKind::OpenAi, providers);
    Arc::new(StructuredExtractor::new(Arc::new(registry), TIMEOUT))
}

pub async fn pipeline(providers: Vec<Arc<dyn AiProvider>>) -> (Arc<SqliteStorage>, Arc<EnrichmentPipeline>) {
    let store = Arc::new(SqliteStorage::in_memory().await.unwrap());
    let pipeline = Arc::new(EnrichmentPipeline::new(
        store.clone(),
        HeuristicAnalyzer::new(),
        extractor(providers),
        TaskQueue::new(2),
    ));
    (store, pipeline)
}

pub async fn stored(store: &SqliteStorage, item: &FetchedMessage) -> i64 {
    let message = agent::engine::reconcile::to_new_message(item).unwrap();
    store.try_insert_message(&message).await.unwrap().unwrap()
}
