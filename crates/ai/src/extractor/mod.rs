pub mod fallback;
pub mod prompts;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use mailroom_core::config::Config;
use mailroom_core::error::{MailroomError, Result};
use mailroom_core::types::{
    Category, EntityGroups, FallbackReason, Generated, Priority, ProviderKind, ReminderKind, ReplyTone,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use validator::Validate;

use crate::provider::{AiProvider, ChatRequest, ProviderRegistry};
use crate::schema::{parse_payload, truncate_for_log, PayloadValidator};

const LOGGED_PAYLOAD_CHARS: usize = 500;

/// Structured summary as returned by a provider, before it is tied to a
/// stored message.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryDraft {
    pub narrative: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub entities: EntityGroups,
    pub sentiment_score: f64,
    pub urgency_score: f64,
    pub complexity_score: f64,
    pub confidence: f64,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Deserialize)]
struct SummaryPayload {
    summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    action_items: Vec<String>,
    #[serde(default)]
    sentiment: Option<Value>,
    #[serde(default)]
    sentiment_score: Option<f64>,
    #[serde(default)]
    urgency_score: Option<f64>,
    #[serde(default)]
    complexity_score: Option<f64>,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    entities: EntityGroups,
}

impl SummaryDraft {
    fn from_payload(payload: Value) -> std::result::Result<Self, String> {
        let raw: SummaryPayload = serde_json::from_value(payload).map_err(|e| e.to_string())?;

        // Either an explicit score, a bare number under "sentiment", or a label.
        let sentiment = raw.sentiment_score.or_else(|| match &raw.sentiment {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(label)) => match label.trim().to_lowercase().as_str() {
                "positive" => Some(0.5),
                "negative" => Some(-0.5),
                _ => Some(0.0),
            },
            _ => None,
        });

        Ok(Self {
            narrative: raw.summary.trim().to_string(),
            key_points: raw.key_points,
            action_items: raw.action_items,
            entities: raw.entities,
            sentiment_score: sentiment.unwrap_or(0.0).clamp(-1.0, 1.0),
            urgency_score: raw.urgency_score.unwrap_or(5.0).clamp(1.0, 10.0),
            complexity_score: raw.complexity_score.unwrap_or(5.0).clamp(1.0, 10.0),
            confidence: raw.confidence_score.unwrap_or(0.8).clamp(0.0, 1.0),
            category: raw.category.and_then(|c| Category::from_str(c.trim()).ok()),
            priority: raw.priority.and_then(|p| Priority::from_str(p.trim()).ok()),
        })
    }
}

fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(String::deserialize(deserializer)?.trim().to_string())
}

/// Treats absent values, blanks and a literal "null" as missing.
fn present(raw: &Option<String>) -> Option<&str> {
    raw.as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty() && !r.eq_ignore_ascii_case("null"))
}

/// Timestamps as models write them: RFC 3339, `YYYY-MM-DD HH:MM[:SS]`, or a
/// bare date (midnight UTC). `Ok(None)` when the value is missing.
pub fn parse_extracted_time(raw: &Option<String>) -> std::result::Result<Option<DateTime<Utc>>, String> {
    let Some(raw) = present(raw) else {
        return Ok(None);
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Some(Utc.from_utc_datetime(&naive)));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))));
    }

    Err(format!("unrecognized timestamp '{}'", raw))
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct ExtractedTask {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ExtractedTask {
    pub fn due_at(&self) -> std::result::Result<Option<DateTime<Utc>>, String> {
        parse_extracted_time(&self.due_date)
    }

    /// Anything outside high/medium/low counts as medium.
    pub fn priority(&self) -> Priority {
        present(&self.priority)
            .and_then(|p| Priority::from_str(p).ok())
            .unwrap_or(Priority::Medium)
    }

    pub fn reminder_kind(&self) -> ReminderKind {
        present(&self.kind)
            .and_then(|k| ReminderKind::from_str(k).ok())
            .unwrap_or(ReminderKind::Task)
    }

    pub fn description(&self) -> &str {
        present(&self.description).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct ExtractedEvent {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub attendees: Vec<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ExtractedEvent {
    pub fn start_at(&self) -> std::result::Result<Option<DateTime<Utc>>, String> {
        parse_extracted_time(&self.start_time)
    }

    pub fn end_at(&self) -> std::result::Result<Option<DateTime<Utc>>, String> {
        parse_extracted_time(&self.end_time)
    }

    pub fn description(&self) -> &str {
        present(&self.description).unwrap_or_default()
    }

    pub fn location(&self) -> Option<&str> {
        present(&self.location)
    }

    /// Attendee entries that look like addresses.
    pub fn attendee_addresses(&self) -> Vec<String> {
        self.attendees
            .iter()
            .map(|a| a.trim())
            .filter(|a| a.contains('@'))
            .map(str::to_string)
            .collect()
    }

    /// Calls get a call reminder, everything else a meeting reminder.
    pub fn reminder_kind(&self) -> ReminderKind {
        match present(&self.kind) {
            Some(kind) if kind.eq_ignore_ascii_case("call") => ReminderKind::Call,
            _ => ReminderKind::Meeting,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedItems {
    pub tasks: Vec<ExtractedTask>,
    pub events: Vec<ExtractedEvent>,
    /// Entries dropped because they failed to deserialize or validate.
    pub rejected: usize,
}

impl ExtractedItems {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.events.is_empty()
    }

    fn from_payload(payload: &Value) -> Self {
        let mut items = Self::default();
        for raw in payload["tasks"].as_array().into_iter().flatten() {
            match item_from_value::<ExtractedTask>(raw) {
                Ok(task) => items.tasks.push(task),
                Err(e) => {
                    warn!("Dropping extracted task: {}", e);
                    items.rejected += 1;
                }
            }
        }
        for raw in payload["events"].as_array().into_iter().flatten() {
            match item_from_value::<ExtractedEvent>(raw) {
                Ok(event) => items.events.push(event),
                Err(e) => {
                    warn!("Dropping extracted event: {}", e);
                    items.rejected += 1;
                }
            }
        }
        items
    }
}

fn item_from_value<T: DeserializeOwned + Validate>(raw: &Value) -> std::result::Result<T, String> {
    let item: T = serde_json::from_value(raw.clone()).map_err(|e| e.to_string())?;
    item.validate().map_err(|e| e.to_string())?;
    Ok(item)
}

/// Runs the three generative modes against whichever provider the registry
/// resolves, bounding every call by `timeout`. Only a configuration error
/// for an explicitly named provider is returned as `Err`; every other
/// failure becomes a [`Generated::Fallback`]. Nothing is persisted here.
pub struct StructuredExtractor {
    registry: Arc<ProviderRegistry>,
    timeout: Duration,
    summary_schema: PayloadValidator,
    items_schema: PayloadValidator,
}

impl StructuredExtractor {
    pub fn new(registry: Arc<ProviderRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            timeout,
            summary_schema: PayloadValidator::summary(),
            items_schema: PayloadValidator::tasks_and_events(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(ProviderRegistry::from_config(config)), config.provider_timeout)
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub async fn summarize(
        &self,
        content: &str,
        provider: Option<ProviderKind>,
    ) -> Result<Generated<SummaryDraft>> {
        let Some(ai) = self.registry.resolve(provider)? else {
            return Ok(Generated::Fallback {
                value: fallback::summary(content),
                reason: FallbackReason::NoProvider,
            });
        };

        let outcome = self
            .structured(ai.as_ref(), prompts::summary_request(content), &self.summary_schema)
            .await
            .and_then(|payload| SummaryDraft::from_payload(payload).map_err(FallbackReason::Malformed));

        Ok(match outcome {
            Ok(value) => Generated::Provider {
                value,
                provider: ai.kind(),
            },
            Err(reason) => Generated::Fallback {
                value: fallback::summary(content),
                reason,
            },
        })
    }

    pub async fn generate_reply(
        &self,
        content: &str,
        tone: ReplyTone,
        context: &str,
        provider: Option<ProviderKind>,
    ) -> Result<Generated<String>> {
        let template = || fallback::reply(tone).to_string();
        let Some(ai) = self.registry.resolve(provider)? else {
            return Ok(Generated::Fallback {
                value: template(),
                reason: FallbackReason::NoProvider,
            });
        };

        let outcome = self
            .complete(ai.as_ref(), prompts::reply_request(content, tone, context))
            .await
            .and_then(|text| {
                let text = text.trim().to_string();
                if text.is_empty() {
                    Err(FallbackReason::Malformed("empty reply".into()))
                } else {
                    Ok(text)
                }
            });

        Ok(match outcome {
            Ok(value) => Generated::Provider {
                value,
                provider: ai.kind(),
            },
            Err(reason) => Generated::Fallback {
                value: template(),
                reason,
            },
        })
    }

    pub async fn extract_tasks_and_events(
        &self,
        content: &str,
        provider: Option<ProviderKind>,
    ) -> Result<Generated<ExtractedItems>> {
        let Some(ai) = self.registry.resolve(provider)? else {
            return Ok(Generated::Fallback {
                value: fallback::items(),
                reason: FallbackReason::NoProvider,
            });
        };

        let outcome = self
            .structured(ai.as_ref(), prompts::tasks_and_events_request(content), &self.items_schema)
            .await;

        Ok(match outcome {
            Ok(payload) => {
                let items = ExtractedItems::from_payload(&payload);
                debug!(
                    "{} extracted {} tasks and {} events ({} rejected)",
                    ai.kind(),
                    items.tasks.len(),
                    items.events.len(),
                    items.rejected
                );
                Generated::Provider {
                    value: items,
                    provider: ai.kind(),
                }
            }
            Err(reason) => Generated::Fallback {
                value: fallback::items(),
                reason,
            },
        })
    }

    async fn complete(
        &self,
        ai: &dyn AiProvider,
        request: ChatRequest,
    ) -> std::result::Result<String, FallbackReason> {
        match tokio::time::timeout(self.timeout, ai.chat_completion(request)).await {
            Err(_) => Err(FallbackReason::Timeout),
            Ok(Err(MailroomError::MalformedPayload(msg))) => Err(FallbackReason::Malformed(msg)),
            Ok(Err(e)) => Err(FallbackReason::Upstream(e.to_string())),
            Ok(Ok(response)) => Ok(response.content),
        }
    }

    /// One completion, parsed and checked against `schema`. A reply that
    /// parses but fails the schema gets a single repair pass.
    async fn structured(
        &self,
        ai: &dyn AiProvider,
        request: ChatRequest,
        schema: &PayloadValidator,
    ) -> std::result::Result<Value, FallbackReason> {
        let raw = self.complete(ai, request.clone()).await?;
        let payload = parse_payload(&raw).map_err(|e| malformed(schema, &raw, e))?;

        let problems = match schema.check(&payload) {
            Ok(()) => return Ok(payload),
            Err(problems) => problems,
        };
        warn!(
            "{} payload from {} failed validation ({}), attempting repair",
            schema.name(),
            ai.kind(),
            problems
        );

        let repaired_raw = self
            .complete(ai, prompts::repair_request(&request, &raw, &problems))
            .await?;
        let repaired = parse_payload(&repaired_raw).map_err(|e| malformed(schema, &repaired_raw, e))?;
        schema
            .check(&repaired)
            .map_err(|problems| malformed(schema, &repaired_raw, problems))?;

        Ok(repaired)
    }
}

fn malformed(schema: &PayloadValidator, raw: &str, problem: String) -> FallbackReason {
    warn!(
        "Malformed {} payload ({}): {}",
        schema.name(),
        problem,
        truncate_for_log(raw, LOGGED_PAYLOAD_CHARS)
    );
    FallbackReason::Malformed(problem)
}
