use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, Priority, Sentiment};

/// A locally stored email. Analysis fields stay `None` until the analyzer
/// has run; after that only read state may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub external_id: String,
    pub thread_id: Option<String>,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub body_text: String,
    pub body_html: Option<String>,
    pub has_attachment: bool,
    pub labels: Vec<String>,
    pub hash: String,
    pub is_read: bool,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub sentiment: Option<Sentiment>,
    pub urgency_score: Option<f64>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn is_analyzed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Prompt input for summarization: subject and both envelope parties.
    pub fn envelope_text(&self) -> String {
        format!(
            "Subject: {}\n\nFrom: {}\nTo: {}\n\n{}",
            self.subject, self.sender, self.recipient, self.body_text
        )
    }

    /// Prompt input for reply drafting and task extraction.
    pub fn subject_and_body(&self) -> String {
        format!("Subject: {}\n\n{}", self.subject, self.body_text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub external_id: String,
    pub thread_id: Option<String>,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub body_text: String,
    pub body_html: Option<String>,
    pub has_attachment: bool,
    pub labels: Vec<String>,
    pub hash: String,
    pub is_read: bool,
}

/// Analysis fields persisted onto a Message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MessageAnalysis {
    pub priority: Priority,
    pub category: Category,
    pub sentiment: Sentiment,
    pub urgency_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub is_read: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A message as returned by the mailbox provider, before reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchedMessage {
    pub external_id: String,
    pub thread_id: Option<String>,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    /// RFC 3339 with a `Z` suffix accepted; RFC 2822 is tolerated as well.
    pub timestamp: String,
    pub has_attachment: bool,
    pub labels: Vec<String>,
}

/// An event as returned by the calendar provider, before reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchedEvent {
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub start: String,
    pub end: String,
    pub timezone: Option<String>,
    pub attendees: Vec<String>,
    pub organizer: Option<String>,
    pub status: Option<String>,
}
