use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, MessageAnalysis, Priority, ReplyTone, Sentiment};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: Sentiment,
    pub polarity: f64,
    pub subjectivity: f64,
    pub confidence: f64,
}

impl SentimentScore {
    pub fn neutral() -> Self {
        Self {
            label: Sentiment::Neutral,
            polarity: 0.0,
            subjectivity: 0.0,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityGroups {
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
}

impl EntityGroups {
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
            && self.organizations.is_empty()
            && self.dates.is_empty()
            && self.locations.is_empty()
    }
}

/// A date-like phrase found in text. `parsed` is `None` when the phrase
/// matched a pattern but could not be resolved to a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateMention {
    pub text: String,
    pub parsed: Option<DateTime<Utc>>,
    pub start: usize,
    pub end: usize,
}

/// Transient output of the heuristic analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub sentiment: SentimentScore,
    pub urgency_score: f64,
    pub category: Category,
    pub entities: EntityGroups,
    pub keywords: Vec<String>,
    pub dates: Vec<DateMention>,
    pub action_items: Vec<String>,
}

impl AnalysisResult {
    pub fn priority(&self) -> Priority {
        Priority::from_urgency(self.urgency_score)
    }

    pub fn message_analysis(&self) -> MessageAnalysis {
        MessageAnalysis {
            priority: self.priority(),
            category: self.category,
            sentiment: self.sentiment.label,
            urgency_score: self.urgency_score,
        }
    }
}

/// One-to-one with a Message; never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: i64,
    pub message_id: i64,
    pub narrative: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub entities: EntityGroups,
    pub sentiment_score: f64,
    pub urgency_score: f64,
    pub complexity_score: f64,
    pub suggested_reply: Option<String>,
    pub reply_tone: ReplyTone,
    pub provider: String,
    pub model: String,
    pub processing_ms: i64,
    pub confidence: f64,
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSummary {
    pub message_id: i64,
    pub narrative: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub entities: EntityGroups,
    pub sentiment_score: f64,
    pub urgency_score: f64,
    pub complexity_score: f64,
    pub suggested_reply: Option<String>,
    pub reply_tone: ReplyTone,
    pub provider: String,
    pub model: String,
    pub processing_ms: i64,
    pub confidence: f64,
    pub degraded: bool,
}
