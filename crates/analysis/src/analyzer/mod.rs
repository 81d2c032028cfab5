pub mod actions;
pub mod dates;
pub mod entities;
pub mod keywords;
pub mod scoring;
pub mod sentiment;

use chrono::{DateTime, Utc};
use mailroom_core::types::{AnalysisResult, EntityGroups};
use std::sync::Arc;
use tracing::{debug, warn};

use entities::{EntityTagger, RuleTagger};

/// Offline analyzer run on every newly synced message.
///
/// Analysis cannot fail: every step works on whatever text it is given and
/// a failing entity tagger only empties the entity groups.
#[derive(Clone)]
pub struct HeuristicAnalyzer {
    tagger: Option<Arc<dyn EntityTagger>>,
    max_keywords: usize,
}

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self {
            tagger: Some(Arc::new(RuleTagger)),
            max_keywords: keywords::DEFAULT_MAX_KEYWORDS,
        }
    }

    pub fn with_tagger(tagger: Arc<dyn EntityTagger>) -> Self {
        Self {
            tagger: Some(tagger),
            ..Self::new()
        }
    }

    /// No entity recognition; every entity group comes back empty.
    pub fn without_entities() -> Self {
        Self {
            tagger: None,
            ..Self::new()
        }
    }

    pub fn analyze(&self, subject: &str, body: &str) -> AnalysisResult {
        self.analyze_at(subject, body, Utc::now())
    }

    /// Same as [`analyze`](Self::analyze) with relative dates resolved against `now`.
    pub fn analyze_at(&self, subject: &str, body: &str, now: DateTime<Utc>) -> AnalysisResult {
        let text = format!("{} {}", subject, body);

        let result = AnalysisResult {
            sentiment: sentiment::score(&text),
            urgency_score: scoring::urgency_score(&text),
            category: scoring::classify_category(&text),
            entities: self.entities(&text),
            keywords: keywords::extract(&text, self.max_keywords),
            dates: dates::extract(&text, now),
            action_items: actions::extract(body),
        };

        debug!(
            urgency = result.urgency_score,
            category = %result.category,
            sentiment = %result.sentiment.label,
            "Analyzed message text"
        );

        result
    }

    fn entities(&self, text: &str) -> EntityGroups {
        let Some(tagger) = &self.tagger else {
            return EntityGroups::default();
        };

        match tagger.tag(text) {
            Ok(groups) => entities::dedupe(groups),
            Err(e) => {
                warn!("Entity tagging failed, continuing without entities: {}", e);
                EntityGroups::default()
            }
        }
    }
}

impl Default for HeuristicAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mailroom_core::types::{Category, Priority, Sentiment};

    struct BrokenTagger;

    impl EntityTagger for BrokenTagger {
        fn tag(&self, _text: &str) -> Result<EntityGroups, String> {
            Err("model not loaded".into())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    }

    #[test]
    fn empty_input_yields_neutral_defaults() {
        let result = HeuristicAnalyzer::new().analyze_at("", "", now());
        assert_eq!(result.urgency_score, 5.0);
        assert_eq!(result.category, Category::Work);
        assert_eq!(result.sentiment.label, Sentiment::Neutral);
        assert!(result.entities.is_empty());
        assert!(result.keywords.is_empty());
        assert!(result.dates.is_empty());
        assert!(result.action_items.is_empty());
        assert_eq!(result.priority(), Priority::Medium);
    }

    #[test]
    fn urgent_request_is_high_priority() {
        let result = HeuristicAnalyzer::new().analyze_at(
            "URGENT: client report",
            "Please send the client report by end of day. The deadline is today.",
            now(),
        );
        assert_eq!(result.urgency_score, 10.0);
        assert_eq!(result.priority(), Priority::High);
        assert_eq!(result.category, Category::Work);
        assert_eq!(result.action_items[0], "send the client report by end of day");
        assert!(result.keywords.contains(&"report".to_string()));
        assert!(result.dates.iter().any(|d| d.text == "today"));
    }

    #[test]
    fn action_items_ignore_the_subject() {
        let result =
            HeuristicAnalyzer::new().analyze_at("Please review the quarterly plan", "Thanks", now());
        assert!(result.action_items.is_empty());
    }

    #[test]
    fn tagger_failure_only_empties_entities() {
        let analyzer = HeuristicAnalyzer::with_tagger(Arc::new(BrokenTagger));
        let result = analyzer.analyze_at("Lunch", "Hi Sam, lunch at Noon Cafe tomorrow?", now());
        assert!(result.entities.is_empty());
        assert_eq!(result.dates.len(), 1);
        assert_eq!(result.urgency_score, 5.5);
    }

    #[test]
    fn disabled_tagger_returns_empty_groups() {
        let result = HeuristicAnalyzer::without_entities().analyze_at(
            "Visit",
            "Dear Ana, we meet in Lisbon.",
            now(),
        );
        assert!(result.entities.is_empty());
    }
}
