//! Deterministic results substituted when no provider answers.

use mailroom_core::types::{EntityGroups, ReplyTone};

use super::{ExtractedItems, SummaryDraft};

const PREVIEW_CHARS: usize = 100;

pub fn summary(content: &str) -> SummaryDraft {
    let preview: String = content.chars().take(PREVIEW_CHARS).collect();
    SummaryDraft {
        narrative: format!("Email summary unavailable. Content preview: {}...", preview),
        key_points: vec!["LLM service unavailable".to_string()],
        action_items: Vec::new(),
        entities: EntityGroups::default(),
        sentiment_score: 0.0,
        urgency_score: 5.0,
        complexity_score: 5.0,
        confidence: 0.0,
        category: None,
        priority: None,
    }
}

pub fn reply(tone: ReplyTone) -> &'static str {
    match tone {
        ReplyTone::Professional => {
            "Thank you for your email. I will review this and get back to you soon."
        }
        ReplyTone::Friendly => {
            "Hi! Thanks for reaching out. I'll take a look at this and respond shortly."
        }
        ReplyTone::Brief => "Thanks for the email. Will respond soon.",
    }
}

pub fn items() -> ExtractedItems {
    ExtractedItems::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_preview_is_cut_at_a_hundred_chars() {
        let long = "x".repeat(250);
        let draft = summary(&long);
        assert_eq!(
            draft.narrative,
            format!("Email summary unavailable. Content preview: {}...", "x".repeat(100))
        );
        assert_eq!(draft.urgency_score, 5.0);
        assert_eq!(draft.confidence, 0.0);
        assert!(draft.entities.is_empty());
    }

    #[test]
    fn each_tone_has_its_own_template() {
        assert!(reply(ReplyTone::Friendly).starts_with("Hi!"));
        assert_eq!(reply(ReplyTone::Brief), "Thanks for the email. Will respond soon.");
        assert_ne!(reply(ReplyTone::Professional), reply(ReplyTone::Brief));
    }
}
