use mailroom_core::types::Category;
use regex::Regex;
use std::sync::OnceLock;

pub const BASE_URGENCY: f64 = 5.0;
pub const MIN_URGENCY: f64 = 1.0;
pub const MAX_URGENCY: f64 = 10.0;

const HIGH_URGENCY: &[&str] = &[
    "urgent",
    "asap",
    "immediately",
    "emergency",
    "critical",
    "deadline",
    "today",
];
const MEDIUM_URGENCY: &[&str] = &["soon", "this week", "important", "please", "need", "required"];
const LOW_URGENCY: &[&str] = &["when you can", "no rush", "fyi", "for your information"];

const HIGH_WEIGHT: f64 = 2.0;
const MEDIUM_WEIGHT: f64 = 1.0;
const LOW_WEIGHT: f64 = -1.0;
const TIME_PATTERN_WEIGHT: f64 = 1.5;
const QUESTION_WEIGHT: f64 = 0.5;
const QUESTION_CAP: f64 = 2.0;

const WORK_KEYWORDS: &[&str] = &[
    "meeting", "project", "deadline", "report", "client", "business", "office",
];
const PERSONAL_KEYWORDS: &[&str] = &[
    "family", "friend", "personal", "vacation", "birthday", "wedding",
];
const PROMOTIONAL_KEYWORDS: &[&str] = &[
    "sale",
    "discount",
    "offer",
    "promotion",
    "deal",
    "buy",
    "shop",
];
const SOCIAL_KEYWORDS: &[&str] = &[
    "linkedin", "facebook", "twitter", "social", "network", "connect",
];

fn time_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r"by (?:today|tomorrow|end of day|eod)",
            r"deadline.*(?:today|tomorrow|this week)",
            r"need.*(?:asap|immediately|urgently)",
            r"meeting.*(?:today|tomorrow|in \d+ hours?)",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

fn count_present(haystack: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| haystack.contains(*k)).count()
}

/// Additive keyword and pattern score clamped to `[1, 10]`.
///
/// Every distinct keyword present contributes its class weight, every
/// matching time-sensitive pattern adds 1.5, and question marks add 0.5
/// each up to 2.0.
pub fn urgency_score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let mut score = BASE_URGENCY;

    score += HIGH_WEIGHT * count_present(&lower, HIGH_URGENCY) as f64;
    score += MEDIUM_WEIGHT * count_present(&lower, MEDIUM_URGENCY) as f64;
    score += LOW_WEIGHT * count_present(&lower, LOW_URGENCY) as f64;

    for pattern in time_patterns() {
        if pattern.is_match(&lower) {
            score += TIME_PATTERN_WEIGHT;
        }
    }

    let questions = text.matches('?').count() as f64;
    score += (questions * QUESTION_WEIGHT).min(QUESTION_CAP);

    score.clamp(MIN_URGENCY, MAX_URGENCY)
}

fn category_keywords(category: Category) -> &'static [&'static str] {
    match category {
        Category::Work => WORK_KEYWORDS,
        Category::Personal => PERSONAL_KEYWORDS,
        Category::Promotional => PROMOTIONAL_KEYWORDS,
        Category::Social => SOCIAL_KEYWORDS,
    }
}

/// Highest keyword score wins; ties keep the earlier category and a text
/// with no hits at all is work mail.
pub fn classify_category(text: &str) -> Category {
    let lower = text.to_lowercase();
    let mut best = Category::Work;
    let mut best_score = 0;

    for category in Category::ALL {
        let score = count_present(&lower, category_keywords(category));
        if score > best_score {
            best = category;
            best_score = score;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_keeps_base_score() {
        assert_eq!(urgency_score("Lunch menu attached."), BASE_URGENCY);
    }

    #[test]
    fn keyword_classes_add_up() {
        // urgent (+2), asap (+2), please (+1)
        assert_eq!(urgency_score("Urgent: please reply asap"), 10.0);
        // fyi (-1), no rush (-1)
        assert_eq!(urgency_score("FYI, no rush on this one."), 3.0);
    }

    #[test]
    fn time_sensitive_phrasing_adds_a_bonus() {
        // today (+2) and "by today" (+1.5)
        assert_eq!(urgency_score("Send the slides by today."), 8.5);
    }

    #[test]
    fn question_marks_are_capped() {
        assert_eq!(urgency_score("Lunch?"), 5.5);
        assert_eq!(urgency_score("Lunch? Coffee? Tea? Cake? Pie? More?"), 7.0);
    }

    #[test]
    fn score_is_clamped_to_bounds() {
        let screaming = "URGENT emergency critical asap immediately deadline today need asap";
        assert_eq!(urgency_score(screaming), MAX_URGENCY);

        let relaxed = "fyi for your information, no rush, whenever. when you can.";
        assert!(urgency_score(relaxed) >= MIN_URGENCY);
        assert_eq!(urgency_score(relaxed), 1.0);
    }

    #[test]
    fn category_defaults_to_work_without_hits() {
        assert_eq!(classify_category("Hello there"), Category::Work);
        assert_eq!(classify_category(""), Category::Work);
    }

    #[test]
    fn category_picks_highest_score() {
        assert_eq!(
            classify_category("Huge SALE this weekend: discount on every deal"),
            Category::Promotional
        );
        assert_eq!(
            classify_category("Connect with me on LinkedIn to grow your network"),
            Category::Social
        );
    }

    #[test]
    fn category_ties_follow_declaration_order() {
        // one work hit (meeting) and one personal hit (birthday)
        assert_eq!(classify_category("birthday meeting"), Category::Work);
        // one personal hit (family) and one promotional hit (sale)
        assert_eq!(classify_category("family sale"), Category::Personal);
    }
}
