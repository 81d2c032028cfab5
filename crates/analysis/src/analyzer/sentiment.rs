use mailroom_core::types::{Sentiment, SentimentScore};
use regex::Regex;
use std::sync::OnceLock;

/// (word, polarity, subjectivity)
const LEXICON: &[(&str, f64, f64)] = &[
    ("good", 0.7, 0.6),
    ("great", 0.8, 0.75),
    ("excellent", 1.0, 1.0),
    ("amazing", 0.6, 0.9),
    ("awesome", 1.0, 1.0),
    ("wonderful", 1.0, 1.0),
    ("fantastic", 0.4, 0.9),
    ("perfect", 1.0, 1.0),
    ("best", 1.0, 0.3),
    ("nice", 0.6, 1.0),
    ("happy", 0.8, 1.0),
    ("glad", 0.5, 1.0),
    ("pleased", 0.5, 1.0),
    ("excited", 0.375, 0.75),
    ("love", 0.5, 0.6),
    ("appreciate", 0.4, 0.5),
    ("thanks", 0.2, 0.2),
    ("thank", 0.2, 0.2),
    ("helpful", 0.5, 0.5),
    ("successful", 0.75, 0.95),
    ("congratulations", 0.5, 0.5),
    ("welcome", 0.8, 0.9),
    ("easy", 0.43, 0.83),
    ("fine", 0.4, 0.5),
    ("bad", -0.7, 0.67),
    ("terrible", -1.0, 1.0),
    ("awful", -1.0, 1.0),
    ("horrible", -1.0, 1.0),
    ("worst", -1.0, 1.0),
    ("poor", -0.4, 0.6),
    ("sad", -0.5, 1.0),
    ("angry", -0.5, 1.0),
    ("hate", -0.8, 0.9),
    ("disappointed", -0.75, 0.75),
    ("disappointing", -0.6, 0.7),
    ("unhappy", -0.6, 0.9),
    ("wrong", -0.5, 0.9),
    ("broken", -0.4, 0.4),
    ("failed", -0.5, 0.3),
    ("annoying", -0.8, 0.9),
    ("frustrated", -0.7, 0.4),
    ("frustrating", -0.4, 0.6),
    ("unacceptable", -0.6, 0.8),
    ("worried", -0.4, 0.6),
    ("concerned", -0.2, 0.4),
    ("sorry", -0.5, 1.0),
    ("unfortunately", -0.5, 1.0),
    ("difficult", -0.5, 1.0),
    ("late", -0.3, 0.6),
    ("delayed", -0.2, 0.4),
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("really", 1.3),
    ("extremely", 1.5),
    ("incredibly", 1.5),
    ("super", 1.3),
    ("quite", 1.1),
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "wasn't", "won't", "can't",
    "cannot", "aren't", "weren't",
];

/// Flips and dampens a negated word's polarity.
const NEGATION_FACTOR: f64 = -0.5;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z]+(?:'[a-z]+)?").unwrap())
}

fn lookup<'a, T: Copy>(table: &'a [(&'a str, T)], word: &str) -> Option<T> {
    table.iter().find(|(w, _)| *w == word).map(|(_, v)| *v)
}

fn lexicon_entry(word: &str) -> Option<(f64, f64)> {
    LEXICON
        .iter()
        .find(|(w, _, _)| *w == word)
        .map(|(_, p, s)| (*p, *s))
}

/// Lexicon sentiment averaged over the opinion words found in `text`.
///
/// An intensifier directly before an opinion word scales it; a negation
/// within the two preceding tokens flips and halves it. Text with no
/// opinion words scores neutral with zero confidence.
pub fn score(text: &str) -> SentimentScore {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = token_re().find_iter(&lower).map(|m| m.as_str()).collect();

    let mut polarities = Vec::new();
    let mut subjectivities = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        let Some((mut polarity, mut subjectivity)) = lexicon_entry(token) else {
            continue;
        };

        if idx > 0 {
            if let Some(factor) = lookup(INTENSIFIERS, tokens[idx - 1]) {
                polarity *= factor;
                subjectivity *= factor;
            }
        }

        let window = idx.saturating_sub(2)..idx;
        if tokens[window].iter().any(|t| NEGATIONS.contains(t)) {
            polarity *= NEGATION_FACTOR;
        }

        polarities.push(polarity.clamp(-1.0, 1.0));
        subjectivities.push(subjectivity.clamp(0.0, 1.0));
    }

    if polarities.is_empty() {
        return SentimentScore::neutral();
    }

    let polarity = mean(&polarities).clamp(-1.0, 1.0);
    let subjectivity = mean(&subjectivities).clamp(0.0, 1.0);

    SentimentScore {
        label: Sentiment::from_polarity(polarity),
        polarity,
        subjectivity,
        confidence: polarity.abs(),
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_opinion_words_is_neutral() {
        let s = score("The quarterly numbers are attached.");
        assert_eq!(s.label, Sentiment::Neutral);
        assert_eq!(s.polarity, 0.0);
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn positive_and_negative_text() {
        assert_eq!(score("Great work, the demo was excellent!").label, Sentiment::Positive);
        assert_eq!(
            score("This is unacceptable, the build is broken again.").label,
            Sentiment::Negative
        );
    }

    #[test]
    fn negation_flips_polarity() {
        let s = score("The rollout was not good.");
        assert!(s.polarity < 0.0);
        assert_eq!(s.label, Sentiment::Negative);
    }

    #[test]
    fn intensifier_strengthens_but_stays_in_range() {
        let plain = score("good").polarity;
        let strong = score("really good").polarity;
        assert!(strong > plain);
        assert!(score("extremely perfect").polarity <= 1.0);
    }

    #[test]
    fn confidence_tracks_magnitude() {
        let s = score("terrible");
        assert_eq!(s.confidence, 1.0);
        assert!((0.0..=1.0).contains(&s.subjectivity));
    }
}
