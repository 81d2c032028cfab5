use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_MAX_KEYWORDS: usize = 10;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see",
    "two", "way", "who", "boy", "did", "its", "let", "put", "say", "she", "too", "use", "this",
    "that", "with", "from", "have", "will", "your", "they", "them", "then", "than", "there",
    "their", "what", "when", "where", "which", "would", "could", "should", "about", "been",
    "were", "into", "just", "also", "some", "any", "more", "most", "very", "only", "over",
    "such", "here", "each", "other", "these", "those", "being", "does", "doing", "because",
    "while", "after", "before", "again", "once", "both", "same", "own", "off", "why", "may",
    "might", "must", "shall", "yours", "ours", "hers", "myself", "yourself", "itself",
];

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-zA-Z]{3,}\b").unwrap())
}

/// Most frequent non-stop words of three letters or more, lowercased.
/// Equal counts keep first-appearance order.
pub fn extract(text: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();

    for (position, m) in word_re().find_iter(text).enumerate() {
        let word = m.as_str().to_lowercase();
        if STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked.into_iter().take(limit).map(|(word, _, _)| word).collect()
}
