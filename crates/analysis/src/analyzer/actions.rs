use regex::Regex;
use std::sync::OnceLock;

pub const MAX_ACTION_ITEMS: usize = 5;
const MIN_ACTION_LEN: usize = 10;

fn action_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r"(?i)(?:please|could you|can you|would you)\s+([^.!?]+)",
            r"(?i)(?:need to|have to|must|should)\s+([^.!?]+)",
            r"(?i)(?:action required|action needed|todo|to do):\s*([^.!?]+)",
            r"(?i)(?:deadline|due)\s+([^.!?]+)",
            r"(?i)(?:schedule|arrange|set up)\s+([^.!?]+)",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// Imperative phrases from `body`, in pattern order, at most five.
pub fn extract(body: &str) -> Vec<String> {
    let mut items = Vec::new();

    for pattern in action_patterns() {
        for caps in pattern.captures_iter(body) {
            let Some(phrase) = caps.get(1) else { continue };
            let phrase = phrase.as_str().trim();
            if phrase.chars().count() >= MIN_ACTION_LEN {
                items.push(phrase.to_string());
            }
            if items.len() == MAX_ACTION_ITEMS {
                return items;
            }
        }
    }

    items
}
