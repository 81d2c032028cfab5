use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use mailroom_core::types::DateMention;
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

const DATE_PATTERNS: &[&str] = &[
    r"(?i)\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+\d{4}\b",
    r"\b\d{1,2}/\d{1,2}/\d{4}\b",
    r"\b\d{4}-\d{2}-\d{2}\b",
    r"(?i)\b(?:today|tomorrow|yesterday)\b",
    r"(?i)\b(?:next|this)\s+(?:week|month|monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
    r"(?i)\b\d{1,2}:\d{2}\s*(?:AM|PM)?\b",
];

fn date_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| DATE_PATTERNS.iter().map(|p| Regex::new(p).unwrap()).collect())
}

fn clock_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\d{1,2}):(\d{2})\s*(am|pm)?$").unwrap())
}

/// Every date-like phrase in `text`, pattern by pattern in a fixed order.
///
/// Matches that cannot be resolved keep `parsed: None`; they are never
/// dropped. Relative phrases resolve against `now`.
pub fn extract(text: &str, now: DateTime<Utc>) -> Vec<DateMention> {
    let mut mentions = Vec::new();

    for pattern in date_patterns() {
        for m in pattern.find_iter(text) {
            let raw = m.as_str().trim_end();
            mentions.push(DateMention {
                text: raw.to_string(),
                parsed: parse_fuzzy(raw, now),
                start: m.start(),
                end: m.start() + raw.len(),
            });
        }
    }

    mentions
}

/// Raw phrase texts only, for entity tagging.
pub fn phrases(text: &str) -> Vec<String> {
    date_patterns()
        .iter()
        .flat_map(|p| p.find_iter(text).map(|m| m.as_str().trim_end().to_string()))
        .collect()
}

pub fn parse_fuzzy(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = raw.trim().to_lowercase();
    let today = now.date_naive();

    match lower.as_str() {
        "today" => return midnight(today),
        "tomorrow" => return midnight(today + Duration::days(1)),
        "yesterday" => return midnight(today - Duration::days(1)),
        _ => {}
    }

    if let Some(rest) = lower.strip_prefix("this ") {
        return relative(rest.trim(), today, false);
    }
    if let Some(rest) = lower.strip_prefix("next ") {
        return relative(rest.trim(), today, true);
    }

    if let Some(caps) = clock_re().captures(&lower) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        let hour = match caps.get(3).map(|m| m.as_str()) {
            Some(_) if !(1..=12).contains(&hour) => return None,
            Some("am") => hour % 12,
            Some(_) => hour % 12 + 12,
            None => hour,
        };
        let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
        return Some(Utc.from_utc_datetime(&today.and_time(time)));
    }

    let normalized = lower.replace(',', " ");
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    ["%B %d %Y", "%m/%d/%Y", "%d/%m/%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
        .and_then(midnight)
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn relative(unit: &str, today: NaiveDate, next: bool) -> Option<DateTime<Utc>> {
    match unit {
        "week" if next => midnight(today + Duration::weeks(1)),
        "week" => midnight(today),
        "month" => {
            let (year, month) = match (next, today.month()) {
                (false, m) => (today.year(), m),
                (true, 12) => (today.year() + 1, 1),
                (true, m) => (today.year(), m + 1),
            };
            midnight(NaiveDate::from_ymd_opt(year, month, 1)?)
        }
        day => {
            let target = Weekday::from_str(day).ok()?;
            let ahead = (7 + target.num_days_from_monday() as i64
                - today.weekday().num_days_from_monday() as i64)
                % 7;
            let ahead = if next && ahead == 0 { 7 } else { ahead };
            midnight(today + Duration::days(ahead))
        }
    }
}
