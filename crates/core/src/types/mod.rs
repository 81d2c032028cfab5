mod analysis;
mod message;
mod schedule;

pub use analysis::*;
pub use message::*;
pub use schedule::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Derived from the urgency score alone; never stored apart from it.
    pub fn from_urgency(score: f64) -> Self {
        if score >= 7.0 {
            Priority::High
        } else if score >= 4.0 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

/// Declaration order doubles as the tie-break order during classification.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Category {
    Work,
    Personal,
    Promotional,
    Social,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Work,
        Category::Personal,
        Category::Promotional,
        Category::Social,
    ];
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn from_polarity(polarity: f64) -> Self {
        if polarity > 0.1 {
            Sentiment::Positive
        } else if polarity < -0.1 {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ReplyTone {
    #[default]
    Professional,
    Friendly,
    Brief,
}

impl ReplyTone {
    /// Unknown tones fall back to professional phrasing.
    pub fn parse_lenient(raw: &str) -> Self {
        ReplyTone::from_str(raw.trim()).unwrap_or_default()
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    #[strum(serialize = "anthropic")]
    Anthropic,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Anthropic];
}

/// Why an extractor result was substituted with a deterministic default.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    NoProvider,
    Timeout,
    Upstream(String),
    Malformed(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NoProvider => write!(f, "no provider configured"),
            FallbackReason::Timeout => write!(f, "provider call timed out"),
            FallbackReason::Upstream(msg) => write!(f, "provider call failed: {}", msg),
            FallbackReason::Malformed(msg) => write!(f, "malformed provider output: {}", msg),
        }
    }
}

/// Output of a generative step, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated<T> {
    Provider { value: T, provider: ProviderKind },
    Fallback { value: T, reason: FallbackReason },
}

impl<T> Generated<T> {
    pub fn value(&self) -> &T {
        match self {
            Generated::Provider { value, .. } | Generated::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Generated::Provider { value, .. } | Generated::Fallback { value, .. } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Generated::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<&FallbackReason> {
        match self {
            Generated::Fallback { reason, .. } => Some(reason),
            Generated::Provider { .. } => None,
        }
    }

    pub fn provider(&self) -> Option<ProviderKind> {
        match self {
            Generated::Provider { provider, .. } => Some(*provider),
            Generated::Fallback { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_thresholds() {
        assert_eq!(Priority::from_urgency(7.0), Priority::High);
        assert_eq!(Priority::from_urgency(6.99), Priority::Medium);
        assert_eq!(Priority::from_urgency(4.0), Priority::Medium);
        assert_eq!(Priority::from_urgency(3.9), Priority::Low);
        assert_eq!(Priority::from_urgency(10.0), Priority::High);
        assert_eq!(Priority::from_urgency(1.0), Priority::Low);
    }

    #[test]
    fn sentiment_band_is_exclusive_at_point_one() {
        assert_eq!(Sentiment::from_polarity(0.1), Sentiment::Neutral);
        assert_eq!(Sentiment::from_polarity(0.11), Sentiment::Positive);
        assert_eq!(Sentiment::from_polarity(-0.1), Sentiment::Neutral);
        assert_eq!(Sentiment::from_polarity(-0.5), Sentiment::Negative);
    }

    #[test]
    fn unknown_tone_is_professional() {
        assert_eq!(ReplyTone::parse_lenient("Friendly"), ReplyTone::Friendly);
        assert_eq!(ReplyTone::parse_lenient("brief"), ReplyTone::Brief);
        assert_eq!(ReplyTone::parse_lenient("sarcastic"), ReplyTone::Professional);
    }

    #[test]
    fn provider_kind_round_trips_through_strings() {
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("Anthropic".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!(ProviderKind::OpenAi.to_string(), "openai");
        assert!("cohere".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn generated_exposes_value_and_origin() {
        let fresh = Generated::Provider {
            value: 3,
            provider: ProviderKind::Anthropic,
        };
        assert!(!fresh.is_degraded());
        assert_eq!(fresh.provider(), Some(ProviderKind::Anthropic));

        let degraded = Generated::Fallback {
            value: 0,
            reason: FallbackReason::Timeout,
        };
        assert!(degraded.is_degraded());
        assert_eq!(degraded.fallback_reason(), Some(&FallbackReason::Timeout));
        assert_eq!(degraded.into_value(), 0);
    }
}
