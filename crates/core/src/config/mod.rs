//! Process configuration, read once at startup and handed to components
//! through their constructors.

use crate::error::{MailroomError, Result};
use crate::types::ProviderKind;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://mailroom.db";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo-preview";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-sonnet-20240229";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
pub const DEFAULT_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const GMAIL_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.modify",
];

const CALENDAR_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar.events",
];

/// A credential string that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: Option<Secret>,
    pub model: String,
    pub base_url: String,
}

impl ProviderSettings {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Opaque OAuth bundle handed to the mailbox and calendar clients.
/// Refreshing it is the client's concern.
#[derive(Debug, Clone)]
pub struct TokenBundle {
    pub access_token: Secret,
    pub refresh_token: Option<Secret>,
    pub token_uri: String,
    pub client_id: Option<String>,
    pub client_secret: Option<Secret>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub query: String,
    pub max_results: u32,
    pub interval: Duration,
    /// Cron expression; takes precedence over `interval` when set.
    pub schedule: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub default_provider: ProviderKind,
    pub provider_timeout: Duration,
    pub gmail: Option<TokenBundle>,
    pub calendar: Option<TokenBundle>,
    pub gmail_api_base: String,
    pub calendar_api_base: String,
    pub sync: SyncSettings,
    pub worker_concurrency: usize,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let openai = ProviderSettings {
            api_key: get("OPENAI_API_KEY").map(Secret::new),
            model: get_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            base_url: get_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
        };
        let anthropic = ProviderSettings {
            api_key: get("ANTHROPIC_API_KEY").map(Secret::new),
            model: get_or("ANTHROPIC_MODEL", DEFAULT_ANTHROPIC_MODEL),
            base_url: get_or("ANTHROPIC_BASE_URL", DEFAULT_ANTHROPIC_BASE_URL),
        };

        let default_provider = match get("DEFAULT_PROVIDER") {
            Some(raw) => ProviderKind::from_str(&raw).map_err(|_| {
                MailroomError::Configuration(format!("Unknown DEFAULT_PROVIDER '{}'", raw))
            })?,
            None => ProviderKind::OpenAi,
        };

        let token_uri = get_or("GOOGLE_TOKEN_URI", DEFAULT_TOKEN_URI);
        let client_id = get("GMAIL_CLIENT_ID");
        let client_secret = get("GMAIL_CLIENT_SECRET").map(Secret::new);

        let gmail = get("GMAIL_ACCESS_TOKEN").map(|token| TokenBundle {
            access_token: Secret::new(token),
            refresh_token: get("GMAIL_REFRESH_TOKEN").map(Secret::new),
            token_uri: token_uri.clone(),
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            scopes: GMAIL_SCOPES.iter().map(|s| s.to_string()).collect(),
        });

        let calendar = get("GOOGLE_CALENDAR_ACCESS_TOKEN")
            .map(|token| TokenBundle {
                access_token: Secret::new(token),
                refresh_token: get("GOOGLE_CALENDAR_REFRESH_TOKEN").map(Secret::new),
                token_uri: token_uri.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                scopes: CALENDAR_SCOPES.iter().map(|s| s.to_string()).collect(),
            })
            .or_else(|| {
                gmail.clone().map(|bundle| TokenBundle {
                    scopes: CALENDAR_SCOPES.iter().map(|s| s.to_string()).collect(),
                    ..bundle
                })
            });

        let interval_secs: u64 = parse_number(&get, "SYNC_INTERVAL_SECS", 120)?;
        if interval_secs == 0 {
            return Err(MailroomError::Configuration(
                "SYNC_INTERVAL_SECS must be at least 1".into(),
            ));
        }
        let sync = SyncSettings {
            query: get("SYNC_QUERY").unwrap_or_default(),
            max_results: parse_number(&get, "SYNC_MAX_RESULTS", 50)?,
            interval: Duration::from_secs(interval_secs),
            schedule: get("SYNC_SCHEDULE"),
        };

        let worker_concurrency: usize = parse_number(&get, "WORKER_CONCURRENCY", 4)?;
        if worker_concurrency == 0 {
            return Err(MailroomError::Configuration(
                "WORKER_CONCURRENCY must be at least 1".into(),
            ));
        }

        Ok(Self {
            database_url: get_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            openai,
            anthropic,
            default_provider,
            provider_timeout: Duration::from_secs(parse_number(&get, "PROVIDER_TIMEOUT_SECS", 30)?),
            gmail,
            calendar,
            gmail_api_base: get_or("GMAIL_API_BASE", DEFAULT_GMAIL_API_BASE),
            calendar_api_base: get_or("CALENDAR_API_BASE", DEFAULT_CALENDAR_API_BASE),
            sync,
            worker_concurrency,
            log_level: get_or("LOG_LEVEL", "info").to_lowercase(),
        })
    }

    pub fn provider(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.into(),
            openai: ProviderSettings {
                api_key: None,
                model: DEFAULT_OPENAI_MODEL.into(),
                base_url: DEFAULT_OPENAI_BASE_URL.into(),
            },
            anthropic: ProviderSettings {
                api_key: None,
                model: DEFAULT_ANTHROPIC_MODEL.into(),
                base_url: DEFAULT_ANTHROPIC_BASE_URL.into(),
            },
            default_provider: ProviderKind::OpenAi,
            provider_timeout: Duration::from_secs(30),
            gmail: None,
            calendar: None,
            gmail_api_base: DEFAULT_GMAIL_API_BASE.into(),
            calendar_api_base: DEFAULT_CALENDAR_API_BASE.into(),
            sync: SyncSettings {
                query: String::new(),
                max_results: 50,
                interval: Duration::from_secs(120),
                schedule: None,
            },
            worker_concurrency: 4,
            log_level: "info".into(),
        }
    }
}

fn parse_number<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|_| {
            MailroomError::Configuration(format!("{} must be a number, got '{}'", key, raw))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.default_provider, ProviderKind::OpenAi);
        assert!(!config.openai.is_configured());
        assert!(!config.anthropic.is_configured());
        assert!(config.gmail.is_none());
        assert!(config.calendar.is_none());
        assert_eq!(config.sync.max_results, 50);
        assert_eq!(config.provider_timeout, Duration::from_secs(30));
        assert_eq!(config.worker_concurrency, 4);
    }

    #[test]
    fn blank_keys_count_as_missing() {
        let config = config_from(&[("OPENAI_API_KEY", "   "), ("ANTHROPIC_API_KEY", "sk-ant")]).unwrap();
        assert!(!config.openai.is_configured());
        assert!(config.anthropic.is_configured());
        assert_eq!(config.provider(ProviderKind::Anthropic).model, DEFAULT_ANTHROPIC_MODEL);
    }

    #[test]
    fn calendar_reuses_gmail_token_when_not_given_its_own() {
        let config = config_from(&[("GMAIL_ACCESS_TOKEN", "ya29.token")]).unwrap();
        let calendar = config.calendar.expect("calendar bundle");
        assert_eq!(calendar.access_token.expose(), "ya29.token");
        assert!(calendar.scopes.iter().all(|s| s.contains("calendar")));
    }

    #[test]
    fn malformed_numbers_are_configuration_errors() {
        let err = config_from(&[("SYNC_MAX_RESULTS", "lots")]).unwrap_err();
        assert!(matches!(err, MailroomError::Configuration(_)));

        let err = config_from(&[("WORKER_CONCURRENCY", "0")]).unwrap_err();
        assert!(matches!(err, MailroomError::Configuration(_)));
    }

    #[test]
    fn zero_sync_interval_is_rejected() {
        let err = config_from(&[("SYNC_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(matches!(err, MailroomError::Configuration(_)));
        assert!(err.to_string().contains("SYNC_INTERVAL_SECS"));

        let config = config_from(&[("SYNC_INTERVAL_SECS", "1")]).unwrap();
        assert_eq!(config.sync.interval, Duration::from_secs(1));
    }

    #[test]
    fn unknown_default_provider_is_rejected() {
        let err = config_from(&[("DEFAULT_PROVIDER", "cohere")]).unwrap_err();
        assert!(err.to_string().contains("cohere"));

        let config = config_from(&[("DEFAULT_PROVIDER", "anthropic")]).unwrap();
        assert_eq!(config.default_provider, ProviderKind::Anthropic);
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let config = config_from(&[("OPENAI_API_KEY", "sk-live-123")]).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-live-123"));
        assert!(rendered.contains("Secret(***)"));
    }
}
