use mailroom_core::config::{ProviderSettings, Secret};
use mailroom_core::error::{MailroomError, Result};
use mailroom_core::types::ProviderKind;

/// Key, endpoint and model for one hosted provider. A provider without a
/// key stays registered but reports itself unavailable.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    kind: ProviderKind,
    api_key: Option<Secret>,
    base_url: String,
    model: String,
}

impl ApiCredentials {
    pub fn from_settings(kind: ProviderKind, settings: &ProviderSettings) -> Self {
        Self {
            kind,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn key(&self) -> Result<&str> {
        self.api_key.as_ref().map(Secret::expose).ok_or_else(|| {
            MailroomError::Configuration(format!("No API key configured for provider '{}'", self.kind))
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
