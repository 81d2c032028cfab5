pub mod creds;

use async_trait::async_trait;
use mailroom_core::config::Config;
use mailroom_core::error::{MailroomError, Result};
use mailroom_core::types::ProviderKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use creds::ApiCredentials;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[async_trait]
pub trait AiProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// Whether a usable credential is configured. Checked before dispatch.
    fn is_available(&self) -> bool;

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: Option<ResponseFormat>,
    // Overrides the provider's configured model
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseFormat {
    #[serde(rename = "json_object")]
    Json,
    #[serde(rename = "text")]
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

fn upstream(e: reqwest::Error) -> MailroomError {
    MailroomError::UpstreamUnavailable(e.to_string())
}

async fn json_or_status(response: reqwest::Response, kind: ProviderKind) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MailroomError::UpstreamUnavailable(format!(
            "{} returned {}: {}",
            kind,
            status.as_u16(),
            body
        )));
    }

    response
        .json()
        .await
        .map_err(|e| MailroomError::MalformedPayload(e.to_string()))
}

/// Chat completions against an OpenAI-compatible endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    creds: ApiCredentials,
}

impl OpenAiProvider {
    pub fn new(creds: ApiCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            creds,
        }
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        self.creds.model()
    }

    fn is_available(&self) -> bool {
        self.creds.is_present()
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let key = self.creds.key()?;
        let url = self.creds.endpoint("chat/completions");
        let model = request.model.unwrap_or_else(|| self.creds.model().to_string());

        let mut payload = serde_json::json!({
            "model": model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if let Some(format) = request.response_format {
            payload["response_format"] = serde_json::to_value(format)
                .map_err(|e| MailroomError::Internal(e.to_string()))?;
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await
            .map_err(upstream)?;
        let body = json_or_status(response, self.kind()).await?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| MailroomError::MalformedPayload("OpenAI response has no message content".into()))?
            .trim()
            .to_string();

        let usage = Usage {
            prompt_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };
        debug!("OpenAI completion: {} prompt / {} completion tokens", usage.prompt_tokens, usage.completion_tokens);

        Ok(ChatResponse { content, usage })
    }
}

/// The Anthropic messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    creds: ApiCredentials,
}

impl AnthropicProvider {
    pub fn new(creds: ApiCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            creds,
        }
    }
}

/// Anthropic takes the system prompt as a top-level field rather than a message.
fn split_system(messages: Vec<ChatMessage>) -> (Option<String>, Vec<ChatMessage>) {
    let mut system = Vec::new();
    let mut rest = Vec::new();
    for message in messages {
        match message.role {
            Role::System => system.push(message.content),
            _ => rest.push(message),
        }
    }
    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, rest)
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        self.creds.model()
    }

    fn is_available(&self) -> bool {
        self.creds.is_present()
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let key = self.creds.key()?;
        let url = self.creds.endpoint("v1/messages");
        let model = request.model.unwrap_or_else(|| self.creds.model().to_string());
        let (system, messages) = split_system(request.messages);

        let mut payload = serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": messages,
        });
        if let Some(system) = system {
            payload["system"] = serde_json::Value::String(system);
        }

        let response = self
            .client
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(upstream)?;
        let body = json_or_status(response, self.kind()).await?;

        let content = body["content"][0]["text"]
            .as_str()
            .ok_or_else(|| MailroomError::MalformedPayload("Anthropic response has no text block".into()))?
            .trim()
            .to_string();

        let usage = Usage {
            prompt_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(ChatResponse { content, usage })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub kind: ProviderKind,
    pub available: bool,
    pub model: String,
    pub is_default: bool,
}

/// Every known provider, each reporting its own availability.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn AiProvider>>,
    default: ProviderKind,
}

impl ProviderRegistry {
    pub fn new(default: ProviderKind, providers: Vec<Arc<dyn AiProvider>>) -> Self {
        Self { providers, default }
    }

    pub fn from_config(config: &Config) -> Self {
        let openai = ApiCredentials::from_settings(ProviderKind::OpenAi, config.provider(ProviderKind::OpenAi));
        let anthropic =
            ApiCredentials::from_settings(ProviderKind::Anthropic, config.provider(ProviderKind::Anthropic));

        Self::new(
            config.default_provider,
            vec![
                Arc::new(OpenAiProvider::new(openai)),
                Arc::new(AnthropicProvider::new(anthropic)),
            ],
        )
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn AiProvider>> {
        self.providers.iter().find(|p| p.kind() == kind).cloned()
    }

    /// A named provider must be usable, otherwise the caller gets a
    /// configuration error. Without a name the default is tried first,
    /// then any available provider; `Ok(None)` means none is configured.
    pub fn resolve(&self, requested: Option<ProviderKind>) -> Result<Option<Arc<dyn AiProvider>>> {
        if let Some(kind) = requested {
            return match self.get(kind) {
                Some(provider) if provider.is_available() => Ok(Some(provider)),
                _ => Err(MailroomError::Configuration(format!(
                    "Provider '{}' is not available or API key missing",
                    kind
                ))),
            };
        }

        let preferred = self.get(self.default).filter(|p| p.is_available());
        Ok(preferred.or_else(|| self.providers.iter().find(|p| p.is_available()).cloned()))
    }

    pub fn any_available(&self) -> bool {
        self.providers.iter().any(|p| p.is_available())
    }

    pub fn status(&self) -> Vec<ProviderStatus> {
        self.providers
            .iter()
            .map(|p| ProviderStatus {
                kind: p.kind(),
                available: p.is_available(),
                model: p.model().to_string(),
                is_default: p.kind() == self.default,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailroom_core::config::Secret;

    fn config(openai: Option<&str>, anthropic: Option<&str>, default: ProviderKind) -> Config {
        let mut config = Config::default();
        config.openai.api_key = openai.map(Secret::new);
        config.anthropic.api_key = anthropic.map(Secret::new);
        config.default_provider = default;
        config
    }

    #[test]
    fn named_provider_without_key_is_configuration_error() {
        let registry = ProviderRegistry::from_config(&config(Some("sk"), None, ProviderKind::OpenAi));
        let err = registry.resolve(Some(ProviderKind::Anthropic)).err().unwrap();
        assert!(matches!(err, MailroomError::Configuration(_)));

        let picked = registry.resolve(Some(ProviderKind::OpenAi)).unwrap().unwrap();
        assert_eq!(picked.kind(), ProviderKind::OpenAi);
    }

    #[test]
    fn unnamed_falls_back_from_default_to_any_available() {
        let registry = ProviderRegistry::from_config(&config(None, Some("sk-ant"), ProviderKind::OpenAi));
        let picked = registry.resolve(None).unwrap().unwrap();
        assert_eq!(picked.kind(), ProviderKind::Anthropic);
    }

    #[test]
    fn nothing_configured_resolves_to_none() {
        let registry = ProviderRegistry::from_config(&Config::default());
        assert!(registry.resolve(None).unwrap().is_none());
        assert!(!registry.any_available());
    }

    #[test]
    fn status_reports_each_provider() {
        let registry = ProviderRegistry::from_config(&config(Some("sk"), None, ProviderKind::Anthropic));
        let status = registry.status();
        assert_eq!(status.len(), 2);
        assert!(status[0].available && !status[0].is_default);
        assert!(!status[1].available && status[1].is_default);
        assert_eq!(status[1].model, mailroom_core::config::DEFAULT_ANTHROPIC_MODEL);
    }

    #[test]
    fn system_messages_are_lifted_out_for_anthropic() {
        let (system, rest) = split_system(vec![
            ChatMessage::system("Be terse."),
            ChatMessage::user("Hello"),
        ]);
        assert_eq!(system.as_deref(), Some("Be terse."));
        assert_eq!(rest, vec![ChatMessage::user("Hello")]);
    }

    #[test]
    fn json_format_serializes_as_openai_expects() {
        let value = serde_json::to_value(ResponseFormat::Json).unwrap();
        assert_eq!(value, serde_json::json!({"type": "json_object"}));
    }
}
