use async_trait::async_trait;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{SecondsFormat, TimeZone, Utc};
use mailroom_core::config::TokenBundle;
use mailroom_core::error::Result;
use mailroom_core::types::FetchedMessage;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::auth::{json_body, GoogleAuth};
use crate::mime::OutgoingMessage;

/// Gmail encodes bodies as base64url, with or without padding.
const GMAIL_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Messages matching `query`, newest first, at most `max_results`.
    async fn fetch_messages(&self, query: &str, max_results: u32) -> Result<Vec<FetchedMessage>>;

    /// Sends a message and returns the provider's id for it.
    async fn send_message(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        html_body: Option<&str>,
    ) -> Result<String>;

    async fn mark_read(&self, external_id: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    label_ids: Vec<String>,
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<MessagePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    attachment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

pub struct GmailClient {
    auth: GoogleAuth,
    api_base: String,
}

impl GmailClient {
    pub fn new(bundle: TokenBundle, api_base: impl Into<String>) -> Self {
        Self {
            auth: GoogleAuth::new(bundle, reqwest::Client::new()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_full(&self, id: &str) -> Result<FetchedMessage> {
        let url = format!("{}/messages/{}", self.api_base, id);
        let resp = self
            .auth
            .send(|http, token| http.get(&url).bearer_auth(token).query(&[("format", "full")]))
            .await?;
        let message: GmailMessage = json_body(resp).await?;
        Ok(parse_message(message))
    }
}

#[async_trait]
impl MailboxClient for GmailClient {
    async fn fetch_messages(&self, query: &str, max_results: u32) -> Result<Vec<FetchedMessage>> {
        let url = format!("{}/messages", self.api_base);
        let max = max_results.to_string();
        let resp = self
            .auth
            .send(|http, token| {
                http.get(&url)
                    .bearer_auth(token)
                    .query(&[("q", query), ("maxResults", max.as_str())])
            })
            .await?;
        let list: MessageListResponse = json_body(resp).await?;

        let mut messages = Vec::with_capacity(list.messages.len());
        for stub in &list.messages {
            match self.fetch_full(&stub.id).await {
                Ok(message) => messages.push(message),
                Err(e) => warn!("Skipping Gmail message {}: {}", stub.id, e),
            }
        }

        info!("Fetched {} of {} Gmail messages", messages.len(), list.messages.len());
        Ok(messages)
    }

    async fn send_message(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        html_body: Option<&str>,
    ) -> Result<String> {
        let outgoing = OutgoingMessage {
            to,
            subject,
            text: body,
            html: html_body,
        };
        let seed = Utc::now().timestamp_micros().to_string();
        let payload = json!({ "raw": outgoing.to_raw(&seed) });
        let url = format!("{}/messages/send", self.api_base);

        let resp = self
            .auth
            .send(|http, token| http.post(&url).bearer_auth(token).json(&payload))
            .await?;
        let sent: SendResponse = json_body(resp).await?;

        info!("Sent message {} to {}", sent.id, to);
        Ok(sent.id)
    }

    async fn mark_read(&self, external_id: &str) -> Result<()> {
        let url = format!("{}/messages/{}/modify", self.api_base, external_id);
        let payload = json!({ "removeLabelIds": ["UNREAD"] });
        self.auth
            .send(|http, token| http.post(&url).bearer_auth(token).json(&payload))
            .await?;
        debug!("Marked {} read remotely", external_id);
        Ok(())
    }
}

fn parse_message(message: GmailMessage) -> FetchedMessage {
    let payload = message.payload.unwrap_or_default();
    let header = |name: &str| -> Option<String> {
        payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    };

    let timestamp = message
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .or_else(|| header("Date"))
        .unwrap_or_else(|| {
            warn!("Message {} has no date, using fetch time", message.id);
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        });

    let mut bodies = Bodies::default();
    bodies.collect(&payload);

    FetchedMessage {
        external_id: message.id,
        thread_id: message.thread_id,
        sender: header("From").unwrap_or_default(),
        recipient: header("To").unwrap_or_default(),
        subject: header("Subject").unwrap_or_default(),
        body_text: bodies.text.unwrap_or_default(),
        body_html: bodies.html,
        timestamp,
        has_attachment: bodies.has_attachment,
        labels: message.label_ids,
    }
}

#[derive(Default)]
struct Bodies {
    text: Option<String>,
    html: Option<String>,
    has_attachment: bool,
}

impl Bodies {
    /// Depth-first; the first plain and first HTML part win.
    fn collect(&mut self, part: &MessagePart) {
        let attachment_id = part.body.as_ref().and_then(|b| b.attachment_id.as_ref());
        if !part.filename.is_empty() || attachment_id.is_some() {
            self.has_attachment = true;
        } else if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            let slot = match part.mime_type.as_str() {
                "text/plain" => &mut self.text,
                "text/html" => &mut self.html,
                _ => return self.collect_children(part),
            };
            if slot.is_none() {
                *slot = decode_body(data);
            }
        }
        self.collect_children(part);
    }

    fn collect_children(&mut self, part: &MessagePart) {
        for child in &part.parts {
            self.collect(child);
        }
    }
}

fn decode_body(data: &str) -> Option<String> {
    match GMAIL_BASE64.decode(data.trim()) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            warn!("Undecodable Gmail body part: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn encoded(text: &str) -> String {
        URL_SAFE_NO_PAD.encode(text)
    }

    #[test]
    fn parses_nested_multipart_message() {
        let raw = json!({
            "id": "18c1",
            "threadId": "t-9",
            "labelIds": ["INBOX", "UNREAD"],
            "internalDate": "1760781600000",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    {"name": "From", "value": "Ana <ana@example.com>"},
                    {"name": "To", "value": "me@example.com"},
                    {"name": "subject", "value": "Budget"}
                ],
                "parts": [
                    {
                        "mimeType": "multipart/alternative",
                        "parts": [
                            {"mimeType": "text/plain", "body": {"data": encoded("Plain body ✓")}},
                            {"mimeType": "text/html", "body": {"data": encoded("<p>Html</p>")}}
                        ]
                    },
                    {"mimeType": "application/pdf", "filename": "q3.pdf", "body": {"attachmentId": "att-1"}}
                ]
            }
        });
        let message: GmailMessage = serde_json::from_value(raw).unwrap();
        let fetched = parse_message(message);

        assert_eq!(fetched.external_id, "18c1");
        assert_eq!(fetched.thread_id.as_deref(), Some("t-9"));
        assert_eq!(fetched.sender, "Ana <ana@example.com>");
        assert_eq!(fetched.subject, "Budget");
        assert_eq!(fetched.body_text, "Plain body ✓");
        assert_eq!(fetched.body_html.as_deref(), Some("<p>Html</p>"));
        assert!(fetched.has_attachment);
        assert_eq!(fetched.labels, vec!["INBOX", "UNREAD"]);
        assert_eq!(fetched.timestamp, "2025-10-18T10:00:00Z");
    }

    #[test]
    fn single_part_message_falls_back_to_date_header() {
        let raw = json!({
            "id": "m2",
            "payload": {
                "mimeType": "text/plain",
                "headers": [{"name": "Date", "value": "Mon, 19 Oct 2026 09:00:00 +0000"}],
                "body": {"data": base64::engine::general_purpose::URL_SAFE.encode("Hi")}
            }
        });
        let message: GmailMessage = serde_json::from_value(raw).unwrap();
        let fetched = parse_message(message);

        assert_eq!(fetched.body_text, "Hi");
        assert_eq!(fetched.body_html, None);
        assert!(!fetched.has_attachment);
        assert_eq!(fetched.timestamp, "Mon, 19 Oct 2026 09:00:00 +0000");
        assert!(fetched.labels.is_empty());
    }

    #[test]
    fn missing_payload_yields_empty_fields() {
        let message: GmailMessage = serde_json::from_value(json!({"id": "m3"})).unwrap();
        let fetched = parse_message(message);
        assert_eq!(fetched.subject, "");
        assert_eq!(fetched.body_text, "");
    }

    #[test]
    fn undated_message_is_stamped_with_fetch_time() {
        let before = Utc::now() - chrono::Duration::seconds(1);
        let message: GmailMessage = serde_json::from_value(json!({"id": "m4"})).unwrap();
        let fetched = parse_message(message);

        let stamped = chrono::DateTime::parse_from_rfc3339(&fetched.timestamp).unwrap();
        assert!(stamped >= before);
        assert!(stamped <= Utc::now());
    }
}
