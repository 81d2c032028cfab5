use ai::StructuredExtractor;
use mailbox::MailboxClient;
use mailroom_core::error::{MailroomError, Result};
use mailroom_core::types::{Generated, ProviderKind, ReplyTone};
use std::sync::Arc;
use std::time::Duration;
use storage::SqliteStorage;
use tracing::{info, warn};

/// `Re: ` prefix unless the subject already carries one.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    let has_prefix = trimmed
        .get(..3)
        .map(|head| head.eq_ignore_ascii_case("re:"))
        .unwrap_or(false);
    if has_prefix {
        trimmed.to_string()
    } else {
        format!("Re: {}", trimmed)
    }
}

/// Drafts replies to stored messages and sends them through the mailbox.
pub struct DraftAssistant {
    store: Arc<SqliteStorage>,
    extractor: Arc<StructuredExtractor>,
    mailbox: Option<Arc<dyn MailboxClient>>,
    timeout: Duration,
}

impl DraftAssistant {
    pub fn new(
        store: Arc<SqliteStorage>,
        extractor: Arc<StructuredExtractor>,
        mailbox: Option<Arc<dyn MailboxClient>>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            extractor,
            mailbox,
            timeout,
        }
    }

    /// A reply in the requested tone. Without a usable provider this is
    /// one of the fixed templates, marked as a fallback.
    pub async fn generate_reply(
        &self,
        message_id: i64,
        tone: ReplyTone,
        provider: Option<ProviderKind>,
    ) -> Result<Generated<String>> {
        let message = self.store.get_message(message_id).await?;
        let context = format!("Original sender: {}", message.sender);
        let reply = self
            .extractor
            .generate_reply(&message.subject_and_body(), tone, &context, provider)
            .await?;

        if let Some(reason) = reply.fallback_reason() {
            warn!("Reply for message {} uses a template: {}", message_id, reason);
        }
        Ok(reply)
    }

    /// Sends `body` to the original sender and returns the provider's id
    /// for the sent message.
    pub async fn send_reply(&self, message_id: i64, body: &str) -> Result<String> {
        let mailbox = self
            .mailbox
            .as_ref()
            .ok_or_else(|| MailroomError::Configuration("No mailbox account configured".into()))?;
        if body.trim().is_empty() {
            return Err(MailroomError::Validation("Reply body is empty".into()));
        }

        let message = self.store.get_message(message_id).await?;
        let subject = reply_subject(&message.subject);

        let sent = tokio::time::timeout(
            self.timeout,
            mailbox.send_message(&message.sender, &subject, body, None),
        )
        .await
        .map_err(|_| MailroomError::UpstreamUnavailable("Mailbox send timed out".into()))??;

        info!("Sent reply to message {} as {}", message_id, sent);
        Ok(sent)
    }
}
