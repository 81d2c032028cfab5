use mailroom_core::config::TokenBundle;
use mailroom_core::error::{MailroomError, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Holds the current access token for a Google API and refreshes it once
/// when a request comes back 401.
pub struct GoogleAuth {
    bundle: TokenBundle,
    access_token: RwLock<String>,
    http: reqwest::Client,
}

impl GoogleAuth {
    pub fn new(bundle: TokenBundle, http: reqwest::Client) -> Self {
        let access_token = RwLock::new(bundle.access_token.expose().to_string());
        Self {
            bundle,
            access_token,
            http,
        }
    }

    fn can_refresh(&self) -> bool {
        self.bundle.refresh_token.is_some()
            && self.bundle.client_id.is_some()
            && self.bundle.client_secret.is_some()
    }

    async fn refresh(&self) -> Result<()> {
        let (Some(refresh), Some(client_id), Some(secret)) = (
            &self.bundle.refresh_token,
            &self.bundle.client_id,
            &self.bundle.client_secret,
        ) else {
            return Err(MailroomError::Configuration(
                "Google token expired and no refresh credentials are configured".into(),
            ));
        };

        let resp = self
            .http
            .post(&self.bundle.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh.expose()),
                ("client_id", client_id.as_str()),
                ("client_secret", secret.expose()),
            ])
            .send()
            .await
            .map_err(|e| MailroomError::UpstreamUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MailroomError::UpstreamUnavailable(format!(
                "Token refresh failed with {}: {}",
                status, body
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MailroomError::MalformedPayload(e.to_string()))?;
        let token = body["access_token"].as_str().ok_or_else(|| {
            MailroomError::MalformedPayload("Token response has no access_token".into())
        })?;

        *self.access_token.write().await = token.to_string();
        info!("Refreshed Google access token");
        Ok(())
    }

    /// Sends the request built by `build`, retrying once with a refreshed
    /// token on 401. The response status is left for the caller to judge.
    pub async fn send_raw<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client, &str) -> RequestBuilder,
    {
        let token = self.access_token.read().await.clone();
        let resp = build(&self.http, &token)
            .send()
            .await
            .map_err(|e| MailroomError::UpstreamUnavailable(e.to_string()))?;

        if resp.status() != StatusCode::UNAUTHORIZED || !self.can_refresh() {
            return Ok(resp);
        }

        warn!("Google API returned 401, refreshing token");
        self.refresh().await?;
        let token = self.access_token.read().await.clone();
        build(&self.http, &token)
            .send()
            .await
            .map_err(|e| MailroomError::UpstreamUnavailable(e.to_string()))
    }

    /// Like [`send_raw`](Self::send_raw), with non-success statuses turned
    /// into `UpstreamUnavailable`.
    pub async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client, &str) -> RequestBuilder,
    {
        let resp = self.send_raw(build).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailroomError::UpstreamUnavailable(format!(
                "Google API error {}: {}",
                status.as_u16(),
                body
            )));
        }

        Ok(resp)
    }
}

/// Decodes a JSON response body, mapping failures to `MalformedPayload`.
pub async fn json_body<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T> {
    resp.json::<T>()
        .await
        .map_err(|e| MailroomError::MalformedPayload(e.to_string()))
}
