//! Gmail REST mail source.
//!
//! Lists `is:unread` messages, fetches full payloads and marks messages read by
//! removing the `UNREAD` label. Access tokens come from the injected
//! `CredentialProvider`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::MailError;
use crate::mail::credentials::{CredentialProvider, OAuthCredential};
use crate::mail::{BodyEncoding, MailSource, MessageId, MessagePart, RawMessage};

/// Base URL of the Gmail API for the authenticated user.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail-backed mail source.
pub struct GmailSource {
    client: reqwest::Client,
    base_url: String,
    credential: Mutex<OAuthCredential>,
    provider: Arc<dyn CredentialProvider>,
}

impl GmailSource {
    pub fn new(credential: OAuthCredential, provider: Arc<dyn CredentialProvider>) -> Self {
        Self::with_base_url(GMAIL_API_BASE, credential, provider)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        credential: OAuthCredential,
        provider: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential: Mutex::new(credential),
            provider,
        }
    }

    /// Snapshot of the credential currently in use (after any refresh).
    pub async fn current_credential(&self) -> OAuthCredential {
        self.credential.lock().await.clone()
    }

    /// A usable access token, refreshing first if needed or if `force` is set.
    async fn access_token(&self, force: bool) -> Result<SecretString, MailError> {
        let mut credential = self.credential.lock().await;
        if force || credential.needs_refresh(Utc::now()) {
            *credential = self.provider.refresh(&credential).await?;
        }
        credential
            .access_token
            .clone()
            .ok_or_else(|| MailError::OAuth2("credential provider returned no access token".into()))
    }

    /// Send an authorized request, refreshing and retrying once on 401.
    async fn send<F>(&self, operation: &str, build: F) -> Result<reqwest::Response, MailError>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self.access_token(false).await?;
        let resp = build(token.expose_secret())
            .send()
            .await
            .map_err(|e| request_failed(operation, e))?;

        let resp = if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!(operation, "Gmail rejected access token, refreshing");
            let token = self.access_token(true).await?;
            build(token.expose_secret())
                .send()
                .await
                .map_err(|e| request_failed(operation, e))?
        } else {
            resp
        };

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(MailError::RequestFailed {
            operation: operation.to_string(),
            reason: format!("HTTP {status}: {body}"),
        })
    }
}

fn request_failed(operation: &str, e: reqwest::Error) -> MailError {
    MailError::RequestFailed {
        operation: operation.to_string(),
        reason: e.to_string(),
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    payload: WirePart,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<WireHeader>,
    #[serde(default)]
    body: WireBody,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
struct WireHeader {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireBody {
    #[serde(default)]
    data: Option<String>,
}

impl WirePart {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn into_part(self) -> MessagePart {
        MessagePart {
            mime_type: self.mime_type,
            data: self.body.data,
            encoding: BodyEncoding::Base64Url,
            parts: self.parts.into_iter().map(WirePart::into_part).collect(),
        }
    }
}

fn into_raw_message(wire: WireMessage) -> RawMessage {
    let subject = wire.payload.header("Subject").unwrap_or_default().to_string();
    let date = wire.payload.header("Date").unwrap_or_default().to_string();
    RawMessage {
        id: MessageId(wire.id),
        subject,
        date,
        payload: wire.payload.into_part(),
    }
}

// ── MailSource ──────────────────────────────────────────────────────

#[async_trait]
impl MailSource for GmailSource {
    async fn list_unread(&self, limit: usize) -> Result<Vec<MessageId>, MailError> {
        let url = format!("{}/messages", self.base_url);
        let max_results = limit.to_string();
        let resp = self
            .send("list_unread", |token| {
                self.client
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("q", "is:unread"), ("maxResults", max_results.as_str())])
            })
            .await?;

        let list: ListResponse = resp
            .json()
            .await
            .map_err(|e| MailError::InvalidResponse(e.to_string()))?;

        debug!(count = list.messages.len(), "Listed unread messages");
        Ok(list
            .messages
            .into_iter()
            .take(limit)
            .map(|m| MessageId(m.id))
            .collect())
    }

    async fn get(&self, id: &MessageId) -> Result<RawMessage, MailError> {
        let url = format!("{}/messages/{}", self.base_url, id);
        let resp = self
            .send("get", |token| {
                self.client
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("format", "full")])
            })
            .await
            .map_err(|e| match e {
                MailError::RequestFailed { ref reason, .. } if reason.starts_with("HTTP 404") => {
                    MailError::NotFound { id: id.to_string() }
                }
                other => other,
            })?;

        let wire: WireMessage = resp
            .json()
            .await
            .map_err(|e| MailError::InvalidResponse(e.to_string()))?;
        Ok(into_raw_message(wire))
    }

    async fn mark_read(&self, id: &MessageId) -> Result<(), MailError> {
        let url = format!("{}/messages/{}/modify", self.base_url, id);
        let body = serde_json::json!({ "removeLabelIds": ["UNREAD"] });
        self.send("mark_read", |token| {
            self.client.post(&url).bearer_auth(token).json(&body)
        })
        .await?;
        Ok(())
    }
}
