//! Mailbox access: message types, the `MailSource` trait and its Gmail
//! implementation.

pub mod body;
pub mod credentials;
pub mod gmail;

pub use body::{extract_body, strip_html};
pub use credentials::{CredentialProvider, GoogleTokenRefresher, OAuthCredential};
pub use gmail::GmailSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MailError;

/// Opaque, provider-assigned message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a part's body data is encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyEncoding {
    /// URL-safe base64, padding optional (Gmail's encoding).
    #[default]
    Base64Url,
    /// Already-decoded text.
    Plain,
}

/// One node of a message's MIME tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePart {
    pub mime_type: String,
    pub data: Option<String>,
    pub encoding: BodyEncoding,
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    /// A leaf holding already-decoded text.
    pub fn text(mime_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: Some(text.into()),
            encoding: BodyEncoding::Plain,
            parts: Vec::new(),
        }
    }

    /// A leaf holding base64url-encoded data.
    pub fn encoded(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: Some(data.into()),
            encoding: BodyEncoding::Base64Url,
            parts: Vec::new(),
        }
    }

    /// A container (e.g. `multipart/alternative`) with children.
    pub fn multipart(mime_type: impl Into<String>, parts: Vec<MessagePart>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: None,
            encoding: BodyEncoding::Base64Url,
            parts,
        }
    }

    pub fn is_multipart(&self) -> bool {
        !self.parts.is_empty()
    }
}

/// A fetched message, as supplied by the mail source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: MessageId,
    pub subject: String,
    /// Raw `Date` header, empty if absent.
    pub date: String,
    pub payload: MessagePart,
}

/// Mailbox operations the pipeline depends on.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Ids of unread messages, at most `limit`, in provider order.
    async fn list_unread(&self, limit: usize) -> Result<Vec<MessageId>, MailError>;

    /// Fetch a full message.
    async fn get(&self, id: &MessageId) -> Result<RawMessage, MailError>;

    /// Acknowledge a message so it is not listed again.
    async fn mark_read(&self, id: &MessageId) -> Result<(), MailError>;
}
