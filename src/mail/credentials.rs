//! OAuth2 credentials for the mailbox.
//!
//! Credentials are plain values. Refreshing one goes through a
//! `CredentialProvider` and yields a new value; reading and writing the token
//! cache file are explicit calls made by the binary.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::MailError;

/// Google's OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Access tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// An OAuth2 client + refresh token, with the current access token if any.
#[derive(Debug, Clone)]
pub struct OAuthCredential {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
    pub access_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthCredential {
    pub fn new(client_id: String, client_secret: SecretString, refresh_token: SecretString) -> Self {
        Self {
            client_id,
            client_secret,
            refresh_token,
            access_token: None,
            expires_at: None,
        }
    }

    /// True when there is no access token or it expires within the margin.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_none() {
            return true;
        }
        match self.expires_at {
            Some(expires_at) => expires_at <= now + Duration::seconds(EXPIRY_MARGIN_SECS),
            None => false,
        }
    }
}

/// Exchanges a credential for a fresh one.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a new credential with a valid access token.
    async fn refresh(&self, credential: &OAuthCredential) -> Result<OAuthCredential, MailError>;
}

/// Response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,

    /// Lifetime in seconds of the access token.
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// A rotated refresh token, if the server issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Apply this response to `previous`, producing the refreshed credential.
    pub fn into_credential(self, previous: &OAuthCredential, now: DateTime<Utc>) -> OAuthCredential {
        OAuthCredential {
            client_id: previous.client_id.clone(),
            client_secret: previous.client_secret.clone(),
            refresh_token: self
                .refresh_token
                .map(SecretString::from)
                .unwrap_or_else(|| previous.refresh_token.clone()),
            access_token: Some(SecretString::from(self.access_token)),
            expires_at: self
                .expires_in
                .map(|secs| now + Duration::seconds(i64::from(u32::try_from(secs).unwrap_or(u32::MAX)))),
        }
    }
}

/// Refresh-token grant against an OAuth2 token endpoint.
pub struct GoogleTokenRefresher {
    client: reqwest::Client,
    token_url: String,
}

impl GoogleTokenRefresher {
    pub fn new() -> Self {
        Self::with_token_url(GOOGLE_TOKEN_URL)
    }

    pub fn with_token_url(token_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

impl Default for GoogleTokenRefresher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for GoogleTokenRefresher {
    async fn refresh(&self, credential: &OAuthCredential) -> Result<OAuthCredential, MailError> {
        info!("Refreshing mailbox access token");

        let params = [
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.expose_secret()),
            ("refresh_token", credential.refresh_token.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| MailError::OAuth2(format!("Token refresh failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            // The body may echo request parameters; keep only the error code.
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let code = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown_error");
            return Err(MailError::OAuth2(format!(
                "Token refresh failed ({status}): {code}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MailError::OAuth2(format!("Failed to parse refresh response: {e}")))?;

        debug!(expires_in = ?token.expires_in, "Access token refreshed");
        Ok(token.into_credential(credential, Utc::now()))
    }
}

// ── Token cache file ────────────────────────────────────────────────

/// On-disk shape, compatible with Google's authorized-user token files.
#[derive(Debug, Serialize, Deserialize)]
struct CachedCredential {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<DateTime<Utc>>,
}

/// Load a cached credential. `Ok(None)` when the file does not exist.
pub async fn load_credential(path: &Path) -> Result<Option<OAuthCredential>, MailError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(MailError::CredentialCache(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
    };

    let cached: CachedCredential = serde_json::from_str(&raw).map_err(|e| {
        MailError::CredentialCache(format!("invalid token file {}: {e}", path.display()))
    })?;

    Ok(Some(OAuthCredential {
        client_id: cached.client_id,
        client_secret: SecretString::from(cached.client_secret),
        refresh_token: SecretString::from(cached.refresh_token),
        access_token: cached.token.map(SecretString::from),
        expires_at: cached.expiry,
    }))
}

/// Write a credential to the cache file, replacing it.
pub async fn save_credential(path: &Path, credential: &OAuthCredential) -> Result<(), MailError> {
    let cached = CachedCredential {
        client_id: credential.client_id.clone(),
        client_secret: credential.client_secret.expose_secret().to_string(),
        refresh_token: credential.refresh_token.expose_secret().to_string(),
        token: credential
            .access_token
            .as_ref()
            .map(|t| t.expose_secret().to_string()),
        expiry: credential.expires_at,
    };

    let json = serde_json::to_string_pretty(&cached)
        .map_err(|e| MailError::CredentialCache(e.to_string()))?;
    tokio::fs::write(path, json).await.map_err(|e| {
        MailError::CredentialCache(format!("cannot write {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> OAuthCredential {
        OAuthCredential::new(
            "client-id".into(),
            SecretString::from("client-secret"),
            SecretString::from("refresh-1"),
        )
    }

    #[test]
    fn needs_refresh_without_access_token() {
        assert!(credential().needs_refresh(Utc::now()));
    }

    #[test]
    fn needs_refresh_near_expiry() {
        let now = Utc::now();
        let mut cred = credential();
        cred.access_token = Some(SecretString::from("at"));

        cred.expires_at = Some(now + Duration::seconds(30));
        assert!(cred.needs_refresh(now));

        cred.expires_at = Some(now + Duration::seconds(3600));
        assert!(!cred.needs_refresh(now));

        cred.expires_at = None;
        assert!(!cred.needs_refresh(now));
    }

    #[test]
    fn token_response_keeps_refresh_token_when_not_rotated() {
        let now = Utc::now();
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"at-2","expires_in":3599}"#).unwrap();
        let refreshed = token.into_credential(&credential(), now);

        assert_eq!(refreshed.refresh_token.expose_secret(), "refresh-1");
        assert_eq!(
            refreshed.access_token.as_ref().map(|t| t.expose_secret()),
            Some("at-2")
        );
        assert_eq!(refreshed.expires_at, Some(now + Duration::seconds(3599)));
        assert_eq!(refreshed.client_id, "client-id");
    }

    #[test]
    fn token_response_rotates_refresh_token() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"at","refresh_token":"refresh-2"}"#).unwrap();
        let refreshed = token.into_credential(&credential(), Utc::now());
        assert_eq!(refreshed.refresh_token.expose_secret(), "refresh-2");
        assert!(refreshed.expires_at.is_none());
    }

    #[test]
    fn refresher_defaults_to_google() {
        assert_eq!(GoogleTokenRefresher::new().token_url(), GOOGLE_TOKEN_URL);
    }

    #[tokio::test]
    async fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_credential(&dir.path().join("token.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn save_then_load_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let expiry = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut cred = credential();
        cred.access_token = Some(SecretString::from("at"));
        cred.expires_at = Some(expiry);
        save_credential(&path, &cred).await.unwrap();

        let loaded = load_credential(&path).await.unwrap().unwrap();
        assert_eq!(loaded.client_id, "client-id");
        assert_eq!(loaded.refresh_token.expose_secret(), "refresh-1");
        assert_eq!(loaded.access_token.as_ref().map(|t| t.expose_secret()), Some("at"));
        assert_eq!(loaded.expires_at, Some(expiry));
    }

    #[tokio::test]
    async fn load_google_authorized_user_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(
            &path,
            r#"{"token":"ya29.x","refresh_token":"1//r","token_uri":"https://oauth2.googleapis.com/token",
                "client_id":"id.apps.googleusercontent.com","client_secret":"s",
                "scopes":["https://www.googleapis.com/auth/gmail.modify"],
                "expiry":"2030-06-01T12:00:00Z"}"#,
        )
        .unwrap();

        let loaded = load_credential(&path).await.unwrap().unwrap();
        assert_eq!(loaded.client_id, "id.apps.googleusercontent.com");
        assert_eq!(loaded.refresh_token.expose_secret(), "1//r");
        assert!(loaded.expires_at.is_some());
    }

    #[tokio::test]
    async fn load_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load_credential(&path).await,
            Err(MailError::CredentialCache(_))
        ));
    }
}
