//! Configuration, read from the environment.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmConfig;
use crate::mail::OAuthCredential;

pub const DEFAULT_CLASSIFIER_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EXTRACTOR_MODEL: &str = "gpt-4o";
pub const DEFAULT_TOKEN_PATH: &str = "token.json";
pub const DEFAULT_MAX_MESSAGES: usize = 20;

/// Everything the tracker binary needs to run one batch.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Model used for the YES/NO relevance question.
    pub classifier: LlmConfig,
    /// Model used for field extraction.
    pub extractor: LlmConfig,
    pub notion_api_key: SecretString,
    /// Target database; records under any other parent are ignored.
    pub notion_database_id: String,
    pub gmail_client_id: String,
    pub gmail_client_secret: SecretString,
    /// Absent when the token cache file is expected to supply it.
    pub gmail_refresh_token: Option<SecretString>,
    pub gmail_token_path: PathBuf,
    pub max_messages: usize,
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let openai_key = SecretString::from(require("OPENAI_API_KEY")?);

        let classifier = LlmConfig {
            api_key: openai_key.clone(),
            model: get("JOB_TRACKER_CLASSIFIER_MODEL")
                .unwrap_or_else(|| DEFAULT_CLASSIFIER_MODEL.into()),
        };
        let extractor = LlmConfig {
            api_key: openai_key,
            model: get("JOB_TRACKER_EXTRACTOR_MODEL")
                .unwrap_or_else(|| DEFAULT_EXTRACTOR_MODEL.into()),
        };

        let max_messages = match get("JOB_TRACKER_MAX_MESSAGES") {
            None => DEFAULT_MAX_MESSAGES,
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "JOB_TRACKER_MAX_MESSAGES".into(),
                        message: format!("expected a positive integer, got {raw:?}"),
                    });
                }
            },
        };

        Ok(Self {
            classifier,
            extractor,
            notion_api_key: SecretString::from(require("NOTION_API_KEY")?),
            notion_database_id: require("NOTION_DATABASE_ID")?,
            gmail_client_id: require("GMAIL_CLIENT_ID")?,
            gmail_client_secret: SecretString::from(require("GMAIL_CLIENT_SECRET")?),
            gmail_refresh_token: get("GMAIL_REFRESH_TOKEN").map(SecretString::from),
            gmail_token_path: get("GMAIL_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_PATH)),
            max_messages,
        })
    }

    /// The Gmail credential to start from.
    ///
    /// A cached credential keeps its refresh and access tokens; client id and
    /// secret always come from the environment.
    pub fn gmail_credential(
        &self,
        cached: Option<OAuthCredential>,
    ) -> Result<OAuthCredential, ConfigError> {
        if let Some(cached) = cached {
            return Ok(OAuthCredential {
                client_id: self.gmail_client_id.clone(),
                client_secret: self.gmail_client_secret.clone(),
                ..cached
            });
        }

        let refresh_token =
            self.gmail_refresh_token
                .clone()
                .ok_or_else(|| ConfigError::MissingRequired {
                    key: "GMAIL_REFRESH_TOKEN".into(),
                    hint: format!(
                        "Set it, or provide a token cache at {}",
                        self.gmail_token_path.display()
                    ),
                })?;

        Ok(OAuthCredential::new(
            self.gmail_client_id.clone(),
            self.gmail_client_secret.clone(),
            refresh_token,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn required() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("NOTION_API_KEY", "secret_notion"),
            ("NOTION_DATABASE_ID", "0f1e2d3c4b5a69788796a5b4c3d2e1f0"),
            ("GMAIL_CLIENT_ID", "client.apps.googleusercontent.com"),
            ("GMAIL_CLIENT_SECRET", "gsecret"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<TrackerConfig, ConfigError> {
        TrackerConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply_when_optional_vars_unset() {
        let config = load(&required()).unwrap();
        assert_eq!(config.classifier.model, DEFAULT_CLASSIFIER_MODEL);
        assert_eq!(config.extractor.model, DEFAULT_EXTRACTOR_MODEL);
        assert_eq!(config.gmail_token_path, PathBuf::from("token.json"));
        assert_eq!(config.max_messages, 20);
        assert!(config.gmail_refresh_token.is_none());
        assert_eq!(config.notion_database_id, "0f1e2d3c4b5a69788796a5b4c3d2e1f0");
    }

    #[test]
    fn overrides_are_read() {
        let mut vars = required();
        vars.insert("JOB_TRACKER_CLASSIFIER_MODEL", "small");
        vars.insert("JOB_TRACKER_EXTRACTOR_MODEL", "large");
        vars.insert("JOB_TRACKER_MAX_MESSAGES", " 5 ");
        vars.insert("GMAIL_TOKEN_PATH", "/tmp/tok.json");
        vars.insert("GMAIL_REFRESH_TOKEN", "refresh");

        let config = load(&vars).unwrap();
        assert_eq!(config.classifier.model, "small");
        assert_eq!(config.extractor.model, "large");
        assert_eq!(config.max_messages, 5);
        assert_eq!(config.gmail_token_path, PathBuf::from("/tmp/tok.json"));
        assert_eq!(
            config.gmail_refresh_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("refresh".to_string())
        );
    }

    #[test]
    fn missing_required_var_is_named() {
        for key in [
            "OPENAI_API_KEY",
            "NOTION_API_KEY",
            "NOTION_DATABASE_ID",
            "GMAIL_CLIENT_ID",
            "GMAIL_CLIENT_SECRET",
        ] {
            let mut vars = required();
            vars.remove(key);
            match load(&vars) {
                Err(ConfigError::MissingEnvVar(name)) => assert_eq!(name, key),
                other => panic!("expected missing {key}, got {other:?}"),
            }
        }
    }

    #[test]
    fn blank_required_var_counts_as_missing() {
        let mut vars = required();
        vars.insert("NOTION_API_KEY", "   ");
        assert!(matches!(load(&vars), Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn max_messages_must_be_positive() {
        for raw in ["0", "-3", "lots"] {
            let mut vars = required();
            vars.insert("JOB_TRACKER_MAX_MESSAGES", raw);
            assert!(
                matches!(load(&vars), Err(ConfigError::InvalidValue { .. })),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn gmail_credential_needs_refresh_token_without_cache() {
        let config = load(&required()).unwrap();
        assert!(matches!(
            config.gmail_credential(None),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn gmail_credential_from_env() {
        let mut vars = required();
        vars.insert("GMAIL_REFRESH_TOKEN", "refresh-env");
        let credential = load(&vars).unwrap().gmail_credential(None).unwrap();
        assert_eq!(credential.client_id, "client.apps.googleusercontent.com");
        assert_eq!(credential.refresh_token.expose_secret(), "refresh-env");
        assert!(credential.access_token.is_none());
    }

    #[test]
    fn gmail_credential_prefers_cache_tokens() {
        let mut vars = required();
        vars.insert("GMAIL_REFRESH_TOKEN", "refresh-env");
        let config = load(&vars).unwrap();

        let mut cached = OAuthCredential::new(
            "stale-client".into(),
            SecretString::from("stale-secret"),
            SecretString::from("refresh-cached"),
        );
        cached.access_token = Some(SecretString::from("access-cached"));

        let credential = config.gmail_credential(Some(cached)).unwrap();
        assert_eq!(credential.client_id, "client.apps.googleusercontent.com");
        assert_eq!(credential.client_secret.expose_secret(), "gsecret");
        assert_eq!(credential.refresh_token.expose_secret(), "refresh-cached");
        assert_eq!(
            credential.access_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("access-cached".to_string())
        );
    }
}
