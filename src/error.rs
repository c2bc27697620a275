//! Error types for the job mail tracker.

/// Configuration-related errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox transport and authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail request {operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Invalid response from mail provider: {0}")]
    InvalidResponse(String),

    #[error("OAuth2 error: {0}")]
    OAuth2(String),

    #[error("Credential cache error: {0}")]
    CredentialCache(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited")]
    RateLimited { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Create failed: {0}")]
    Create(String),

    #[error("Update of record {id} failed: {reason}")]
    Update { id: String, reason: String },

    #[error("Record {id} not found")]
    NotFound { id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Per-message pipeline errors. Never abort a batch.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

