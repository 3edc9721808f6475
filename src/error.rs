//! Custom error types for lectern

use thiserror::Error;

/// Main error type for lectern operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Material not found: {0}")]
    MaterialNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid job transition for {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    #[error("Job {0} has used all its attempts; retry with reset_attempts")]
    AttemptsExhausted(String),

    #[error("Not initialized: run 'lectern init' first")]
    NotInitialized,

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("Job {0} is no longer held by this worker")]
    LeaseLost(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for lectern
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the embedding/generation provider.
///
/// Anything that is neither a rate limit nor a timeout is folded into `Api`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider API error{}: {message}", status_code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Api {
        status_code: Option<u16>,
        message: String,
    },
}

impl ProviderError {
    pub fn api(status_code: Option<u16>, message: impl Into<String>) -> Self {
        ProviderError::Api {
            status_code,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Api {
                status_code: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

/// Provider result alias
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Failures of a single ingestion attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Parse failed: {0}")]
    Parse(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Persistence failed: {0}")]
    Persistence(String),
}

/// Coarse classification of an ingestion failure, used to pick a retry delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Fetch,
    Parse,
    RateLimited { retry_after_secs: u64 },
    Timeout,
    ProviderApi,
    Persistence,
}

impl IngestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::Fetch(_) => FailureKind::Fetch,
            IngestError::Parse(_) => FailureKind::Parse,
            IngestError::Provider(ProviderError::RateLimited { retry_after_secs }) => {
                FailureKind::RateLimited {
                    retry_after_secs: *retry_after_secs,
                }
            }
            IngestError::Provider(ProviderError::Timeout) => FailureKind::Timeout,
            IngestError::Provider(ProviderError::Api { .. }) => FailureKind::ProviderApi,
            IngestError::Persistence(_) => FailureKind::Persistence,
        }
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        IngestError::Persistence(err.to_string())
    }
}

impl From<Error> for IngestError {
    fn from(err: Error) -> Self {
        match err {
            Error::Provider(e) => IngestError::Provider(e),
            Error::Ingest(e) => e,
            other => IngestError::Persistence(other.to_string()),
        }
    }
}
