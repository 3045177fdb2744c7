//! Unified error type for the edge scanner.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid private key format: unsupported PEM header {0:?}")]
    InvalidKeyFormat(String),

    #[error("No signing credential loaded")]
    NoCredential,

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Predictions source error: {0}")]
    Predictions(String),

    #[error("Kalshi API error (status={status}): {message}")]
    KalshiApi { status: u16, message: String },

    #[error("Rate limited; retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Credential failures stop the scanner; everything else is retried
    /// on the next cycle.
    pub fn is_credential(&self) -> bool {
        matches!(
            self,
            Error::InvalidKeyFormat(_) | Error::NoCredential | Error::Auth(_)
        )
    }

    /// HTTP status for exchange-side failures, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::KalshiApi { status, .. } => Some(*status),
            Error::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}
