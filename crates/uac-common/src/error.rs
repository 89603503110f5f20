//! Common error types for UAC components.

use thiserror::Error;

/// Common errors across UAC components
#[derive(Debug, Error)]
pub enum UacError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Redis connection/operation error
    #[error("Redis error: {0}")]
    Redis(String),

    /// Captcha store or verification error
    #[error("Captcha error: {0}")]
    Captcha(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl UacError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::Redis(_) => 503,
            Self::Captcha(_) => 500,
            Self::InvalidInput(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Redis(_))
    }
}
