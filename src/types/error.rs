//! Error types for Keyward
//!
//! One taxonomy for the key path. HTTP callers only ever see the status code
//! from `status_code()`; internal collaborators match on the variant.

use hyper::StatusCode;

/// Main error type for Keyward operations
#[derive(Debug, thiserror::Error)]
pub enum KeywardError {
    /// Generation, store write, or resolver construction failed.
    /// The manager stays uninitialized so a later call can retry.
    #[error("Key initialization failed: {0}")]
    KeyInitialization(String),

    #[error("Key initialization cancelled: {0}")]
    Cancelled(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// No signature-use key with this identifier
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Marshal error: {0}")]
    Marshal(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl KeywardError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::KeyInitialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DuplicateKey(_) => StatusCode::CONFLICT,
            Self::UnknownKey(_) => StatusCode::UNAUTHORIZED,
            Self::Marshal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Fold any failure raised while building key material into
    /// `KeyInitialization`, keeping the cause in the message.
    pub fn into_initialization(self) -> Self {
        match self {
            Self::KeyInitialization(_) | Self::Cancelled(_) => self,
            other => Self::KeyInitialization(other.to_string()),
        }
    }
}

impl From<std::io::Error> for KeywardError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for KeywardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Marshal(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for KeywardError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for KeywardError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Auth(format!("JWT error: {}", err))
    }
}

/// Result type alias for Keyward operations
pub type Result<T> = std::result::Result<T, KeywardError>;
