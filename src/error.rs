//! Error types for the LTI bridge

use thiserror::Error;

/// Result type alias for the LTI bridge
pub type Result<T> = std::result::Result<T, Error>;

/// LTI bridge errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing/incomplete platform configuration)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request from the caller
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Launch validation failure (never retried automatically)
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// JWKS endpoint unreachable or returned garbage
    #[error("JWKS fetch failed: {0}")]
    KeyFetch(String),

    /// The token's key id is not in the platform's JWKS, even after refresh
    #[error("Unknown signing key id: {0}")]
    UnknownKey(String),

    /// Upstream (Moodle) API failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Validation failures for an incoming launch.
///
/// These are terminal for the launch attempt: a rejected token cannot become
/// valid by retrying, so callers surface them rather than retry.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The ID token is not a structurally valid compact JWT.
    #[error("malformed ID token: {0}")]
    Format(String),

    /// Signature verification failed, or the declared algorithm does not
    /// match the key resolved from the JWKS.
    #[error("signature verification failed: {0}")]
    Signature(String),

    /// One or more claims did not match the platform registration.
    #[error("claim validation failed")]
    Claims {
        /// Human-readable description of each mismatch. Never contains raw
        /// token material.
        details: Vec<String>,
    },

    /// The launch `state` is unknown, expired, or already consumed.
    #[error("launch state is unknown, expired, or already used")]
    ReplayOrExpired,
}

impl AuthError {
    /// Specific mismatch messages for the HTTP error body.
    #[must_use]
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::Claims { details } => details.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl Error {
    /// Map to the HTTP status this error is surfaced as.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Auth(_) => 403,
            Self::Upstream(_) => 502,
            _ => 500,
        }
    }
}
