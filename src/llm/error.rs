//! Typed errors for LLM operations
//!
//! Lets the chat endpoint distinguish configuration problems, rate limiting
//! and generic upstream failures when choosing a response status.

use thiserror::Error;

/// LLM operation errors with typed variants
#[derive(Debug, Error)]
pub enum LlmError {
    /// The model credential is not configured
    #[error("{0} not configured")]
    MissingCredential(String),

    /// Authentication token is expired or invalid (HTTP 401/403)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit or quota exceeded (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Malformed request (HTTP 400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Server-side error (HTTP 5xx)
    #[error("Service error: {0}")]
    ServiceError(String),

    /// Connection failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether this error means the upstream quota is exhausted.
    ///
    /// Besides the typed variant this inspects the message text, because
    /// upstream errors often reach us wrapped in a generic status.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited(_)) || looks_rate_limited(&self.to_string())
    }

    /// Convert HTTP status code and error text into typed LlmError
    pub fn from_http_status(status: reqwest::StatusCode, error_text: String) -> Self {
        match status.as_u16() {
            401 | 403 => LlmError::Unauthorized(error_text),
            429 => LlmError::RateLimited(error_text),
            400 => LlmError::BadRequest(error_text),
            500..=599 => LlmError::ServiceError(error_text),
            _ => LlmError::Other(anyhow::anyhow!("HTTP {}: {}", status, error_text)),
        }
    }

    /// Convert network/connection errors into typed LlmError
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            LlmError::Network(format!("Connection failed: {}", e))
        } else if let Some(status) = e.status() {
            Self::from_http_status(status, e.to_string())
        } else {
            LlmError::Other(e.into())
        }
    }
}

/// Substring heuristic for quota errors.
///
/// Compatibility risk: this keys off upstream wording and breaks silently if
/// the provider rephrases its errors.
pub fn looks_rate_limited(message: &str) -> bool {
    const MARKERS: [&str; 4] = ["429", "quota", "RESOURCE_EXHAUSTED", "Too Many Requests"];
    MARKERS.iter().any(|marker| message.contains(marker))
}
