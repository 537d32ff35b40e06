//! Error types for the DataStore layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error payload reported by the data store.
///
/// Mirrors the PostgREST error body. Remote failures travel in-band inside an
/// [`Envelope`](crate::Envelope) instead of being returned as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct StoreError {
    /// PostgREST or Postgres error code (`PGRST116`, `23505`, ...).
    #[serde(default)]
    pub code: String,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Additional detail, when the store provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Suggested fix, when the store provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl StoreError {
    /// Creates an error with a code and a message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    /// Attaches a detail string.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attaches a hint string.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Errors raised while configuring a client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The base URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A required setting was empty or absent.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// A header value contained characters HTTP does not allow.
    #[error("invalid header value for {0}")]
    InvalidHeader(String),

    /// The underlying HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Result type for client construction.
pub type Result<T> = std::result::Result<T, ClientError>;
