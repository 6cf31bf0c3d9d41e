//! Error types for the allowlist sync system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the allowlist sync system
#[derive(Error, Debug)]
pub enum Error {
    /// A required credential or setting is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// DNS lookup failure (TXT or A record)
    #[error("DNS resolution error: {0}")]
    Resolution(String),

    /// Reading the provider allowlist failed
    #[error("Allowlist read failed: {0}")]
    ProviderRead(String),

    /// Writing to the provider allowlist failed
    #[error("Allowlist write failed: {message}")]
    ProviderWrite {
        /// Summary of the failure
        message: String,
        /// Error messages reported by the provider, if any
        details: Vec<String>,
    },

    /// Status notification could not be delivered
    #[error("Notification error: {0}")]
    Notification(String),

    /// An outbound call did not complete within the configured timeout
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Timeout in seconds
        secs: u64,
    },

    /// Another reconciliation run is already in progress
    #[error("A sync run is already in progress")]
    AlreadyRunning,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP client errors (from provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything unexpected, including panics inside a run
    #[error("Unhandled error: {0}")]
    Unhandled(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a DNS resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Create an allowlist read error
    pub fn provider_read(msg: impl Into<String>) -> Self {
        Self::ProviderRead(msg.into())
    }

    /// Create an allowlist write error with provider-supplied detail
    pub fn provider_write(message: impl Into<String>, details: Vec<String>) -> Self {
        Self::ProviderWrite {
            message: message.into(),
            details,
        }
    }

    /// Create a notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an unhandled error
    pub fn unhandled(msg: impl Into<String>) -> Self {
        Self::Unhandled(msg.into())
    }

    /// Provider-reported error messages attached to this error
    ///
    /// Only write failures carry structured detail; every other
    /// variant returns an empty slice.
    pub fn details(&self) -> &[String] {
        match self {
            Self::ProviderWrite { details, .. } => details,
            _ => &[],
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Unhandled(err.to_string())
    }
}
