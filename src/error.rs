// src/error.rs

//! Unified error handling for the pager.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias for pager operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// The collection endpoint answered with a non-2xx status
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// No dataset with the given name is configured
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    /// A failure shared by every waiter of a coalesced request
    #[error(transparent)]
    Shared(Arc<AppError>),
}

impl AppError {
    /// Create a status error from a response status code and its text.
    pub fn status(status: u16, message: impl fmt::Display) -> Self {
        Self::Status {
            status,
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an unknown dataset error.
    pub fn unknown_dataset(name: impl Into<String>) -> Self {
        Self::UnknownDataset(name.into())
    }

    /// Take back a shared error, wrapping it only if other holders remain.
    pub fn from_shared(error: Arc<AppError>) -> Self {
        Arc::try_unwrap(error).unwrap_or_else(Self::Shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message() {
        let err = AppError::status(404, "Not Found");
        assert_eq!(err.to_string(), "Request failed with status 404: Not Found");
    }

    #[test]
    fn test_json_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: AppError = parse.unwrap_err().into();
        assert!(matches!(err, AppError::Json(_)));
    }

    #[test]
    fn test_from_shared() {
        let sole = Arc::new(AppError::config("bad"));
        assert!(matches!(AppError::from_shared(sole), AppError::Config(_)));

        let shared = Arc::new(AppError::status(500, "Internal Server Error"));
        let other = Arc::clone(&shared);
        let err = AppError::from_shared(shared);
        assert!(matches!(err, AppError::Shared(_)));
        assert_eq!(err.to_string(), other.to_string());
    }
}
