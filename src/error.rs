//! Error types for the fan-out service.

use thiserror::Error;

/// Main error type for fan-out operations.
///
/// Errors are `Clone` so the failure that put a listener into the
/// erroring state can be kept on the entry and handed to every caller
/// that asks for it.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum FeedError {
    #[error("Failed to attach listener {key}: {reason}")]
    Attach { key: String, reason: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Failed to decode {channel} payload: {reason}")]
    Decode { channel: String, reason: String },

    #[error("Invalid listener parameters: {0}")]
    InvalidParams(String),

    #[error("Subscriber {subscriber} callback failed: {reason}")]
    Callback { subscriber: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

/// Result type for fan-out operations.
pub type Result<T> = std::result::Result<T, FeedError>;
