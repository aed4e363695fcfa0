//! Error types for Salmart sync operations

use crate::EntityKind;
use thiserror::Error;

/// Persistent store errors.
///
/// These never reach the cache engine's callers: the store logs them and
/// degrades to a miss or a no-op.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Deserialization failed for {key}: {reason}")]
    Deserialization { key: String, reason: String },

    #[error("Transaction failed: {reason}")]
    Transaction { reason: String },
}

/// Transport-level failures: the request never produced an HTTP response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Response body could not be decoded: {reason}")]
    Decode { reason: String },
}

/// Non-success HTTP status returned by the Salmart API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("API error {status}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Master error type for all Salmart sync errors.
#[derive(Debug, Clone, Error)]
pub enum SalmartError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Config error: {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("{kind} entity {id} is not cached")]
    NotCached { kind: EntityKind, id: String },

    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("Cannot {action} without a signed-in user")]
    SignedOut { action: String },
}

impl SalmartError {
    /// Whether the failure is worth retrying on the next natural trigger.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api(api) => api.status >= 500 || api.status == 429,
            _ => false,
        }
    }

    /// Message suitable for a toast in the presentation layer.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(api) => api.message.clone(),
            Self::Network(_) => "You appear to be offline".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for SalmartError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for Salmart sync operations.
pub type SalmartResult<T> = Result<T, SalmartError>;

// =============================================================================
// TESTS
// =============================================================================
