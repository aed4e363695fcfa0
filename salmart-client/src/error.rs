use salmart_core::{NetworkError, SalmartError};

use crate::config::ConfigError;

/// Failures while constructing or connecting a client.
///
/// Request-level failures are reported as [`SalmartError`] directly so the
/// cache engine sees one taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl From<ClientError> for SalmartError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Config(config) => config.into(),
            other => SalmartError::Network(NetworkError::Transport {
                reason: other.to_string(),
            }),
        }
    }
}
