//! Salmart Client - Network Layer
//!
//! REST transport with bearer-token injection and error normalization,
//! the endpoint catalogue the cache engine depends on, and the websocket
//! push listener.

pub mod config;
pub mod endpoints;
pub mod error;
pub mod push;
pub mod realtime;
pub mod rest;
pub mod session;
pub mod transport;

pub use config::{
    AuthConfig, CacheSettings, ClientConfig, ConfigError, LogFormat, LoggingConfig,
    ReconnectConfig, CONFIG_ENV_VAR,
};
pub use endpoints::{InteractionsResponse, LikeResponse, ALL_CATEGORIES};
pub use error::ClientError;
pub use push::{ListenerEvent, PushEvent};
pub use realtime::{spawn_push_listener, WsClient};
pub use rest::{api_error_from_body, RestClient};
pub use session::Session;
pub use transport::{decode_body, decode_list, ApiRequest, ApiTransport, Method};
