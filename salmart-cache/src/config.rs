//! Cache engine configuration.

use salmart_client::CacheSettings;
use std::time::Duration;

/// Configuration for the cache engine.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age after which a cached partition is refetched on read.
    pub freshness_window: Duration,
    /// Send attempts before a queued message is marked failed.
    pub message_max_attempts: u32,
    /// Whether cached reads schedule background reconciliation.
    pub background_sync: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(300),
            message_max_attempts: 3,
            background_sync: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the freshness window.
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Set the number of send attempts for queued messages.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.message_max_attempts = attempts.max(1);
        self
    }

    /// Enable or disable background reconciliation after cached reads.
    pub fn with_background_sync(mut self, enabled: bool) -> Self {
        self.background_sync = enabled;
        self
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self::new()
            .with_freshness_window(Duration::from_secs(settings.freshness_window_secs))
            .with_max_attempts(settings.message_max_attempts)
    }
}
