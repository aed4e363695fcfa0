//! Cached partition records and read results.
//!
//! A [`CacheEntry`] is what the store holds per partition. A
//! [`CacheRead`] is what the engine hands back to callers: the value plus
//! where it came from, so the presentation layer can tell a fresh network
//! read from a fallback after a failed load.

use chrono::{DateTime, Utc};
use salmart_core::SalmartError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Durable record of one partition.
///
/// `cached_at` is always set at write time. The absence of an entry means
/// "never fetched", which is different from an entry holding an empty array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Wrap `data`, stamping it with the current time.
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    /// Wrap `data` with an explicit timestamp.
    pub fn with_timestamp(data: T, cached_at: DateTime<Utc>) -> Self {
        Self { data, cached_at }
    }

    /// How long ago this entry was written.
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Whether the entry is older than the freshness window.
    pub fn is_expired(&self, freshness_window: Duration) -> bool {
        self.age() >= freshness_window
    }

    /// Replace the data, keeping the original timestamp.
    pub fn map<U, F>(self, f: F) -> CacheEntry<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheEntry {
            data: f(self.data),
            cached_at: self.cached_at,
        }
    }
}

/// Where a read was served from.
#[derive(Debug, Clone)]
pub enum ReadSource {
    /// Fresh cached copy; a background reconciliation was scheduled.
    Cache,
    /// Network read-through.
    Network,
    /// The network read failed; the value is whatever the store held
    /// (possibly empty).
    Fallback { error: SalmartError },
}

/// Result of a cache read, carrying provenance metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: Option<DateTime<Utc>>,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    /// Create a read served from the cache.
    pub fn from_cache(value: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at: Some(cached_at),
            source: ReadSource::Cache,
        }
    }

    /// Create a read served by the network.
    pub fn from_network(value: T) -> Self {
        Self {
            value,
            cached_at: Some(Utc::now()),
            source: ReadSource::Network,
        }
    }

    /// Create a degraded read after a network failure.
    pub fn fallback(value: T, cached_at: Option<DateTime<Utc>>, error: SalmartError) -> Self {
        Self {
            value,
            cached_at,
            source: ReadSource::Fallback { error },
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Get a reference to the underlying value.
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        self.cached_at
    }

    pub fn source(&self) -> &ReadSource {
        &self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        matches!(self.source, ReadSource::Cache)
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ReadSource::Fallback { .. })
    }

    /// The load error, when this read is a fallback.
    pub fn error(&self) -> Option<&SalmartError> {
        match &self.source {
            ReadSource::Fallback { error } => Some(error),
            _ => None,
        }
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            source: self.source,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
