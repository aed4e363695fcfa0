//! Persistent store capability and cacheable entity marker.
//!
//! The cache engine depends on [`PersistentStore`] abstractly. Which
//! implementation backs it (LMDB, memory, no-op) is decided once at
//! construction time.

use async_trait::async_trait;
use salmart_core::{
    ChatThread, Comment, Message, Post, Request, StorageError, Timestamp, UserSummary,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Marker trait for types that can be cached in a partition.
///
/// # Implementation Requirements
///
/// - `merge_key()` must be stable for the lifetime of the entity; two
///   values with the same key are versions of the same entity
/// - `created_at()` returns the timestamp delta sync uses as the `since`
///   watermark, or `None` for entities without a creation time
pub trait CacheableEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identity used to deduplicate within a partition.
    fn merge_key(&self) -> &str;

    /// Creation time of this entity, if it has one.
    fn created_at(&self) -> Option<Timestamp>;
}

/// Asynchronous durable key-value store.
///
/// Every operation is infallible from the caller's point of view. An
/// implementation that cannot reach its storage logs the failure and
/// resolves to `None` or a no-op, so callers always fall back to treating
/// the read as a cache miss.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Replace the value stored under `key`.
    async fn set(&self, key: &str, value: Value);

    /// Remove the value stored under `key`, if any.
    async fn delete(&self, key: &str);

    /// Remove every value whose key starts with `prefix`.
    ///
    /// Returns the number of removed entries.
    async fn delete_prefix(&self, prefix: &str) -> u64;

    /// Get store statistics.
    async fn stats(&self) -> StoreStats;

    /// Whether writes survive a process restart.
    fn is_durable(&self) -> bool {
        true
    }
}

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of reads that found a value.
    pub hits: u64,
    /// Number of reads that found nothing.
    pub misses: u64,
    /// Number of writes.
    pub writes: u64,
    /// Number of operations that degraded because storage failed.
    pub failures: u64,
}

impl StoreStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Read and decode a typed value. Undecodable records count as a miss.
pub async fn read_json<T>(store: &dyn PersistentStore, key: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    let value = store.get(key).await?;
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            let err = StorageError::Deserialization {
                key: key.to_string(),
                reason: e.to_string(),
            };
            tracing::warn!(error = %err, "Discarding undecodable record");
            None
        }
    }
}

/// Encode and write a typed value. Encoding failures are logged and skipped.
pub async fn write_json<T>(store: &dyn PersistentStore, key: &str, value: &T)
where
    T: Serialize + ?Sized,
{
    match serde_json::to_value(value) {
        Ok(encoded) => store.set(key, encoded).await,
        Err(e) => {
            let err = StorageError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            };
            tracing::warn!(error = %err, "Skipping unencodable record");
        }
    }
}

// ============================================================================
// IMPLEMENTATIONS FOR SALMART ENTITIES
// ============================================================================

impl CacheableEntity for Post {
    fn merge_key(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<Timestamp> {
        Some(self.created_at)
    }
}

impl CacheableEntity for Message {
    fn merge_key(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<Timestamp> {
        Some(self.created_at)
    }
}

impl CacheableEntity for ChatThread {
    fn merge_key(&self) -> &str {
        // One thread per peer
        self.peer_id.as_str()
    }

    fn created_at(&self) -> Option<Timestamp> {
        Some(self.last_message_at)
    }
}

impl CacheableEntity for UserSummary {
    fn merge_key(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<Timestamp> {
        self.followed_at
    }
}

impl CacheableEntity for Request {
    fn merge_key(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<Timestamp> {
        Some(self.created_at)
    }
}

impl CacheableEntity for Comment {
    fn merge_key(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<Timestamp> {
        Some(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use salmart_core::{EntityId, UserId};

    #[test]
    fn test_store_stats_hit_rate() {
        let stats = StoreStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = StoreStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_chat_thread_merges_by_peer() {
        let thread = ChatThread {
            peer_id: UserId::new("bob"),
            peer_name: "Bob".to_string(),
            peer_picture: None,
            last_message: "hi".to_string(),
            last_message_at: chrono::Utc::now(),
            unread_count: 0,
        };
        assert_eq!(thread.merge_key(), "bob");
    }

    #[tokio::test]
    async fn test_read_json_treats_wrong_shape_as_miss() {
        let store = MemoryStore::new();
        store.set("k", serde_json::json!({"not": "a post"})).await;
        let post = read_json::<Post>(&store, "k").await;
        assert!(post.is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_json() {
        let store = MemoryStore::new();
        let comment = Comment {
            id: EntityId::new("c1"),
            request_id: EntityId::new("r1"),
            author_id: UserId::new("u1"),
            author_name: String::new(),
            author_picture: None,
            text: "still available?".to_string(),
            created_at: chrono::Utc::now(),
        };
        write_json(&store, "k", &comment).await;
        let back = read_json::<Comment>(&store, "k").await;
        assert_eq!(back, Some(comment));
    }
}
