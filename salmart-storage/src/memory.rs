//! Non-durable store implementations.
//!
//! [`MemoryStore`] keeps everything in a map for tests and short-lived
//! sessions. [`NoopStore`] is selected when no durable storage exists at
//! all: every read misses, so the engine degrades to pure pass-through.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use super::traits::{PersistentStore, StoreStats};

/// In-memory store.
///
/// Uses tokio::sync::RwLock for safe async access.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: tokio::sync::RwLock<HashMap<String, Value>>,
    stats: std::sync::RwLock<StoreStats>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// All keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn record(&self, f: impl FnOnce(&mut StoreStats)) {
        if let Ok(mut stats) = self.stats.write() {
            f(&mut stats);
        }
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<Value> {
        let value = self.entries.read().await.get(key).cloned();
        self.record(|s| {
            if value.is_some() {
                s.hits += 1;
            } else {
                s.misses += 1;
            }
        });
        value
    }

    async fn set(&self, key: &str, value: Value) {
        self.entries.write().await.insert(key.to_string(), value);
        self.record(|s| s.writes += 1);
    }

    async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    async fn delete_prefix(&self, prefix: &str) -> u64 {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        (before - entries.len()) as u64
    }

    async fn stats(&self) -> StoreStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn is_durable(&self) -> bool {
        false
    }
}

/// Store for environments without durable storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

#[async_trait]
impl PersistentStore for NoopStore {
    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn set(&self, _key: &str, _value: Value) {}

    async fn delete(&self, _key: &str) {}

    async fn delete_prefix(&self, _prefix: &str) -> u64 {
        0
    }

    async fn stats(&self) -> StoreStats {
        StoreStats::default()
    }

    fn is_durable(&self) -> bool {
        false
    }
}
