//! In-flight optimistic mutations.
//!
//! Never persisted: after a restart the next read simply reflects server
//! state.

use chrono::Utc;
use salmart_core::{MutationKind, Timestamp};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    /// Locally proposed value.
    pub proposed: Value,
    pub started_at: Timestamp,
    token: u64,
}

impl PendingUpdate {
    pub fn token(&self) -> u64 {
        self.token
    }
}

/// Pending updates keyed by (entity id, mutation kind).
///
/// A second mutation on the same key replaces the first's record. A
/// completing mutation clears the record only if it still owns it.
#[derive(Debug, Default)]
pub struct PendingUpdates {
    entries: RwLock<HashMap<(String, MutationKind), PendingUpdate>>,
    next_token: AtomicU64,
}

impl PendingUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mutation and return its ownership token.
    pub fn record(&self, entity_id: &str, kind: MutationKind, proposed: Value) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                (entity_id.to_string(), kind),
                PendingUpdate {
                    proposed,
                    started_at: Utc::now(),
                    token,
                },
            );
        }
        token
    }

    /// Clear the record if `token` still owns it. Returns whether it did.
    pub fn clear(&self, entity_id: &str, kind: MutationKind, token: u64) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        let key = (entity_id.to_string(), kind);
        match entries.get(&key) {
            Some(update) if update.token == token => {
                entries.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, entity_id: &str, kind: MutationKind) -> Option<PendingUpdate> {
        self.entries
            .read()
            .ok()?
            .get(&(entity_id.to_string(), kind))
            .cloned()
    }

    pub fn is_pending(&self, entity_id: &str, kind: MutationKind) -> bool {
        self.get(entity_id, kind).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear_all(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}
