//! LMDB-backed persistent store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts.
//!
//! # Lazy Open
//!
//! The environment is opened on first use, so the store can be handed to
//! the engine before the storage directory is ready. If opening fails the
//! store stays unavailable for its lifetime: reads miss and writes are
//! dropped, each logged at `warn`.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get`
//! - Write transactions for `set`, `delete` and `delete_prefix`
//! - Statistics are tracked behind a `RwLock`

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use salmart_core::StorageError;
use serde_json::Value;
use tokio::sync::OnceCell;

use super::traits::{PersistentStore, StoreStats};

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for StorageError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Transaction(reason) => StorageError::Transaction { reason },
            other => StorageError::Unavailable {
                reason: other.to_string(),
            },
        }
    }
}

struct LmdbHandles {
    env: Env,
    db: Database<Bytes, Bytes>,
}

/// LMDB-backed persistent store.
///
/// # Example
///
/// ```ignore
/// use salmart_storage::{LmdbStore, PersistentStore};
///
/// let store = LmdbStore::new("/var/lib/salmart/cache", 64);
/// store.set("key", serde_json::json!([1, 2, 3])).await;
/// let value = store.get("key").await;
/// ```
pub struct LmdbStore {
    path: PathBuf,
    map_size_mb: usize,
    handles: OnceCell<Option<LmdbHandles>>,
    stats: RwLock<StoreStats>,
}

impl LmdbStore {
    /// Create a store that opens `path` on first use.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `map_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, map_size_mb: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            map_size_mb,
            handles: OnceCell::new(),
            stats: RwLock::new(StoreStats::default()),
        }
    }

    /// Open the environment now instead of on first use.
    ///
    /// Returns whether the store is usable.
    pub async fn ready(&self) -> bool {
        self.handles().await.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn handles(&self) -> Option<&LmdbHandles> {
        self.handles
            .get_or_init(|| async {
                match open_env(&self.path, self.map_size_mb) {
                    Ok(handles) => {
                        tracing::debug!(path = %self.path.display(), "Opened LMDB store");
                        Some(handles)
                    }
                    Err(e) => {
                        let err = StorageError::from(e);
                        tracing::warn!(
                            path = %self.path.display(),
                            error = %err,
                            "LMDB store unavailable; continuing without durable cache"
                        );
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    fn record(&self, f: impl FnOnce(&mut StoreStats)) {
        if let Ok(mut stats) = self.stats.write() {
            f(&mut stats);
        }
    }

    fn degrade(&self, op: &'static str, key: &str, err: LmdbStoreError) {
        let err = StorageError::from(err);
        tracing::warn!(op = op, key = key, error = %err, "LMDB operation failed");
        self.record(|s| s.failures += 1);
    }

    fn read(&self, handles: &LmdbHandles, key: &str) -> Result<Option<Vec<u8>>, LmdbStoreError> {
        let rtxn = handles
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        let bytes = handles
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(bytes.map(|b| b.to_vec()))
    }

    fn write(&self, handles: &LmdbHandles, key: &str, bytes: &[u8]) -> Result<(), LmdbStoreError> {
        let mut wtxn = handles
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        handles
            .db
            .put(&mut wtxn, key.as_bytes(), bytes)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, handles: &LmdbHandles, key: &str) -> Result<bool, LmdbStoreError> {
        let mut wtxn = handles
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        let deleted = handles
            .db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(deleted)
    }

    /// Iterate over keys matching a prefix and collect them.
    fn collect_keys_with_prefix(
        &self,
        handles: &LmdbHandles,
        prefix: &[u8],
    ) -> Result<Vec<Vec<u8>>, LmdbStoreError> {
        let rtxn = handles
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let mut keys = Vec::new();
        let iter = handles
            .db
            .iter(&rtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        for result in iter {
            match result {
                Ok((key, _)) => {
                    if key.starts_with(prefix) {
                        keys.push(key.to_vec());
                    }
                }
                Err(_) => continue,
            }
        }

        Ok(keys)
    }

    fn remove_all(&self, handles: &LmdbHandles, keys: &[Vec<u8>]) -> Result<u64, LmdbStoreError> {
        let mut wtxn = handles
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let mut deleted = 0u64;
        for key in keys {
            if handles.db.delete(&mut wtxn, key).unwrap_or(false) {
                deleted += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(deleted)
    }
}

fn open_env(path: &Path, map_size_mb: usize) -> Result<LmdbHandles, LmdbStoreError> {
    // Ensure directory exists
    std::fs::create_dir_all(path)?;

    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(map_size_mb * 1024 * 1024)
            .max_dbs(1)
            .open(path)
    }
    .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

    let mut wtxn = env
        .write_txn()
        .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

    let db: Database<Bytes, Bytes> = env
        .create_database(&mut wtxn, None)
        .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

    wtxn.commit()
        .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

    Ok(LmdbHandles { env, db })
}

#[async_trait]
impl PersistentStore for LmdbStore {
    async fn get(&self, key: &str) -> Option<Value> {
        let handles = self.handles().await?;
        let bytes = match self.read(handles, key) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.degrade("get", key, e);
                return None;
            }
        };
        let Some(bytes) = bytes else {
            self.record(|s| s.misses += 1);
            return None;
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                self.record(|s| s.hits += 1);
                Some(value)
            }
            Err(e) => {
                let err = StorageError::Deserialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, "Corrupt LMDB record treated as miss");
                self.record(|s| s.misses += 1);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Value) {
        let Some(handles) = self.handles().await else {
            return;
        };
        let bytes = match serde_json::to_vec(&value) {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = StorageError::Serialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, "Skipping unencodable LMDB write");
                return;
            }
        };
        match self.write(handles, key, &bytes) {
            Ok(()) => self.record(|s| s.writes += 1),
            Err(e) => self.degrade("set", key, e),
        }
    }

    async fn delete(&self, key: &str) {
        let Some(handles) = self.handles().await else {
            return;
        };
        if let Err(e) = self.remove(handles, key) {
            self.degrade("delete", key, e);
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> u64 {
        let Some(handles) = self.handles().await else {
            return 0;
        };
        let result = self
            .collect_keys_with_prefix(handles, prefix.as_bytes())
            .and_then(|keys| self.remove_all(handles, &keys));
        match result {
            Ok(deleted) => deleted,
            Err(e) => {
                self.degrade("delete_prefix", prefix, e);
                0
            }
        }
    }

    async fn stats(&self) -> StoreStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn is_durable(&self) -> bool {
        true
    }
}
