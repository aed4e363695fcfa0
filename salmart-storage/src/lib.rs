//! Salmart Storage - Persistent Store Layer
//!
//! Durable key-value storage for the offline cache, plus the owner-scoped
//! key scheme every cached record is addressed by.

pub mod entry;
pub mod lmdb_backend;
pub mod memory;
pub mod partition;
pub mod traits;

pub use entry::{CacheEntry, CacheRead, ReadSource};
pub use lmdb_backend::{LmdbStore, LmdbStoreError};
pub use memory::{MemoryStore, NoopStore};
pub use partition::PartitionKey;
pub use traits::{read_json, write_json, CacheableEntity, PersistentStore, StoreStats};
