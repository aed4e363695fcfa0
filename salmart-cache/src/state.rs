//! State shared by every cache of one engine.

use salmart_client::ApiTransport;
use salmart_core::{EntityKind, Owner, SalmartError, SalmartResult, UserId};
use salmart_storage::{read_json, write_json, PartitionKey, PersistentStore};
use serde_json::Value;
use std::sync::{Arc, RwLock};

use crate::background::BackgroundTasks;
use crate::config::CacheConfig;
use crate::notifier::{Change, Notification, Notifier};
use crate::pending::PendingUpdates;

pub(crate) struct EngineState {
    pub(crate) store: Arc<dyn PersistentStore>,
    pub(crate) transport: Arc<dyn ApiTransport>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) config: CacheConfig,
    pub(crate) pending: PendingUpdates,
    pub(crate) tasks: BackgroundTasks,
    /// Serializes queue draining so a message is never sent twice.
    pub(crate) queue_lock: tokio::sync::Mutex<()>,
    /// Serializes read-modify-write of partition indexes.
    index_lock: tokio::sync::Mutex<()>,
    owner: RwLock<Owner>,
}

impl EngineState {
    pub(crate) fn new(
        store: Arc<dyn PersistentStore>,
        transport: Arc<dyn ApiTransport>,
        notifier: Arc<dyn Notifier>,
        config: CacheConfig,
        owner: Owner,
    ) -> Self {
        Self {
            store,
            transport,
            notifier,
            config,
            pending: PendingUpdates::new(),
            tasks: BackgroundTasks::new(),
            queue_lock: tokio::sync::Mutex::new(()),
            index_lock: tokio::sync::Mutex::new(()),
            owner: RwLock::new(owner),
        }
    }

    pub(crate) fn owner(&self) -> Owner {
        match self.owner.read() {
            Ok(owner) => owner.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn set_owner(&self, owner: Owner) {
        let mut slot = self
            .owner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = owner;
    }

    /// The signed-in user, or `SignedOut` for the anonymous namespace.
    pub(crate) fn signed_in_user(&self, action: &str) -> SalmartResult<UserId> {
        match self.owner() {
            Owner::User(id) => Ok(id),
            Owner::Anonymous => Err(SalmartError::SignedOut {
                action: action.to_string(),
            }),
        }
    }

    pub(crate) fn publish(&self, partition: PartitionKey, change: Change) {
        self.notifier.publish(Notification::new(partition, change));
    }

    // ------------------------------------------------------------------
    // Stale flags
    // ------------------------------------------------------------------

    pub(crate) async fn is_stale(&self, key: &PartitionKey) -> bool {
        matches!(
            self.store.get(&key.stale_key()).await,
            Some(Value::Bool(true))
        )
    }

    pub(crate) async fn mark_stale(&self, key: &PartitionKey) {
        tracing::debug!(partition = %key, "Marking partition stale");
        self.store.set(&key.stale_key(), Value::Bool(true)).await;
    }

    pub(crate) async fn clear_stale(&self, key: &PartitionKey) {
        self.store.delete(&key.stale_key()).await;
    }

    // ------------------------------------------------------------------
    // Partition index
    // ------------------------------------------------------------------

    /// Qualifiers of every cached partition of `kind` for `owner`.
    pub(crate) async fn partitions(&self, owner: &Owner, kind: EntityKind) -> Vec<String> {
        read_json::<Vec<String>>(self.store.as_ref(), &PartitionKey::index_key(owner, kind))
            .await
            .unwrap_or_default()
    }

    pub(crate) async fn register_partition(&self, key: &PartitionKey) {
        let _guard = self.index_lock.lock().await;
        let index_key = PartitionKey::index_key(key.owner(), key.kind());
        let mut qualifiers = self.partitions(key.owner(), key.kind()).await;
        if qualifiers.iter().any(|q| q == key.qualifier()) {
            return;
        }
        qualifiers.push(key.qualifier().to_string());
        write_json(self.store.as_ref(), &index_key, &qualifiers).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NoopNotifier;
    use async_trait::async_trait;
    use salmart_client::ApiRequest;
    use salmart_core::NetworkError;
    use salmart_storage::MemoryStore;

    struct Offline;

    #[async_trait]
    impl ApiTransport for Offline {
        async fn fetch_json(&self, _request: ApiRequest) -> SalmartResult<Value> {
            Err(NetworkError::Transport {
                reason: "offline".to_string(),
            }
            .into())
        }
    }

    fn state(owner: Owner) -> Arc<EngineState> {
        Arc::new(EngineState::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Offline),
            Arc::new(NoopNotifier),
            CacheConfig::new().with_background_sync(false),
            owner,
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_keep_every_qualifier() {
        let state = state(Owner::user("u1"));
        let handles: Vec<_> = (0..24)
            .map(|i| {
                let state = state.clone();
                tokio::spawn(async move {
                    let qualifier = format!("c{}", i);
                    let key = PartitionKey::new(Owner::user("u1"), EntityKind::Post, qualifier);
                    state.register_partition(&key).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut qualifiers = state.partitions(&Owner::user("u1"), EntityKind::Post).await;
        qualifiers.sort();
        let mut expected: Vec<String> = (0..24).map(|i| format!("c{}", i)).collect();
        expected.sort();
        assert_eq!(qualifiers, expected);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let state = state(Owner::Anonymous);
        let key = PartitionKey::new(Owner::Anonymous, EntityKind::Request, "all");
        state.register_partition(&key).await;
        state.register_partition(&key).await;
        assert_eq!(
            state.partitions(&Owner::Anonymous, EntityKind::Request).await,
            vec!["all".to_string()]
        );
    }

    #[test]
    fn test_poisoned_owner_lock_keeps_the_owner() {
        let state = state(Owner::user("u1"));
        let poisoner = state.clone();
        let _ = std::thread::spawn(move || {
            let _slot = poisoner.owner.write().unwrap();
            panic!("poison the owner lock");
        })
        .join();
        assert!(state.owner.is_poisoned());

        assert_eq!(state.owner(), Owner::user("u1"));
        state.set_owner(Owner::user("u2"));
        assert_eq!(state.owner(), Owner::user("u2"));
        assert_eq!(state.signed_in_user("post").unwrap(), UserId::new("u2"));
    }
}
