//! Generic read-through cache over one entity kind.
//!
//! # Read Path
//!
//! An initial load serves the cached partition when it is neither stale nor
//! older than the freshness window, and schedules a background
//! reconciliation the caller never awaits. Otherwise it reads through the
//! network, overwrites the partition and clears its stale flag. A failed
//! network read degrades to whatever the store holds.
//!
//! A load with a cursor always goes to the network and merges the returned
//! page into the cached partition without touching `cachedAt`.
//!
//! # Write Discipline
//!
//! Every write reads the full partition, modifies it and writes it back.
//! Two writers racing on one partition resolve as last-write-wins; delta
//! sync re-reads before writing so the damage is limited to counters that
//! the next interaction sync repairs.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use salmart_client::{decode_body, decode_list, endpoints, InteractionsResponse};
use salmart_core::{EntityId, EntityKind, InteractionState, SalmartResult};
use salmart_storage::{read_json, write_json, CacheEntry, CacheRead, CacheableEntity, PartitionKey};
use tracing::{debug, warn};

use crate::adapters::{DeltaMode, EntityAdapter};
use crate::merge::{latest_created_at, merge_by_id, same_value};
use crate::notifier::Change;
use crate::state::EngineState;

/// Cache of one entity kind, sharing the engine's store, transport and
/// notifier. Cloning is cheap.
pub struct EntityCache<A: EntityAdapter> {
    pub(crate) state: Arc<EngineState>,
    _adapter: PhantomData<fn() -> A>,
}

impl<A: EntityAdapter> Clone for EntityCache<A> {
    fn clone(&self) -> Self {
        Self::new(self.state.clone())
    }
}

type Partition<A> = CacheEntry<Vec<<A as EntityAdapter>::Entity>>;

impl<A: EntityAdapter> EntityCache<A> {
    pub(crate) fn new(state: Arc<EngineState>) -> Self {
        Self {
            state,
            _adapter: PhantomData,
        }
    }

    pub fn kind(&self) -> EntityKind {
        A::KIND
    }

    /// Partition key of `qualifier` under the current owner.
    pub fn partition(&self, qualifier: &str) -> PartitionKey {
        PartitionKey::new(self.state.owner(), A::KIND, qualifier)
    }

    /// Read a partition.
    ///
    /// Never fails: a failed network read is reported through
    /// [`CacheRead::error`] with the stored copy (possibly empty) as value.
    pub async fn get(
        &self,
        qualifier: &str,
        cursor: Option<&EntityId>,
    ) -> CacheRead<Vec<A::Entity>> {
        let key = self.partition(qualifier);
        match cursor {
            Some(cursor) => self.load_more(&key, cursor).await,
            None => self.initial_load(&key).await,
        }
    }

    async fn initial_load(&self, key: &PartitionKey) -> CacheRead<Vec<A::Entity>> {
        let entry = self.load_entry(key).await;
        match &entry {
            Some(entry) => {
                let stale = self.state.is_stale(key).await;
                if !stale && !entry.is_expired(self.state.config.freshness_window) {
                    debug!(partition = %key, count = entry.data.len(), "Serving cached partition");
                    let mut items = entry.data.clone();
                    A::sort(&mut items);
                    self.schedule_reconcile(key.clone());
                    return CacheRead::from_cache(items, entry.cached_at);
                }
                debug!(partition = %key, stale = stale, "Cached partition needs refetch");
            }
            None => debug!(partition = %key, "Cache miss"),
        }

        match self.fetch_full(key).await {
            Ok(items) => CacheRead::from_network(items),
            Err(error) => {
                warn!(partition = %key, error = %error, "Initial load failed; serving stored copy");
                match entry {
                    Some(entry) => {
                        let mut items = entry.data;
                        A::sort(&mut items);
                        CacheRead::fallback(items, Some(entry.cached_at), error)
                    }
                    None => CacheRead::fallback(Vec::new(), None, error),
                }
            }
        }
    }

    async fn load_more(&self, key: &PartitionKey, cursor: &EntityId) -> CacheRead<Vec<A::Entity>> {
        let page = match self.fetch_list(key.qualifier(), None, Some(cursor)).await {
            Ok(page) => page,
            Err(error) => {
                warn!(partition = %key, cursor = %cursor, error = %error, "Load more failed");
                return CacheRead::fallback(Vec::new(), None, error);
            }
        };
        let mut page = merge_by_id(Vec::new(), page).items;
        A::sort(&mut page);

        if let Some(entry) = self.load_entry(key).await {
            let cached_at = entry.cached_at;
            let outcome = merge_by_id(entry.data, page.clone());
            if outcome.changed() {
                let mut items = outcome.items;
                A::sort(&mut items);
                self.write_entry(key, &CacheEntry::with_timestamp(items.clone(), cached_at))
                    .await;
                self.state
                    .publish(key.clone(), Change::Snapshot(A::batch(items)));
            }
        }
        CacheRead::from_network(page)
    }

    /// Fetch the whole partition and overwrite the cached copy.
    ///
    /// Local-only entities (temporary ids) survive the overwrite.
    pub async fn fetch_full(&self, key: &PartitionKey) -> SalmartResult<Vec<A::Entity>> {
        let fetched = self.fetch_list(key.qualifier(), None, None).await?;
        let local_only: Vec<A::Entity> = self
            .load_entry(key)
            .await
            .map(|entry| {
                entry
                    .data
                    .into_iter()
                    .filter(|e| EntityId::new(e.merge_key()).is_temporary())
                    .collect()
            })
            .unwrap_or_default();

        let mut items = merge_by_id(fetched, local_only).items;
        A::sort(&mut items);
        self.write_entry(key, &CacheEntry::new(items.clone())).await;
        self.state.clear_stale(key).await;
        debug!(partition = %key, count = items.len(), "Partition refreshed from network");
        self.state
            .publish(key.clone(), Change::Snapshot(A::batch(items.clone())));
        Ok(items)
    }

    async fn fetch_list(
        &self,
        qualifier: &str,
        since: Option<&salmart_core::Timestamp>,
        cursor: Option<&EntityId>,
    ) -> SalmartResult<Vec<A::Entity>> {
        let request = A::list_request(qualifier, since, cursor);
        let body = self.state.transport.fetch_json(request).await?;
        decode_list(body, A::LIST_FIELD)
    }

    // ------------------------------------------------------------------
    // Background reconciliation
    // ------------------------------------------------------------------

    fn schedule_reconcile(&self, key: PartitionKey) {
        if !self.state.config.background_sync {
            return;
        }
        let cache = self.clone();
        self.state.tasks.spawn(async move {
            cache.reconcile(&key).await;
        });
    }

    /// Delta sync followed by interaction sync. Failures are logged only.
    pub async fn reconcile(&self, key: &PartitionKey) {
        if let Err(e) = self.delta_sync(key).await {
            warn!(partition = %key, error = %e, "Delta sync failed");
        }
        if A::supports_interactions() {
            if let Err(e) = self.interaction_sync(key).await {
                warn!(partition = %key, error = %e, "Interaction sync failed");
            }
        }
    }

    /// Catch up with entities the server has that the partition lacks.
    ///
    /// Returns the number of entities that arrived or changed.
    pub async fn delta_sync(&self, key: &PartitionKey) -> SalmartResult<usize> {
        let Some(entry) = self.load_entry(key).await else {
            return Ok(0);
        };

        match A::DELTA_MODE {
            DeltaMode::Since => {
                let since = latest_created_at(&entry.data);
                let incoming = self.fetch_list(key.qualifier(), since.as_ref(), None).await?;
                if incoming.is_empty() {
                    return Ok(0);
                }
                // Re-read: the partition may have changed while the request was in flight
                let current = self.load_entry(key).await.unwrap_or(entry);
                let cached_at = current.cached_at;
                let outcome = merge_by_id(current.data, incoming);
                if !outcome.changed() {
                    return Ok(0);
                }
                let arrived = outcome.added + outcome.replaced;
                let mut items = outcome.items;
                A::sort(&mut items);
                self.write_entry(key, &CacheEntry::with_timestamp(items.clone(), cached_at))
                    .await;
                debug!(
                    partition = %key,
                    added = outcome.added,
                    replaced = outcome.replaced,
                    "Delta sync merged"
                );
                self.state
                    .publish(key.clone(), Change::Snapshot(A::batch(items)));
                Ok(arrived)
            }
            DeltaMode::Replace => {
                let before = entry.data;
                let items = self.fetch_full_quiet(key).await?;
                if same_value(&items, &before) {
                    return Ok(0);
                }
                self.state
                    .publish(key.clone(), Change::Snapshot(A::batch(items.clone())));
                Ok(items.len())
            }
        }
    }

    async fn fetch_full_quiet(&self, key: &PartitionKey) -> SalmartResult<Vec<A::Entity>> {
        let mut items = merge_by_id(Vec::new(), self.fetch_list(key.qualifier(), None, None).await?)
            .items;
        A::sort(&mut items);
        self.write_entry(key, &CacheEntry::new(items.clone())).await;
        self.state.clear_stale(key).await;
        Ok(items)
    }

    /// Refresh interaction counters of every cached entity in the partition.
    ///
    /// Returns the number of entities whose counters changed.
    pub async fn interaction_sync(&self, key: &PartitionKey) -> SalmartResult<usize> {
        let Some(entry) = self.load_entry(key).await else {
            return Ok(0);
        };
        let ids: Vec<EntityId> = entry
            .data
            .iter()
            .map(|e| EntityId::new(e.merge_key()))
            .filter(|id| !id.is_temporary())
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let Some(request) = endpoints::interactions(A::KIND, &ids) else {
            return Ok(0);
        };

        let body = self.state.transport.fetch_json(request).await?;
        let response: InteractionsResponse = decode_body(body)?;
        let states: HashMap<String, InteractionState> = response
            .interactions
            .into_iter()
            .map(|s| (s.id.as_str().to_string(), s))
            .collect();

        let changed = self
            .modify_partition(key, |entity| match states.get(entity.merge_key()) {
                Some(state) => A::apply_interaction(entity, state),
                None => false,
            })
            .await;
        Ok(changed.len())
    }

    // ------------------------------------------------------------------
    // Local updates
    // ------------------------------------------------------------------

    /// Cached partition under the current owner, without any network call.
    pub async fn cached(&self, qualifier: &str) -> Option<Partition<A>> {
        self.load_entry(&self.partition(qualifier)).await
    }

    /// Flag a partition so its next read goes to the network.
    pub async fn mark_stale(&self, qualifier: &str) {
        self.state.mark_stale(&self.partition(qualifier)).await;
    }

    pub async fn is_stale(&self, qualifier: &str) -> bool {
        self.state.is_stale(&self.partition(qualifier)).await
    }

    /// Qualifiers of every cached partition of this kind.
    pub async fn partitions(&self) -> Vec<String> {
        self.state.partitions(&self.state.owner(), A::KIND).await
    }

    /// Publish a snapshot of every cached partition of this kind.
    ///
    /// Returns the number of partitions published.
    pub async fn republish(&self) -> usize {
        let owner = self.state.owner();
        let mut published = 0;
        for qualifier in self.state.partitions(&owner, A::KIND).await {
            let key = PartitionKey::new(owner.clone(), A::KIND, qualifier);
            if let Some(entry) = self.load_entry(&key).await {
                self.state.publish(key, Change::Snapshot(A::batch(entry.data)));
                published += 1;
            }
        }
        published
    }

    /// Find an entity in one partition.
    pub async fn find_in(&self, key: &PartitionKey, id: &str) -> Option<A::Entity> {
        self.load_entry(key)
            .await?
            .data
            .into_iter()
            .find(|e| e.merge_key() == id)
    }

    /// Apply `f` to every entity of a partition.
    ///
    /// `f` returns whether it changed the entity. Changed entities are
    /// persisted and announced; a change of order is announced as a full
    /// snapshot. Returns the changed entities.
    pub async fn modify_partition<F>(&self, key: &PartitionKey, mut f: F) -> Vec<A::Entity>
    where
        F: FnMut(&mut A::Entity) -> bool + Send,
    {
        let Some(entry) = self.load_entry(key).await else {
            return Vec::new();
        };
        let cached_at = entry.cached_at;
        let order_before: Vec<String> =
            entry.data.iter().map(|e| e.merge_key().to_string()).collect();

        let mut items = entry.data;
        let mut changed = Vec::new();
        for item in items.iter_mut() {
            if f(item) {
                changed.push(item.clone());
            }
        }
        if changed.is_empty() {
            return changed;
        }

        A::sort(&mut items);
        let reordered = !items
            .iter()
            .map(|e| e.merge_key())
            .eq(order_before.iter().map(String::as_str));
        self.write_entry(key, &CacheEntry::with_timestamp(items.clone(), cached_at))
            .await;

        let change = if reordered {
            Change::Snapshot(A::batch(items))
        } else {
            Change::EntitiesUpdated(A::batch(changed.clone()))
        };
        self.state.publish(key.clone(), change);
        changed
    }

    /// Apply `f` in every cached partition of this kind.
    pub async fn update_everywhere<F>(&self, mut f: F) -> Vec<A::Entity>
    where
        F: FnMut(&mut A::Entity) -> bool + Send,
    {
        let owner = self.state.owner();
        let mut changed = Vec::new();
        for qualifier in self.state.partitions(&owner, A::KIND).await {
            let key = PartitionKey::new(owner.clone(), A::KIND, qualifier);
            changed.extend(self.modify_partition(&key, &mut f).await);
        }
        changed
    }

    /// Replace every cached copy of `entity` with this version.
    pub async fn replace_everywhere(&self, entity: &A::Entity) -> usize {
        let id = entity.merge_key().to_string();
        self.update_everywhere(|cached| {
            if cached.merge_key() != id || same_value(cached, entity) {
                return false;
            }
            *cached = entity.clone();
            true
        })
        .await
        .len()
    }

    /// Merge entities into a partition.
    ///
    /// A partition that was never fetched is only created when
    /// `create_missing` is set, and is then flagged stale so the next
    /// read still fetches it in full.
    pub async fn merge_into(
        &self,
        key: &PartitionKey,
        incoming: Vec<A::Entity>,
        create_missing: bool,
    ) -> bool {
        let (existing, cached_at) = match self.load_entry(key).await {
            Some(entry) => (entry.data, entry.cached_at),
            None if create_missing => {
                self.state.mark_stale(key).await;
                (Vec::new(), Utc::now())
            }
            None => return false,
        };
        let outcome = merge_by_id(existing, incoming);
        if !outcome.changed() {
            return false;
        }
        let mut items = outcome.items;
        A::sort(&mut items);
        self.write_entry(key, &CacheEntry::with_timestamp(items.clone(), cached_at))
            .await;
        self.state
            .publish(key.clone(), Change::Snapshot(A::batch(items)));
        true
    }

    /// Remove entities matching `pred` from one partition.
    pub async fn remove_where<P>(&self, key: &PartitionKey, pred: P) -> usize
    where
        P: Fn(&A::Entity) -> bool + Send,
    {
        let Some(entry) = self.load_entry(key).await else {
            return 0;
        };
        let before = entry.data.len();
        let items: Vec<A::Entity> = entry.data.into_iter().filter(|e| !pred(e)).collect();
        let removed = before - items.len();
        if removed > 0 {
            self.write_entry(key, &CacheEntry::with_timestamp(items.clone(), entry.cached_at))
                .await;
            self.state
                .publish(key.clone(), Change::Snapshot(A::batch(items)));
        }
        removed
    }

    /// Swap the entity stored under `old_id` for `replacement`.
    ///
    /// If `replacement`'s id is already cached the two collapse into one.
    pub async fn replace_entity(
        &self,
        key: &PartitionKey,
        old_id: &str,
        replacement: A::Entity,
    ) -> bool {
        let Some(entry) = self.load_entry(key).await else {
            return false;
        };
        let remaining: Vec<A::Entity> = entry
            .data
            .into_iter()
            .filter(|e| e.merge_key() != old_id)
            .collect();
        let mut items = merge_by_id(remaining, vec![replacement]).items;
        A::sort(&mut items);
        self.write_entry(key, &CacheEntry::with_timestamp(items.clone(), entry.cached_at))
            .await;
        self.state
            .publish(key.clone(), Change::Snapshot(A::batch(items)));
        true
    }

    // ------------------------------------------------------------------
    // Store access
    // ------------------------------------------------------------------

    pub(crate) async fn load_entry(&self, key: &PartitionKey) -> Option<Partition<A>> {
        read_json(self.state.store.as_ref(), &key.encode()).await
    }

    pub(crate) async fn write_entry(&self, key: &PartitionKey, entry: &Partition<A>) {
        write_json(self.state.store.as_ref(), &key.encode(), entry).await;
        self.state.register_partition(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ChatAdapter, CommentAdapter, THREADS_QUALIFIER};
    use crate::config::CacheConfig;
    use crate::notifier::{BroadcastNotifier, Notification};
    use scripted::ScriptedTransport;
    use chrono::Duration;
    use salmart_core::{Comment, Owner, UserId};
    use salmart_storage::MemoryStore;
    use serde_json::json;

    /// Minimal transport returning one canned body per route.
    mod scripted {
        use async_trait::async_trait;
        use salmart_client::{ApiRequest, ApiTransport};
        use salmart_core::{NetworkError, SalmartResult};
        use serde_json::Value;
        use std::collections::HashMap;
        use std::sync::Mutex;

        #[derive(Default)]
        pub struct ScriptedTransport {
            routes: Mutex<HashMap<String, Value>>,
            calls: Mutex<Vec<ApiRequest>>,
        }

        impl ScriptedTransport {
            pub fn route(&self, route: &str, body: Value) {
                self.routes.lock().unwrap().insert(route.to_string(), body);
            }

            pub fn calls(&self) -> Vec<ApiRequest> {
                self.calls.lock().unwrap().clone()
            }
        }

        #[async_trait]
        impl ApiTransport for ScriptedTransport {
            async fn fetch_json(&self, request: ApiRequest) -> SalmartResult<Value> {
                let route = request.route();
                self.calls.lock().unwrap().push(request);
                let body = self.routes.lock().unwrap().get(&route).cloned();
                body.ok_or_else(|| {
                    NetworkError::Transport {
                        reason: "offline".to_string(),
                    }
                    .into()
                })
            }
        }
    }

    fn setup() -> (
        EntityCache<CommentAdapter>,
        Arc<ScriptedTransport>,
        Arc<MemoryStore>,
        BroadcastNotifier,
    ) {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(ScriptedTransport::default());
        let notifier = BroadcastNotifier::new(64);
        let state = Arc::new(EngineState::new(
            store.clone(),
            transport.clone(),
            Arc::new(notifier.clone()),
            CacheConfig::new().with_background_sync(false),
            Owner::user("u1"),
        ));
        (EntityCache::new(state), transport, store, notifier)
    }

    fn comment(id: &str, minutes_ago: i64) -> Comment {
        Comment {
            id: EntityId::new(id),
            request_id: EntityId::new("r1"),
            author_id: UserId::new("u2"),
            author_name: String::new(),
            author_picture: None,
            text: id.to_string(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_cold_read_goes_to_network_once() {
        let (cache, transport, _store, _notifier) = setup();
        transport.route(
            "GET /requests/r1/comments",
            json!([comment("b", 1), comment("a", 5)]),
        );

        let read = cache.get("r1", None).await;
        assert!(matches!(read.source(), salmart_storage::ReadSource::Network));
        let ids: Vec<&str> = read.value().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(transport.calls().len(), 1);

        let again = cache.get("r1", None).await;
        assert!(again.was_cache_hit());
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_cold_read_is_empty_fallback() {
        let (cache, _transport, _store, _notifier) = setup();
        let read = cache.get("r1", None).await;
        assert!(read.is_fallback());
        assert!(read.value().is_empty());
        assert!(read.cached_at().is_none());
        assert!(cache.cached("r1").await.is_none());
    }

    #[tokio::test]
    async fn test_stale_flag_forces_refetch_and_clears() {
        let (cache, transport, _store, _notifier) = setup();
        transport.route("GET /requests/r1/comments", json!([comment("a", 1)]));
        cache.get("r1", None).await;

        cache.mark_stale("r1").await;
        assert!(cache.is_stale("r1").await);
        let read = cache.get("r1", None).await;
        assert!(!read.was_cache_hit());
        assert_eq!(transport.calls().len(), 2);
        assert!(!cache.is_stale("r1").await);
    }

    #[tokio::test]
    async fn test_modify_partition_publishes_targeted_update() {
        let (cache, transport, _store, notifier) = setup();
        transport.route("GET /requests/r1/comments", json!([comment("a", 2), comment("b", 1)]));
        cache.get("r1", None).await;
        let mut rx = notifier.subscribe();

        let key = cache.partition("r1");
        let changed = cache
            .modify_partition(&key, |c| {
                if c.id.as_str() == "b" {
                    c.text = "edited".to_string();
                    true
                } else {
                    false
                }
            })
            .await;
        assert_eq!(changed.len(), 1);

        let Notification { change, .. } = rx.recv().await.unwrap();
        assert!(matches!(change, Change::EntitiesUpdated(batch) if batch.ids() == vec!["b"]));
        assert_eq!(
            cache.find_in(&key, "b").await.map(|c| c.text),
            Some("edited".to_string())
        );
    }

    #[tokio::test]
    async fn test_merge_into_missing_partition_is_created_stale() {
        let (cache, _transport, _store, _notifier) = setup();
        let key = cache.partition("r9");
        assert!(!cache.merge_into(&key, vec![comment("x", 1)], false).await);
        assert!(cache.merge_into(&key, vec![comment("x", 1)], true).await);
        assert!(cache.is_stale("r9").await);
        assert_eq!(cache.partitions().await, vec!["r9".to_string()]);
    }

    #[tokio::test]
    async fn test_replace_mode_delta_sync_reports_only_changes() {
        let (cache, transport, store, _notifier) = setup();
        let chats: EntityCache<ChatAdapter> = EntityCache::new(cache.state.clone());
        let thread = json!({
            "peerId": "bob",
            "peerName": "Bob",
            "lastMessage": "hi",
            "lastMessageAt": "2026-01-01T00:00:00Z"
        });
        transport.route("GET /messages/threads", json!([thread]));
        chats.get(THREADS_QUALIFIER, None).await;
        let key = chats.partition(THREADS_QUALIFIER);

        assert_eq!(chats.delta_sync(&key).await.unwrap(), 0);
        assert!(store.len().await >= 2);
    }
}
