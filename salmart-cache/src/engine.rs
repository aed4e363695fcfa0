//! The cache engine.
//!
//! One [`CacheEngine`] is constructed per session with its store, transport
//! and notifier injected. It hands out typed [`EntityCache`]s that share
//! that state, and owns the cross-cutting operations: optimistic likes and
//! follows, the outbound message queue, push dispatch and owner
//! switching.

use std::future::Future;
use std::sync::Arc;

use salmart_client::ApiTransport;
use salmart_core::{
    ChatThread, Comment, EntityId, EntityKind, LikeAction, Message, MutationKind, OutgoingMessage,
    Owner, Post, Request, SalmartResult, UserId, UserSummary,
};
use salmart_storage::{CacheRead, PartitionKey, PersistentStore};
use tracing::{debug, info};

use crate::adapters::{
    ChatAdapter, CommentAdapter, FollowerAdapter, FollowingAdapter, MessageAdapter, PostAdapter,
    RequestAdapter, SuggestionAdapter, ALL_QUALIFIER, THREADS_QUALIFIER,
};
use crate::config::CacheConfig;
use crate::entity_cache::EntityCache;
use crate::notifier::Notifier;
use crate::optimistic::set_following;
use crate::queue::{send_via_transport, MessageQueue, MessageQueueEntry, QueueReport};
use crate::state::EngineState;

/// Offline-first cache over the Salmart API.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct CacheEngine {
    pub(crate) state: Arc<EngineState>,
}

impl CacheEngine {
    /// Build an engine in the anonymous namespace.
    pub fn new(
        store: Arc<dyn PersistentStore>,
        transport: Arc<dyn ApiTransport>,
        notifier: Arc<dyn Notifier>,
        config: CacheConfig,
    ) -> Self {
        Self {
            state: Arc::new(EngineState::new(
                store,
                transport,
                notifier,
                config,
                Owner::Anonymous,
            )),
        }
    }

    pub fn with_owner(self, owner: Owner) -> Self {
        self.state.set_owner(owner);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.state.config
    }

    pub fn is_durable(&self) -> bool {
        self.state.store.is_durable()
    }

    // ------------------------------------------------------------------
    // Typed caches
    // ------------------------------------------------------------------

    /// Posts, partitioned by category.
    pub fn posts(&self) -> EntityCache<PostAdapter> {
        EntityCache::new(self.state.clone())
    }

    pub fn requests(&self) -> EntityCache<RequestAdapter> {
        EntityCache::new(self.state.clone())
    }

    /// Comments, partitioned by request id.
    pub fn comments(&self) -> EntityCache<CommentAdapter> {
        EntityCache::new(self.state.clone())
    }

    /// Conversations, partitioned by peer id.
    pub fn messages(&self) -> EntityCache<MessageAdapter> {
        EntityCache::new(self.state.clone())
    }

    pub fn chats(&self) -> EntityCache<ChatAdapter> {
        EntityCache::new(self.state.clone())
    }

    pub fn followers(&self) -> EntityCache<FollowerAdapter> {
        EntityCache::new(self.state.clone())
    }

    pub fn following(&self) -> EntityCache<FollowingAdapter> {
        EntityCache::new(self.state.clone())
    }

    pub fn suggestions(&self) -> EntityCache<SuggestionAdapter> {
        EntityCache::new(self.state.clone())
    }

    pub fn queue(&self) -> MessageQueue {
        MessageQueue::new(self.state.clone())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_posts(&self, category: &str, cursor: Option<&EntityId>) -> CacheRead<Vec<Post>> {
        self.posts().get(category, cursor).await
    }

    pub async fn get_requests(&self, cursor: Option<&EntityId>) -> CacheRead<Vec<Request>> {
        self.requests().get(ALL_QUALIFIER, cursor).await
    }

    pub async fn get_comments(&self, request_id: &EntityId) -> CacheRead<Vec<Comment>> {
        self.comments().get(request_id.as_str(), None).await
    }

    pub async fn get_messages(
        &self,
        peer: &UserId,
        cursor: Option<&EntityId>,
    ) -> CacheRead<Vec<Message>> {
        self.messages().get(peer.as_str(), cursor).await
    }

    pub async fn get_chats(&self) -> CacheRead<Vec<ChatThread>> {
        self.chats().get(THREADS_QUALIFIER, None).await
    }

    pub async fn get_followers(&self, user: &UserId) -> CacheRead<Vec<UserSummary>> {
        self.followers().get(user.as_str(), None).await
    }

    pub async fn get_following(&self, user: &UserId) -> CacheRead<Vec<UserSummary>> {
        self.following().get(user.as_str(), None).await
    }

    pub async fn get_suggestions(&self) -> CacheRead<Vec<UserSummary>> {
        self.suggestions().get(ALL_QUALIFIER, None).await
    }

    /// Force the next read of a partition through the network.
    pub async fn mark_stale(&self, kind: EntityKind, qualifier: &str) {
        let key = PartitionKey::new(self.owner(), kind, qualifier);
        self.state.mark_stale(&key).await;
    }

    pub async fn is_stale(&self, kind: EntityKind, qualifier: &str) -> bool {
        let key = PartitionKey::new(self.owner(), kind, qualifier);
        self.state.is_stale(&key).await
    }

    // ------------------------------------------------------------------
    // Optimistic mutations
    // ------------------------------------------------------------------

    /// Like or unlike a post cached under `category` as the signed-in user.
    pub async fn like_post(
        &self,
        id: &EntityId,
        action: LikeAction,
        category: &str,
    ) -> SalmartResult<Post> {
        let me = self.state.signed_in_user("like a post")?;
        self.posts().apply_optimistic(id, action, &me, category).await
    }

    pub async fn like_request(&self, id: &EntityId, action: LikeAction) -> SalmartResult<Request> {
        let me = self.state.signed_in_user("like a request")?;
        self.requests()
            .apply_optimistic(id, action, &me, ALL_QUALIFIER)
            .await
    }

    pub async fn follow(&self, user: UserSummary) -> SalmartResult<()> {
        set_following(&self.state, user, true).await
    }

    pub async fn unfollow(&self, user: UserSummary) -> SalmartResult<()> {
        set_following(&self.state, user, false).await
    }

    /// Whether a mutation of `kind` on `entity_id` awaits confirmation.
    pub fn is_pending(&self, entity_id: &str, kind: MutationKind) -> bool {
        self.state.pending.is_pending(entity_id, kind)
    }

    // ------------------------------------------------------------------
    // Outbound messages
    // ------------------------------------------------------------------

    /// Queue a message without attempting to send it.
    pub async fn queue_message(&self, outgoing: OutgoingMessage) -> SalmartResult<Message> {
        self.queue().enqueue(outgoing).await
    }

    /// Queue a message and attempt it once right away.
    ///
    /// Returns the message in its resulting state: `sent` with the server's
    /// id, or still `queued` for the next drain.
    pub async fn send_message(&self, outgoing: OutgoingMessage) -> SalmartResult<Message> {
        let queue = self.queue();
        let queued = queue.enqueue(outgoing).await?;
        let state = self.state.clone();
        let result = queue
            .process_one(&queued.id, move |o| send_via_transport(state.clone(), o))
            .await;
        Ok(result.unwrap_or(queued))
    }

    /// Drain the queue with a caller-supplied send function.
    pub async fn process_queue<F, Fut>(&self, send: F) -> QueueReport
    where
        F: Fn(OutgoingMessage) -> Fut + Send + Sync,
        Fut: Future<Output = SalmartResult<Message>> + Send,
    {
        self.queue().process(send).await
    }

    /// Drain the queue through the engine's own transport.
    pub async fn drain_queue(&self) -> QueueReport {
        let state = self.state.clone();
        self.queue()
            .process(move |o| send_via_transport(state.clone(), o))
            .await
    }

    pub async fn retry_message(&self, temp_id: &EntityId) -> SalmartResult<Message> {
        self.queue().retry(temp_id).await
    }

    pub async fn queued_messages(&self) -> Vec<MessageQueueEntry> {
        self.queue().entries().await
    }

    // ------------------------------------------------------------------
    // Owner & lifecycle
    // ------------------------------------------------------------------

    pub fn owner(&self) -> Owner {
        self.state.owner()
    }

    /// Move the engine to another owner's namespace.
    ///
    /// In-flight mutations of the previous owner are forgotten; their
    /// confirmations still land in the previous owner's records.
    pub fn switch_owner(&self, owner: Owner) {
        let previous = self.owner();
        if previous == owner {
            return;
        }
        self.state.pending.clear_all();
        self.state.set_owner(owner.clone());
        info!(from = %previous, to = %owner, "Switched cache owner");
    }

    /// Delete every durable record of `owner`. Returns the count removed.
    pub async fn purge_owner(&self, owner: &Owner) -> u64 {
        let removed = self
            .state
            .store
            .delete_prefix(&PartitionKey::owner_prefix(owner))
            .await;
        info!(owner = %owner, removed = removed, "Purged cached records");
        removed
    }

    /// Publish a snapshot of every cached partition of the current owner.
    ///
    /// A subscriber that lagged behind the notification channel
    /// resubscribes and calls this to catch up with the current state.
    /// Returns the number of partitions published.
    pub async fn resnapshot(&self) -> usize {
        let published = self.posts().republish().await
            + self.requests().republish().await
            + self.comments().republish().await
            + self.messages().republish().await
            + self.chats().republish().await
            + self.followers().republish().await
            + self.following().republish().await
            + self.suggestions().republish().await;
        debug!(owner = %self.owner(), partitions = published, "Resnapshotted cached partitions");
        published
    }

    /// Wait for every background task spawned so far, including tasks they
    /// spawn in turn.
    pub async fn settle(&self) {
        self.state.tasks.settle().await;
    }

    pub fn background_tasks(&self) -> usize {
        self.state.tasks.in_flight()
    }
}
