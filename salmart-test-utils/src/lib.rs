//! Salmart Test Utilities
//!
//! Shared test infrastructure for the Salmart workspace:
//! - Scripted mock transport with call log and failure injection
//! - Recording notifier
//! - Proptest generators for entity types
//! - Fixtures and a harness wiring a `CacheEngine` over an in-memory store

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

pub use salmart_cache::{
    BroadcastNotifier, CacheConfig, CacheEngine, Change, EntityBatch, Notification, Notifier,
};
pub use salmart_client::{ApiRequest, ApiTransport, Method};
pub use salmart_core::{
    ApiError, ChatThread, Comment, EntityId, EntityKind, LikeAction, Message, MessageStatus,
    MutationKind, NetworkError, OutgoingMessage, Owner, Post, Request, SalmartError,
    SalmartResult, Timestamp, UserId, UserSummary,
};
pub use salmart_storage::{MemoryStore, PartitionKey, PersistentStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// Transport answering from scripted routes.
///
/// Routes are keyed by `"METHOD /path"` (query excluded). One-shot
/// responses queued with [`MockTransport::respond_once`] are consumed
/// before the sticky response set with [`MockTransport::respond`]. A
/// route with neither fails like an unreachable server.
#[derive(Default)]
pub struct MockTransport {
    sticky: Mutex<HashMap<String, SalmartResult<Value>>>,
    once: Mutex<HashMap<String, VecDeque<SalmartResult<Value>>>>,
    calls: Mutex<Vec<ApiRequest>>,
    offline: Mutex<bool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request to `route` with `body`.
    pub fn respond(&self, route: &str, body: Value) {
        lock(&self.sticky).insert(route.to_string(), Ok(body));
    }

    /// Fail every request to `route` with `error`.
    pub fn fail(&self, route: &str, error: SalmartError) {
        lock(&self.sticky).insert(route.to_string(), Err(error));
    }

    /// Answer the next request to `route` with `result`.
    pub fn respond_once(&self, route: &str, result: SalmartResult<Value>) {
        lock(&self.once)
            .entry(route.to_string())
            .or_default()
            .push_back(result);
    }

    /// Fail every request with a transport error while set.
    pub fn set_offline(&self, offline: bool) {
        *lock(&self.offline) = offline;
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        lock(&self.calls).clone()
    }

    /// Number of requests made to `route`.
    pub fn calls_to(&self, route: &str) -> usize {
        lock(&self.calls).iter().filter(|r| r.route() == route).count()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn last_call(&self, route: &str) -> Option<ApiRequest> {
        lock(&self.calls)
            .iter()
            .rev()
            .find(|r| r.route() == route)
            .cloned()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }
}

#[async_trait]
impl ApiTransport for MockTransport {
    async fn fetch_json(&self, request: ApiRequest) -> SalmartResult<Value> {
        let route = request.route();
        lock(&self.calls).push(request);

        if *lock(&self.offline) {
            return Err(offline());
        }
        if let Some(result) = lock(&self.once).get_mut(&route).and_then(VecDeque::pop_front) {
            return result;
        }
        lock(&self.sticky)
            .get(&route)
            .cloned()
            .unwrap_or_else(|| Err(offline()))
    }
}

/// The error an unreachable server produces.
pub fn offline() -> SalmartError {
    NetworkError::Transport {
        reason: "connection refused".to_string(),
    }
    .into()
}

pub fn api_error(status: u16, message: &str) -> SalmartError {
    ApiError::new(status, message).into()
}

// ============================================================================
// RECORDING NOTIFIER
// ============================================================================

/// Notifier that keeps every notification for later inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.published).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.published).len()
    }

    pub fn for_partition(&self, key: &PartitionKey) -> Vec<Change> {
        lock(&self.published)
            .iter()
            .filter(|n| &n.partition == key)
            .map(|n| n.change.clone())
            .collect()
    }

    /// Notifications whose change label matches, e.g. `"mutation_failed"`.
    pub fn with_label(&self, label: &str) -> Vec<Notification> {
        lock(&self.published)
            .iter()
            .filter(|n| n.change.label() == label)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.published).clear();
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, notification: Notification) {
        lock(&self.published).push(notification);
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// A `CacheEngine` over an in-memory store and a scripted transport.
pub struct TestHarness {
    pub engine: CacheEngine,
    pub transport: Arc<MockTransport>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestHarness {
    /// Harness signed in as `user`, background sync disabled.
    pub fn signed_in(user: &str) -> Self {
        Self::with_config(
            Owner::user(user),
            CacheConfig::new().with_background_sync(false),
        )
    }

    pub fn anonymous() -> Self {
        Self::with_config(
            Owner::Anonymous,
            CacheConfig::new().with_background_sync(false),
        )
    }

    pub fn with_config(owner: Owner, config: CacheConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(MockTransport::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = CacheEngine::new(
            store.clone(),
            transport.clone(),
            notifier.clone(),
            config,
        )
        .with_owner(owner);
        Self {
            engine,
            transport,
            store,
            notifier,
        }
    }

    /// Partition key under the engine's current owner.
    pub fn key(&self, kind: EntityKind, qualifier: &str) -> PartitionKey {
        PartitionKey::new(self.engine.owner(), kind, qualifier)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Salmart entity types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        "u[0-9]{1,3}".prop_map(UserId::new)
    }

    /// Ids from a small space so generated batches collide.
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        (0u8..20).prop_map(|n| EntityId::new(format!("p{}", n)))
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-2030
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    pub fn arb_like_action() -> impl Strategy<Value = LikeAction> {
        prop_oneof![Just(LikeAction::Like), Just(LikeAction::Unlike)]
    }

    /// A like set without duplicates.
    pub fn arb_like_set() -> impl Strategy<Value = Vec<UserId>> {
        prop::collection::btree_set(arb_user_id(), 0..6).prop_map(|set| set.into_iter().collect())
    }

    pub fn arb_post() -> impl Strategy<Value = Post> {
        (
            arb_entity_id(),
            arb_user_id(),
            prop_oneof![Just("electronics"), Just("fashion"), Just("home")],
            "[a-z ]{0,24}",
            arb_like_set(),
            0u32..50,
            any::<bool>(),
            arb_timestamp(),
        )
            .prop_map(
                |(id, author, category, title, likes, comments, promoted, created_at)| Post {
                    id,
                    author_id: author,
                    author_name: String::new(),
                    author_picture: None,
                    category: category.to_string(),
                    title,
                    description: String::new(),
                    price: None,
                    photo: None,
                    likes,
                    comment_count: comments,
                    is_promoted: promoted,
                    is_sold: false,
                    created_at,
                },
            )
    }

    pub fn arb_posts(max: usize) -> impl Strategy<Value = Vec<Post>> {
        prop::collection::vec(arb_post(), 0..max)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built entities for common scenarios.

    use super::*;
    use chrono::{Duration, Utc};

    pub fn post(id: &str, category: &str, promoted: bool, minutes_ago: i64) -> Post {
        Post {
            id: EntityId::new(id),
            author_id: UserId::new("seller"),
            author_name: "Seller".to_string(),
            author_picture: None,
            category: category.to_string(),
            title: format!("Listing {}", id),
            description: String::new(),
            price: Some(10.0),
            photo: None,
            likes: Vec::new(),
            comment_count: 0,
            is_promoted: promoted,
            is_sold: false,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    pub fn request(id: &str, minutes_ago: i64) -> Request {
        Request {
            id: EntityId::new(id),
            author_id: UserId::new("buyer"),
            author_name: "Buyer".to_string(),
            author_picture: None,
            text: format!("Looking for {}", id),
            likes: Vec::new(),
            comment_count: 0,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    pub fn comment(id: &str, request_id: &str, minutes_ago: i64) -> Comment {
        Comment {
            id: EntityId::new(id),
            request_id: EntityId::new(request_id),
            author_id: UserId::new("commenter"),
            author_name: "Commenter".to_string(),
            author_picture: None,
            text: format!("Comment {}", id),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    pub fn message(id: &str, from: &str, to: &str, minutes_ago: i64) -> Message {
        Message {
            id: EntityId::new(id),
            sender_id: UserId::new(from),
            receiver_id: UserId::new(to),
            text: format!("Message {}", id),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            status: MessageStatus::Sent,
        }
    }

    pub fn thread(peer: &str, minutes_ago: i64) -> ChatThread {
        ChatThread {
            peer_id: UserId::new(peer),
            peer_name: peer.to_string(),
            peer_picture: None,
            last_message: "hello".to_string(),
            last_message_at: Utc::now() - Duration::minutes(minutes_ago),
            unread_count: 0,
        }
    }

    pub fn user(id: &str) -> UserSummary {
        UserSummary {
            id: UserId::new(id),
            name: id.to_string(),
            profile_picture: None,
            followed_at: None,
        }
    }

    pub fn outgoing(to: &str, text: &str) -> OutgoingMessage {
        OutgoingMessage {
            receiver_id: UserId::new(to),
            text: text.to_string(),
        }
    }

    /// Serialize entities as a list response body.
    pub fn list_body<T: serde::Serialize>(items: &[T]) -> Value {
        serde_json::to_value(items).unwrap_or(Value::Null)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Salmart-specific results.

    use super::*;

    #[track_caller]
    pub fn assert_signed_out<T: std::fmt::Debug>(result: &SalmartResult<T>) {
        match result {
            Err(SalmartError::SignedOut { .. }) => {}
            other => panic!("Expected SignedOut error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_cached<T: std::fmt::Debug>(result: &SalmartResult<T>, kind: EntityKind) {
        match result {
            Err(SalmartError::NotCached { kind: k, .. }) => {
                assert_eq!(*k, kind, "Wrong entity kind in NotCached error");
            }
            other => panic!("Expected NotCached error for {}, got: {:?}", kind, other),
        }
    }

    #[track_caller]
    pub fn assert_api_status<T: std::fmt::Debug>(result: &SalmartResult<T>, status: u16) {
        match result {
            Err(SalmartError::Api(api)) => assert_eq!(api.status, status, "Wrong API status"),
            other => panic!("Expected API error {}, got: {:?}", status, other),
        }
    }

    /// Assert ids of `items` in order.
    #[track_caller]
    pub fn assert_ids<T: salmart_storage::CacheableEntity>(items: &[T], expected: &[&str]) {
        let ids: Vec<&str> = items.iter().map(|i| i.merge_key()).collect();
        assert_eq!(ids, expected);
    }
}
