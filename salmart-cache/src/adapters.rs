//! Per-entity-kind adapters.
//!
//! An adapter tells the generic [`crate::EntityCache`] which endpoint lists
//! a partition, how the partition sorts, and how interaction counters
//! apply. Qualifiers are the category for posts, the peer id for
//! conversations, the request id for comments and the user id for follow
//! lists.

use salmart_client::{endpoints, ApiRequest};
use salmart_core::{
    ChatThread, Comment, EntityId, EntityKind, InteractionState, Message, Post, Request, Timestamp,
    UserId, UserSummary,
};
use salmart_storage::CacheableEntity;

use crate::notifier::EntityBatch;

/// Qualifier of the single chat thread partition.
pub const THREADS_QUALIFIER: &str = "threads";
/// Qualifier of partitions that are not subdivided.
pub const ALL_QUALIFIER: &str = "all";

/// How background reconciliation catches up with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaMode {
    /// Fetch only entities created after the newest cached one.
    Since,
    /// Refetch the whole partition and replace it when it differs.
    Replace,
}

pub trait EntityAdapter: Send + Sync + 'static {
    type Entity: CacheableEntity;

    const KIND: EntityKind;

    /// Field holding the array when the server wraps list responses.
    const LIST_FIELD: &'static str;

    const DELTA_MODE: DeltaMode = DeltaMode::Since;

    fn list_request(
        qualifier: &str,
        since: Option<&Timestamp>,
        cursor: Option<&EntityId>,
    ) -> ApiRequest;

    /// Canonical display order of a partition.
    fn sort(items: &mut [Self::Entity]);

    fn batch(items: Vec<Self::Entity>) -> EntityBatch;

    /// Whether the batch interactions endpoint covers this kind.
    fn supports_interactions() -> bool {
        false
    }

    /// Overwrite interaction counters that differ. Returns whether any did.
    fn apply_interaction(_entity: &mut Self::Entity, _state: &InteractionState) -> bool {
        false
    }
}

/// Adapter for kinds that carry a like set.
pub trait LikableAdapter: EntityAdapter {
    fn likes_mut(entity: &mut Self::Entity) -> &mut Vec<UserId>;

    fn entity_id(entity: &Self::Entity) -> &EntityId;
}

fn apply_counters(
    likes: &mut Vec<UserId>,
    comment_count: &mut u32,
    state: &InteractionState,
) -> bool {
    let mut changed = false;
    if *likes != state.likes {
        *likes = state.likes.clone();
        changed = true;
    }
    if *comment_count != state.comments {
        *comment_count = state.comments;
        changed = true;
    }
    changed
}

// ============================================================================
// POSTS
// ============================================================================

pub struct PostAdapter;

impl EntityAdapter for PostAdapter {
    type Entity = Post;
    const KIND: EntityKind = EntityKind::Post;
    const LIST_FIELD: &'static str = "posts";

    fn list_request(
        qualifier: &str,
        since: Option<&Timestamp>,
        cursor: Option<&EntityId>,
    ) -> ApiRequest {
        endpoints::posts(qualifier, since, cursor)
    }

    /// Promoted first, then newest first.
    fn sort(items: &mut [Post]) {
        items.sort_by(|a, b| {
            b.is_promoted
                .cmp(&a.is_promoted)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
    }

    fn batch(items: Vec<Post>) -> EntityBatch {
        EntityBatch::Posts(items)
    }

    fn supports_interactions() -> bool {
        true
    }

    fn apply_interaction(entity: &mut Post, state: &InteractionState) -> bool {
        apply_counters(&mut entity.likes, &mut entity.comment_count, state)
    }
}

impl LikableAdapter for PostAdapter {
    fn likes_mut(entity: &mut Post) -> &mut Vec<UserId> {
        &mut entity.likes
    }

    fn entity_id(entity: &Post) -> &EntityId {
        &entity.id
    }
}

// ============================================================================
// REQUESTS & COMMENTS
// ============================================================================

pub struct RequestAdapter;

impl EntityAdapter for RequestAdapter {
    type Entity = Request;
    const KIND: EntityKind = EntityKind::Request;
    const LIST_FIELD: &'static str = "requests";

    fn list_request(
        _qualifier: &str,
        since: Option<&Timestamp>,
        cursor: Option<&EntityId>,
    ) -> ApiRequest {
        endpoints::requests(since, cursor)
    }

    fn sort(items: &mut [Request]) {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    fn batch(items: Vec<Request>) -> EntityBatch {
        EntityBatch::Requests(items)
    }

    fn supports_interactions() -> bool {
        true
    }

    fn apply_interaction(entity: &mut Request, state: &InteractionState) -> bool {
        apply_counters(&mut entity.likes, &mut entity.comment_count, state)
    }
}

impl LikableAdapter for RequestAdapter {
    fn likes_mut(entity: &mut Request) -> &mut Vec<UserId> {
        &mut entity.likes
    }

    fn entity_id(entity: &Request) -> &EntityId {
        &entity.id
    }
}

pub struct CommentAdapter;

impl EntityAdapter for CommentAdapter {
    type Entity = Comment;
    const KIND: EntityKind = EntityKind::Comment;
    const LIST_FIELD: &'static str = "comments";

    fn list_request(
        qualifier: &str,
        since: Option<&Timestamp>,
        _cursor: Option<&EntityId>,
    ) -> ApiRequest {
        endpoints::comments(&EntityId::new(qualifier), since)
    }

    /// Oldest first.
    fn sort(items: &mut [Comment]) {
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }

    fn batch(items: Vec<Comment>) -> EntityBatch {
        EntityBatch::Comments(items)
    }
}

// ============================================================================
// MESSAGES & CHATS
// ============================================================================

pub struct MessageAdapter;

impl EntityAdapter for MessageAdapter {
    type Entity = Message;
    const KIND: EntityKind = EntityKind::Message;
    const LIST_FIELD: &'static str = "messages";

    fn list_request(
        qualifier: &str,
        since: Option<&Timestamp>,
        cursor: Option<&EntityId>,
    ) -> ApiRequest {
        endpoints::messages(&UserId::new(qualifier), since, cursor)
    }

    /// Chronological, like a conversation.
    fn sort(items: &mut [Message]) {
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }

    fn batch(items: Vec<Message>) -> EntityBatch {
        EntityBatch::Messages(items)
    }
}

pub struct ChatAdapter;

impl EntityAdapter for ChatAdapter {
    type Entity = ChatThread;
    const KIND: EntityKind = EntityKind::ChatThread;
    const LIST_FIELD: &'static str = "threads";
    const DELTA_MODE: DeltaMode = DeltaMode::Replace;

    fn list_request(
        _qualifier: &str,
        _since: Option<&Timestamp>,
        _cursor: Option<&EntityId>,
    ) -> ApiRequest {
        endpoints::chat_threads()
    }

    /// Most recently active conversation first.
    fn sort(items: &mut [ChatThread]) {
        items.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    }

    fn batch(items: Vec<ChatThread>) -> EntityBatch {
        EntityBatch::Chats(items)
    }
}

// ============================================================================
// FOLLOW GRAPH
// ============================================================================

pub struct FollowerAdapter;

impl EntityAdapter for FollowerAdapter {
    type Entity = UserSummary;
    const KIND: EntityKind = EntityKind::Follower;
    const LIST_FIELD: &'static str = "followers";
    const DELTA_MODE: DeltaMode = DeltaMode::Replace;

    fn list_request(
        qualifier: &str,
        _since: Option<&Timestamp>,
        _cursor: Option<&EntityId>,
    ) -> ApiRequest {
        endpoints::followers(&UserId::new(qualifier))
    }

    /// Server order.
    fn sort(_items: &mut [UserSummary]) {}

    fn batch(items: Vec<UserSummary>) -> EntityBatch {
        EntityBatch::Users(items)
    }
}

pub struct FollowingAdapter;

impl EntityAdapter for FollowingAdapter {
    type Entity = UserSummary;
    const KIND: EntityKind = EntityKind::Following;
    const LIST_FIELD: &'static str = "following";
    const DELTA_MODE: DeltaMode = DeltaMode::Replace;

    fn list_request(
        qualifier: &str,
        _since: Option<&Timestamp>,
        _cursor: Option<&EntityId>,
    ) -> ApiRequest {
        endpoints::following(&UserId::new(qualifier))
    }

    fn sort(_items: &mut [UserSummary]) {}

    fn batch(items: Vec<UserSummary>) -> EntityBatch {
        EntityBatch::Users(items)
    }
}

pub struct SuggestionAdapter;

impl EntityAdapter for SuggestionAdapter {
    type Entity = UserSummary;
    const KIND: EntityKind = EntityKind::Suggestion;
    const LIST_FIELD: &'static str = "suggestions";
    const DELTA_MODE: DeltaMode = DeltaMode::Replace;

    fn list_request(
        _qualifier: &str,
        _since: Option<&Timestamp>,
        _cursor: Option<&EntityId>,
    ) -> ApiRequest {
        endpoints::suggestions()
    }

    fn sort(_items: &mut [UserSummary]) {}

    fn batch(items: Vec<UserSummary>) -> EntityBatch {
        EntityBatch::Users(items)
    }
}
