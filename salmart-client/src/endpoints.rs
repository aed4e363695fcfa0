//! Endpoint catalogue for the Salmart API.
//!
//! Every request the cache engine issues is built here, so paths and query
//! parameter names live in one place.

use chrono::SecondsFormat;
use salmart_core::{
    EntityId, EntityKind, InteractionState, LikeAction, OutgoingMessage, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::transport::ApiRequest;

/// Feed category that means "no category filter".
pub const ALL_CATEGORIES: &str = "all";

/// Body returned by the like endpoints.
///
/// `likes` is absent when the server only acknowledges the toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeResponse {
    #[serde(default)]
    pub likes: Option<Vec<UserId>>,
}

/// Body returned by the batch interactions endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionsResponse {
    #[serde(default)]
    pub interactions: Vec<InteractionState>,
}

/// Wire format of `since` and other timestamp parameters.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Collection path of entity kinds that support likes and interactions.
pub fn likable_path(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Post => Some("/posts"),
        EntityKind::Request => Some("/requests"),
        _ => None,
    }
}

// ============================================================================
// POSTS
// ============================================================================

pub fn posts(category: &str, since: Option<&Timestamp>, before: Option<&EntityId>) -> ApiRequest {
    let category = (category != ALL_CATEGORIES && !category.is_empty()).then_some(category);
    ApiRequest::get("/posts")
        .with_query_opt("category", category)
        .with_query_opt("since", since.map(format_timestamp))
        .with_query_opt("before", before.map(EntityId::as_str))
}

pub fn post(id: &EntityId) -> ApiRequest {
    ApiRequest::get(format!("/posts/{}", id))
}

// ============================================================================
// REQUESTS & COMMENTS
// ============================================================================

pub fn requests(since: Option<&Timestamp>, before: Option<&EntityId>) -> ApiRequest {
    ApiRequest::get("/requests")
        .with_query_opt("since", since.map(format_timestamp))
        .with_query_opt("before", before.map(EntityId::as_str))
}

pub fn request(id: &EntityId) -> ApiRequest {
    ApiRequest::get(format!("/requests/{}", id))
}

pub fn comments(request_id: &EntityId, since: Option<&Timestamp>) -> ApiRequest {
    ApiRequest::get(format!("/requests/{}/comments", request_id))
        .with_query_opt("since", since.map(format_timestamp))
}

// ============================================================================
// LIKES & INTERACTIONS (posts and requests)
// ============================================================================

/// `POST {collection}/{id}/like` with `{action}`.
pub fn like(kind: EntityKind, id: &EntityId, action: LikeAction) -> Option<ApiRequest> {
    let base = likable_path(kind)?;
    Some(ApiRequest::post(
        format!("{}/{}/like", base, id),
        json!({ "action": action.as_str() }),
    ))
}

/// `POST {collection}/interactions` with `{ids}`.
pub fn interactions(kind: EntityKind, ids: &[EntityId]) -> Option<ApiRequest> {
    let base = likable_path(kind)?;
    Some(ApiRequest::post(
        format!("{}/interactions", base),
        json!({ "ids": ids }),
    ))
}

/// Single-entity refetch used to resynchronize after a failed mutation.
pub fn entity(kind: EntityKind, id: &EntityId) -> Option<ApiRequest> {
    match kind {
        EntityKind::Post => Some(post(id)),
        EntityKind::Request => Some(request(id)),
        _ => None,
    }
}

// ============================================================================
// MESSAGES & CHATS
// ============================================================================

pub fn messages(
    peer: &UserId,
    since: Option<&Timestamp>,
    before: Option<&EntityId>,
) -> ApiRequest {
    ApiRequest::get("/messages")
        .with_query("userId", peer.as_str())
        .with_query_opt("since", since.map(format_timestamp))
        .with_query_opt("before", before.map(EntityId::as_str))
}

pub fn send_message(message: &OutgoingMessage) -> ApiRequest {
    ApiRequest::post(
        "/messages",
        json!({ "receiverId": message.receiver_id, "text": message.text }),
    )
}

pub fn chat_threads() -> ApiRequest {
    ApiRequest::get("/messages/threads")
}

// ============================================================================
// FOLLOW GRAPH
// ============================================================================

pub fn followers(user: &UserId) -> ApiRequest {
    ApiRequest::get(format!("/users/{}/followers", user))
}

pub fn following(user: &UserId) -> ApiRequest {
    ApiRequest::get(format!("/users/{}/following", user))
}

pub fn suggestions() -> ApiRequest {
    ApiRequest::get("/users/suggestions")
}

pub fn follow(user: &UserId) -> ApiRequest {
    ApiRequest::post(format!("/follow/{}", user), json!({}))
}

pub fn unfollow(user: &UserId) -> ApiRequest {
    ApiRequest::post(format!("/unfollow/{}", user), json!({}))
}
