//! Marketplace entities as served by the Salmart API.
//!
//! Field names follow the server's camelCase JSON. Optional presentation
//! fields default when absent so older payloads still decode.

use serde::{Deserialize, Serialize};

use crate::enums::MessageStatus;
use crate::identity::{EntityId, Timestamp, UserId};

/// A marketplace listing in the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: EntityId,
    pub author_id: UserId,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_picture: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub likes: Vec<UserId>,
    #[serde(default)]
    pub comment_count: u32,
    #[serde(default)]
    pub is_promoted: bool,
    #[serde(default)]
    pub is_sold: bool,
    pub created_at: Timestamp,
}

/// A direct message between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: EntityId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default)]
    pub text: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    /// The other participant of the conversation, seen from `me`.
    pub fn peer_of<'a>(&'a self, me: &UserId) -> &'a UserId {
        if &self.sender_id == me {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }
}

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatThread {
    pub peer_id: UserId,
    #[serde(default)]
    pub peer_name: String,
    #[serde(default)]
    pub peer_picture: Option<String>,
    #[serde(default)]
    pub last_message: String,
    pub last_message_at: Timestamp,
    #[serde(default)]
    pub unread_count: u32,
}

/// A user as listed in follower, following and suggestion lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub followed_at: Option<Timestamp>,
}

/// A buyer request ("looking for ...") that others can like and comment on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: EntityId,
    pub author_id: UserId,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_picture: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub likes: Vec<UserId>,
    #[serde(default)]
    pub comment_count: u32,
    pub created_at: Timestamp,
}

/// A comment on a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: EntityId,
    pub request_id: EntityId,
    pub author_id: UserId,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_picture: Option<String>,
    #[serde(default)]
    pub text: String,
    pub created_at: Timestamp,
}

/// Current interaction counters for one entity, as returned by the batch
/// interactions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionState {
    pub id: EntityId,
    #[serde(default)]
    pub likes: Vec<UserId>,
    #[serde(default)]
    pub comments: u32,
}

/// A message the user composed, before it has any id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub receiver_id: UserId,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_decodes_minimal_payload() {
        let post: Post = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "authorId": "u9",
            "createdAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(post.id.as_str(), "p1");
        assert!(post.likes.is_empty());
        assert!(!post.is_promoted);
    }

    #[test]
    fn test_message_peer_of() {
        let message: Message = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "senderId": "alice",
            "receiverId": "bob",
            "createdAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(message.peer_of(&UserId::new("alice")).as_str(), "bob");
        assert_eq!(message.peer_of(&UserId::new("bob")).as_str(), "alice");
        assert_eq!(message.status, MessageStatus::Sent);
    }
}
