//! Enum types for Salmart entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity kind discriminator used to partition the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Post,
    Message,
    ChatThread,
    Follower,
    Following,
    Suggestion,
    Request,
    Comment,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Post,
        EntityKind::Message,
        EntityKind::ChatThread,
        EntityKind::Follower,
        EntityKind::Following,
        EntityKind::Suggestion,
        EntityKind::Request,
        EntityKind::Comment,
    ];

    /// Stable segment used in storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "posts",
            Self::Message => "messages",
            Self::ChatThread => "chats",
            Self::Follower => "followers",
            Self::Following => "following",
            Self::Suggestion => "suggestions",
            Self::Request => "requests",
            Self::Comment => "comments",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of a chat message as seen by its sender.
///
/// `Queued -> Sending -> {Sent | Queued (requeued) | Failed}`. `Failed` is
/// terminal; retrying creates a new queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    Sending,
    #[default]
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::Sending)
    }
}

/// Like toggle intent sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Like,
    Unlike,
}

impl LikeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Unlike => "unlike",
        }
    }
}

/// Kind of optimistic mutation, used to key in-flight records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Like,
    Follow,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Like => f.write_str("like"),
            Self::Follow => f.write_str("follow"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trips_through_key_segment() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("nope"), None);
    }

    #[test]
    fn test_like_action_wire_format() {
        assert_eq!(serde_json::to_string(&LikeAction::Unlike).unwrap(), "\"unlike\"");
    }

    #[test]
    fn test_message_status_pending() {
        assert!(MessageStatus::Queued.is_pending());
        assert!(MessageStatus::Sending.is_pending());
        assert!(!MessageStatus::Failed.is_pending());
        assert!(!MessageStatus::Sent.is_pending());
    }
}
