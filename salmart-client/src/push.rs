//! Server-pushed events.
//!
//! Frames arrive as `{"event": "<name>", "data": {...}}`. Each event carries
//! enough identity and delta to update the cache without a network round
//! trip.

use salmart_core::{Comment, EntityId, EntityKind, Message, Post, Request, UserId};
use serde::{Deserialize, Serialize};

fn default_kind() -> EntityKind {
    EntityKind::Post
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum PushEvent {
    /// Like set of a post or request changed.
    EntityLiked {
        entity_id: EntityId,
        #[serde(default = "default_kind")]
        kind: EntityKind,
        #[serde(default)]
        likes: Vec<UserId>,
    },
    /// A comment was added to a post or request.
    EntityCommented {
        entity_id: EntityId,
        #[serde(default = "default_kind")]
        kind: EntityKind,
        comment_count: u32,
        #[serde(default)]
        comment: Option<Comment>,
    },
    EntityCreated(Post),
    EntityPromoted {
        entity_id: EntityId,
    },
    EntityUnpromoted {
        entity_id: EntityId,
    },
    SoldStatusChanged {
        entity_id: EntityId,
        is_sold: bool,
    },
    ProfilePictureUpdated {
        user_id: UserId,
        #[serde(default)]
        profile_picture: Option<String>,
    },
    NewMessage(Message),
    RequestCreated(Request),
}

impl PushEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EntityLiked { .. } => "entity-liked",
            Self::EntityCommented { .. } => "entity-commented",
            Self::EntityCreated(_) => "entity-created",
            Self::EntityPromoted { .. } => "entity-promoted",
            Self::EntityUnpromoted { .. } => "entity-unpromoted",
            Self::SoldStatusChanged { .. } => "sold-status-changed",
            Self::ProfilePictureUpdated { .. } => "profile-picture-updated",
            Self::NewMessage(_) => "new-message",
            Self::RequestCreated(_) => "request-created",
        }
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// What the push listener reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Connected,
    Disconnected { reason: String },
    Push(PushEvent),
    /// A frame that did not decode as a [`PushEvent`].
    DecodeError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_entity_liked() {
        let event = PushEvent::decode(
            r#"{"event":"entity-liked","data":{"entityId":"p1","likes":["u1","u2"]}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            PushEvent::EntityLiked {
                entity_id: EntityId::new("p1"),
                kind: EntityKind::Post,
                likes: vec![UserId::new("u1"), UserId::new("u2")],
            }
        );
        assert_eq!(event.name(), "entity-liked");
    }

    #[test]
    fn test_decode_request_like_with_kind() {
        let event = PushEvent::decode(
            r#"{"event":"entity-liked","data":{"entityId":"r1","kind":"request","likes":[]}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            PushEvent::EntityLiked { kind: EntityKind::Request, .. }
        ));
    }

    #[test]
    fn test_decode_entity_created_carries_post() {
        let frame = json!({
            "event": "entity-created",
            "data": {
                "id": "p7",
                "authorId": "u3",
                "category": "fashion",
                "isPromoted": true,
                "createdAt": "2026-05-01T10:00:00Z"
            }
        });
        match PushEvent::decode(&frame.to_string()).unwrap() {
            PushEvent::EntityCreated(post) => {
                assert_eq!(post.category, "fashion");
                assert!(post.is_promoted);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_decode_sold_status_and_picture() {
        let sold = PushEvent::decode(
            r#"{"event":"sold-status-changed","data":{"entityId":"p2","isSold":true}}"#,
        )
        .unwrap();
        assert_eq!(
            sold,
            PushEvent::SoldStatusChanged {
                entity_id: EntityId::new("p2"),
                is_sold: true
            }
        );

        let picture = PushEvent::decode(
            r#"{"event":"profile-picture-updated","data":{"userId":"u1","profilePicture":"a.png"}}"#,
        )
        .unwrap();
        assert_eq!(picture.name(), "profile-picture-updated");
    }

    #[test]
    fn test_unknown_event_is_error() {
        assert!(PushEvent::decode(r#"{"event":"server-restarting","data":{}}"#).is_err());
    }
}
