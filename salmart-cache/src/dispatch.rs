//! Push event dispatch.
//!
//! Every push event maps onto local update methods; no event triggers a
//! network round trip. Events only touch partitions that are already
//! cached. A partition the user never opened stays absent so its first
//! read is still a full fetch.

use salmart_client::{ListenerEvent, PushEvent, ALL_CATEGORIES};
use salmart_core::{
    Comment, EntityId, EntityKind, Message, MessageStatus, Post, Request, UserId,
};
use salmart_storage::PartitionKey;
use tracing::{debug, info, warn};

use crate::adapters::ALL_QUALIFIER;
use crate::engine::CacheEngine;
use crate::queue::{conversation_key, touch_thread};

impl CacheEngine {
    /// Apply one push event to the cache.
    ///
    /// Returns the number of cached records the event changed.
    pub async fn apply_push(&self, event: PushEvent) -> usize {
        let name = event.name();
        let changed = match event {
            PushEvent::EntityLiked {
                entity_id,
                kind,
                likes,
            } => self.push_likes(kind, &entity_id, &likes).await,
            PushEvent::EntityCommented {
                entity_id,
                kind,
                comment_count,
                comment,
            } => {
                self.push_comment(kind, &entity_id, comment_count, comment)
                    .await
            }
            PushEvent::EntityCreated(post) => self.push_post(post).await,
            PushEvent::EntityPromoted { entity_id } => self.push_promoted(&entity_id, true).await,
            PushEvent::EntityUnpromoted { entity_id } => {
                self.push_promoted(&entity_id, false).await
            }
            PushEvent::SoldStatusChanged { entity_id, is_sold } => {
                self.posts()
                    .update_everywhere(|post| {
                        if post.id != entity_id || post.is_sold == is_sold {
                            return false;
                        }
                        post.is_sold = is_sold;
                        true
                    })
                    .await
                    .len()
            }
            PushEvent::ProfilePictureUpdated {
                user_id,
                profile_picture,
            } => self.push_picture(&user_id, profile_picture).await,
            PushEvent::NewMessage(message) => self.push_message(message).await,
            PushEvent::RequestCreated(request) => self.push_request(request).await,
        };
        debug!(event = name, changed = changed, "Applied push event");
        changed
    }

    /// React to one listener event: reconnects drain the outbound queue.
    pub async fn handle_listener_event(&self, event: ListenerEvent) {
        match event {
            ListenerEvent::Connected => {
                info!(owner = %self.owner(), "Push channel connected; draining message queue");
                let report = self.drain_queue().await;
                if !report.failed.is_empty() {
                    warn!(failed = report.failed.len(), "Messages failed permanently");
                }
            }
            ListenerEvent::Disconnected { reason } => {
                info!(reason = %reason, "Push channel disconnected");
            }
            ListenerEvent::Push(push) => {
                self.apply_push(push).await;
            }
            ListenerEvent::DecodeError { message } => {
                warn!(error = %message, "Ignoring undecodable push frame");
            }
        }
    }

    async fn push_likes(&self, kind: EntityKind, id: &EntityId, likes: &[UserId]) -> usize {
        match kind {
            EntityKind::Post => self.posts().set_likes(id, likes).await,
            EntityKind::Request => self.requests().set_likes(id, likes).await,
            other => {
                debug!(kind = %other, entity_id = %id, "Like event for unlikable kind");
                0
            }
        }
    }

    async fn push_comment(
        &self,
        kind: EntityKind,
        id: &EntityId,
        count: u32,
        comment: Option<Comment>,
    ) -> usize {
        let mut changed = match kind {
            EntityKind::Post => {
                self.posts()
                    .update_everywhere(|post| set_count(&post.id, &mut post.comment_count, id, count))
                    .await
                    .len()
            }
            EntityKind::Request => {
                self.requests()
                    .update_everywhere(|request| {
                        set_count(&request.id, &mut request.comment_count, id, count)
                    })
                    .await
                    .len()
            }
            _ => 0,
        };
        if let Some(comment) = comment {
            let comments = self.comments();
            let key = comments.partition(comment.request_id.as_str());
            if comments.merge_into(&key, vec![comment], false).await {
                changed += 1;
            }
        }
        changed
    }

    async fn push_post(&self, post: Post) -> usize {
        let posts = self.posts();
        let mut qualifiers = vec![ALL_CATEGORIES.to_string()];
        if !post.category.is_empty() && post.category != ALL_CATEGORIES {
            qualifiers.push(post.category.clone());
        }
        let mut changed = 0;
        for qualifier in qualifiers {
            let key = posts.partition(&qualifier);
            if posts.merge_into(&key, vec![post.clone()], false).await {
                changed += 1;
            }
        }
        changed
    }

    async fn push_promoted(&self, id: &EntityId, promoted: bool) -> usize {
        self.posts()
            .update_everywhere(|post| {
                if &post.id != id || post.is_promoted == promoted {
                    return false;
                }
                post.is_promoted = promoted;
                true
            })
            .await
            .len()
    }

    async fn push_picture(&self, user: &UserId, picture: Option<String>) -> usize {
        let picture = picture.as_ref();
        let mut changed = 0;
        changed += self
            .posts()
            .update_everywhere(|p| set_picture(&p.author_id, &mut p.author_picture, user, picture))
            .await
            .len();
        changed += self
            .requests()
            .update_everywhere(|r| set_picture(&r.author_id, &mut r.author_picture, user, picture))
            .await
            .len();
        changed += self
            .comments()
            .update_everywhere(|c| set_picture(&c.author_id, &mut c.author_picture, user, picture))
            .await
            .len();
        changed += self
            .chats()
            .update_everywhere(|t| set_picture(&t.peer_id, &mut t.peer_picture, user, picture))
            .await
            .len();
        changed += self
            .followers()
            .update_everywhere(|u| set_picture(&u.id, &mut u.profile_picture, user, picture))
            .await
            .len();
        changed += self
            .following()
            .update_everywhere(|u| set_picture(&u.id, &mut u.profile_picture, user, picture))
            .await
            .len();
        changed += self
            .suggestions()
            .update_everywhere(|u| set_picture(&u.id, &mut u.profile_picture, user, picture))
            .await
            .len();
        changed
    }

    async fn push_message(&self, mut message: Message) -> usize {
        let owner = self.owner();
        let Some(me) = owner.user_id() else {
            debug!(id = %message.id, "Ignoring message push while signed out");
            return 0;
        };
        if &message.sender_id != me && &message.receiver_id != me {
            debug!(id = %message.id, "Ignoring message push for another user");
            return 0;
        }
        message.status = MessageStatus::Sent;
        let incoming = &message.sender_id != me;
        let peer = message.peer_of(me).clone();

        let key = conversation_key(&owner, &peer);
        let messages = self.messages();
        // Redelivered events must not count as unread twice
        if messages.find_in(&key, message.id.as_str()).await.is_some() {
            return 0;
        }
        let merged = messages.merge_into(&key, vec![message.clone()], false).await;
        touch_thread(&self.chats(), &owner, &message, incoming).await;
        usize::from(merged)
    }

    async fn push_request(&self, request: Request) -> usize {
        let requests = self.requests();
        let key = PartitionKey::new(self.owner(), EntityKind::Request, ALL_QUALIFIER);
        usize::from(requests.merge_into(&key, vec![request], false).await)
    }
}

fn set_count(id: &EntityId, field: &mut u32, target: &EntityId, count: u32) -> bool {
    if id != target || *field == count {
        return false;
    }
    *field = count;
    true
}

fn set_picture(
    id: &UserId,
    field: &mut Option<String>,
    target: &UserId,
    picture: Option<&String>,
) -> bool {
    if id != target || field.as_ref() == picture {
        return false;
    }
    *field = picture.cloned();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_count_only_touches_target() {
        let mut count = 3;
        assert!(!set_count(&EntityId::new("a"), &mut count, &EntityId::new("b"), 5));
        assert!(!set_count(&EntityId::new("a"), &mut count, &EntityId::new("a"), 3));
        assert!(set_count(&EntityId::new("a"), &mut count, &EntityId::new("a"), 5));
        assert_eq!(count, 5);
    }

    #[test]
    fn test_set_picture_clears_and_sets() {
        let user = UserId::new("u1");
        let new = "https://cdn/p.png".to_string();
        let mut field = None;
        assert!(set_picture(&user, &mut field, &user, Some(&new)));
        assert_eq!(field.as_deref(), Some("https://cdn/p.png"));
        assert!(!set_picture(&user, &mut field, &user, Some(&new)));
        assert!(set_picture(&user, &mut field, &user, None));
        assert!(field.is_none());
    }
}
