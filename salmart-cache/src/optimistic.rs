//! Optimistic mutations.
//!
//! A mutation is applied locally first, announced, and then confirmed in
//! the background. On success the server's state overwrites the local
//! guess. On failure the affected entity (or list) is refetched from the
//! network instead of inverting the local change, because a second
//! mutation may have landed in between.

use std::sync::Arc;

use chrono::Utc;
use salmart_client::{decode_body, endpoints, LikeResponse};
use salmart_core::{
    EntityId, EntityKind, LikeAction, MutationKind, Owner, SalmartError, SalmartResult, UserId,
    UserSummary,
};
use salmart_storage::{CacheableEntity, PartitionKey};
use serde_json::json;
use tracing::{debug, warn};

use crate::adapters::{FollowingAdapter, LikableAdapter, SuggestionAdapter};
use crate::entity_cache::EntityCache;
use crate::notifier::Change;
use crate::state::EngineState;

/// Add or remove `user` in a like set. Returns whether the set changed.
pub fn toggle_like(likes: &mut Vec<UserId>, action: LikeAction, user: &UserId) -> bool {
    match action {
        LikeAction::Like => {
            if likes.contains(user) {
                false
            } else {
                likes.push(user.clone());
                true
            }
        }
        LikeAction::Unlike => {
            let before = likes.len();
            likes.retain(|u| u != user);
            likes.len() != before
        }
    }
}

impl<A: LikableAdapter> EntityCache<A> {
    /// Like or unlike an entity optimistically.
    ///
    /// Returns the locally updated entity immediately; the confirming
    /// request runs in the background.
    pub async fn apply_optimistic(
        &self,
        entity_id: &EntityId,
        action: LikeAction,
        acting_user: &UserId,
        qualifier: &str,
    ) -> SalmartResult<A::Entity> {
        let key = self.partition(qualifier);
        let mut proposed =
            self.find_in(&key, entity_id.as_str())
                .await
                .ok_or_else(|| SalmartError::NotCached {
                    kind: A::KIND,
                    id: entity_id.to_string(),
                })?;
        toggle_like(A::likes_mut(&mut proposed), action, acting_user);
        let likes = A::likes_mut(&mut proposed).clone();

        let token = self
            .state
            .pending
            .record(entity_id.as_str(), MutationKind::Like, json!(likes));
        self.set_likes(entity_id, &likes).await;
        debug!(
            entity_id = %entity_id,
            action = action.as_str(),
            likes = likes.len(),
            "Applied optimistic like"
        );

        let cache = self.clone();
        let id = entity_id.clone();
        self.state.tasks.spawn(async move {
            cache.confirm_like(id, action, key, token).await;
        });
        Ok(proposed)
    }

    /// Overwrite the like set in every cached copy.
    pub async fn set_likes(&self, entity_id: &EntityId, likes: &[UserId]) -> usize {
        self.update_everywhere(|entity| {
            if A::entity_id(entity) != entity_id {
                return false;
            }
            let current = A::likes_mut(entity);
            if current.as_slice() == likes {
                return false;
            }
            *current = likes.to_vec();
            true
        })
        .await
        .len()
    }

    pub fn is_like_pending(&self, entity_id: &EntityId) -> bool {
        self.state
            .pending
            .is_pending(entity_id.as_str(), MutationKind::Like)
    }

    async fn confirm_like(
        &self,
        entity_id: EntityId,
        action: LikeAction,
        key: PartitionKey,
        token: u64,
    ) {
        let Some(request) = endpoints::like(A::KIND, &entity_id, action) else {
            self.state
                .pending
                .clear(entity_id.as_str(), MutationKind::Like, token);
            return;
        };

        let result = match self.state.transport.fetch_json(request).await {
            Ok(body) => decode_body::<LikeResponse>(body),
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => {
                if let Some(likes) = response.likes {
                    self.set_likes(&entity_id, &likes).await;
                }
                self.state
                    .pending
                    .clear(entity_id.as_str(), MutationKind::Like, token);
                debug!(entity_id = %entity_id, "Like confirmed");
            }
            Err(error) => {
                self.state
                    .pending
                    .clear(entity_id.as_str(), MutationKind::Like, token);
                warn!(
                    entity_id = %entity_id,
                    error = %error,
                    "Like confirmation failed; refetching entity"
                );
                self.resync_entity(&entity_id, &key).await;
                self.state.publish(
                    key,
                    Change::MutationFailed {
                        entity_id: entity_id.to_string(),
                        kind: MutationKind::Like,
                        message: error.user_message(),
                    },
                );
            }
        }
    }

    /// Refetch one entity and write the server's version everywhere.
    ///
    /// A missing entity is dropped from the cache. Any other failure marks
    /// `key` stale so the next read resynchronizes the whole partition.
    pub async fn resync_entity(&self, entity_id: &EntityId, key: &PartitionKey) {
        let Some(request) = endpoints::entity(A::KIND, entity_id) else {
            return;
        };
        let result = match self.state.transport.fetch_json(request).await {
            Ok(body) => decode_body::<A::Entity>(body),
            Err(e) => Err(e),
        };
        match result {
            Ok(entity) => {
                self.replace_everywhere(&entity).await;
            }
            Err(SalmartError::Api(api)) if api.is_not_found() => {
                let owner = key.owner().clone();
                for qualifier in self.state.partitions(&owner, A::KIND).await {
                    let partition = PartitionKey::new(owner.clone(), A::KIND, qualifier);
                    self.remove_where(&partition, |e| e.merge_key() == entity_id.as_str())
                        .await;
                }
            }
            Err(error) => {
                warn!(entity_id = %entity_id, error = %error, "Entity resync failed");
                self.state.mark_stale(key).await;
            }
        }
    }
}

// ============================================================================
// FOLLOW GRAPH
// ============================================================================

/// Follow or unfollow a user optimistically.
///
/// The owner's following list gains or loses `user` at once and a followed
/// user leaves the suggestions. On failure the following list is refetched.
pub(crate) async fn set_following(
    state: &Arc<EngineState>,
    user: UserSummary,
    follow: bool,
) -> SalmartResult<()> {
    let me = state.signed_in_user(if follow { "follow" } else { "unfollow" })?;
    let owner = Owner::User(me.clone());
    let following = EntityCache::<FollowingAdapter>::new(state.clone());
    let key = PartitionKey::new(owner.clone(), EntityKind::Following, me.as_str());
    let token = state
        .pending
        .record(user.id.as_str(), MutationKind::Follow, json!(follow));

    if follow {
        let mut followed = user.clone();
        followed.followed_at.get_or_insert_with(Utc::now);
        following.merge_into(&key, vec![followed], false).await;

        let suggestions = EntityCache::<SuggestionAdapter>::new(state.clone());
        for qualifier in state.partitions(&owner, EntityKind::Suggestion).await {
            let partition = PartitionKey::new(owner.clone(), EntityKind::Suggestion, qualifier);
            suggestions.remove_where(&partition, |u| u.id == user.id).await;
        }
    } else {
        following.remove_where(&key, |u| u.id == user.id).await;
    }

    let task_state = state.clone();
    state.tasks.spawn(async move {
        confirm_follow(task_state, user.id, follow, key, token).await;
    });
    Ok(())
}

async fn confirm_follow(
    state: Arc<EngineState>,
    user_id: UserId,
    follow: bool,
    key: PartitionKey,
    token: u64,
) {
    let request = if follow {
        endpoints::follow(&user_id)
    } else {
        endpoints::unfollow(&user_id)
    };
    let result = state.transport.fetch_json(request).await;
    state
        .pending
        .clear(user_id.as_str(), MutationKind::Follow, token);

    match result {
        Ok(_) => debug!(user_id = %user_id, follow = follow, "Follow change confirmed"),
        Err(error) => {
            warn!(
                user_id = %user_id,
                follow = follow,
                error = %error,
                "Follow change failed; refetching following list"
            );
            let following = EntityCache::<FollowingAdapter>::new(state.clone());
            if following.load_entry(&key).await.is_some() {
                if let Err(e) = following.fetch_full(&key).await {
                    warn!(partition = %key, error = %e, "Following list refetch failed");
                    state.mark_stale(&key).await;
                }
            }
            state.publish(
                key,
                Change::MutationFailed {
                    entity_id: user_id.to_string(),
                    kind: MutationKind::Follow,
                    message: error.user_message(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_like() {
        let me = UserId::new("u1");
        let mut likes = vec![UserId::new("u2")];

        assert!(toggle_like(&mut likes, LikeAction::Like, &me));
        assert!(!toggle_like(&mut likes, LikeAction::Like, &me));
        assert_eq!(likes.len(), 2);

        assert!(toggle_like(&mut likes, LikeAction::Unlike, &me));
        assert!(!toggle_like(&mut likes, LikeAction::Unlike, &me));
        assert_eq!(likes, vec![UserId::new("u2")]);
    }
}
