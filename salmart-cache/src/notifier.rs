//! Change notifications.
//!
//! The engine publishes a [`Notification`] for every change to a cached
//! partition that is visible to the presentation layer. Delivery is
//! fire-and-forget and at-least-once: consumers must tolerate receiving the
//! same logical state twice. A [`BroadcastNotifier`] subscriber that lags
//! recovers through [`crate::CacheEngine::resnapshot`].

use salmart_core::{ChatThread, Comment, Message, MutationKind, Post, Request, UserSummary};
use salmart_storage::{CacheableEntity, PartitionKey};
use tokio::sync::broadcast;
use tracing::debug;

/// Entities of one kind, as carried by a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityBatch {
    Posts(Vec<Post>),
    Messages(Vec<Message>),
    Chats(Vec<ChatThread>),
    Users(Vec<UserSummary>),
    Requests(Vec<Request>),
    Comments(Vec<Comment>),
}

impl EntityBatch {
    pub fn len(&self) -> usize {
        match self {
            Self::Posts(v) => v.len(),
            Self::Messages(v) => v.len(),
            Self::Chats(v) => v.len(),
            Self::Users(v) => v.len(),
            Self::Requests(v) => v.len(),
            Self::Comments(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge keys of the carried entities, in order.
    pub fn ids(&self) -> Vec<String> {
        fn keys<T: CacheableEntity>(items: &[T]) -> Vec<String> {
            items.iter().map(|i| i.merge_key().to_string()).collect()
        }
        match self {
            Self::Posts(v) => keys(v),
            Self::Messages(v) => keys(v),
            Self::Chats(v) => keys(v),
            Self::Users(v) => keys(v),
            Self::Requests(v) => keys(v),
            Self::Comments(v) => keys(v),
        }
    }
}

/// What changed in a partition.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// The partition's full new contents.
    Snapshot(EntityBatch),
    /// Only these entities changed; order is unaffected.
    EntitiesUpdated(EntityBatch),
    /// A confirming request failed and local state was resynchronized.
    MutationFailed {
        entity_id: String,
        kind: MutationKind,
        message: String,
    },
}

impl Change {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::EntitiesUpdated(_) => "entities_updated",
            Self::MutationFailed { .. } => "mutation_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub partition: PartitionKey,
    pub change: Change,
}

impl Notification {
    pub fn new(partition: PartitionKey, change: Change) -> Self {
        Self { partition, change }
    }
}

/// Sink for change notifications.
pub trait Notifier: Send + Sync {
    fn publish(&self, notification: Notification);
}

/// Notifier backed by a tokio broadcast channel.
///
/// Publishing never blocks. Without subscribers the notification is
/// dropped. A subscriber that falls more than `capacity` notifications
/// behind gets `RecvError::Lagged`; it must then call
/// `Receiver::resubscribe` and [`crate::CacheEngine::resnapshot`], which
/// republishes the current state of every cached partition. The capacity
/// must exceed the number of cached partitions for that to fit.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, notification: Notification) {
        let change = notification.change.label();
        let partition = notification.partition.to_string();
        match self.tx.send(notification) {
            Ok(receivers) => {
                debug!(
                    partition = %partition,
                    change = change,
                    receivers = receivers,
                    "Published notification"
                );
            }
            Err(_) => {
                debug!(partition = %partition, change = change, "No receivers for notification");
            }
        }
    }
}

/// Notifier that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn publish(&self, _notification: Notification) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use salmart_core::{EntityKind, Owner};

    fn key() -> PartitionKey {
        PartitionKey::new(Owner::Anonymous, EntityKind::Post, "all")
    }

    #[test]
    fn test_publish_without_receivers_is_fine() {
        let notifier = BroadcastNotifier::new(4);
        notifier.publish(Notification::new(key(), Change::Snapshot(EntityBatch::Posts(vec![]))));
    }

    #[tokio::test]
    async fn test_subscriber_receives_notification() {
        let notifier = BroadcastNotifier::new(4);
        let mut rx = notifier.subscribe();
        let change = Change::MutationFailed {
            entity_id: "p1".to_string(),
            kind: MutationKind::Like,
            message: "offline".to_string(),
        };
        notifier.publish(Notification::new(key(), change.clone()));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.partition, key());
        assert_eq!(received.change, change);
    }

    #[test]
    fn test_batch_ids() {
        let batch = EntityBatch::Users(vec![UserSummary {
            id: "u1".into(),
            name: "Ada".to_string(),
            profile_picture: None,
            followed_at: None,
        }]);
        assert_eq!(batch.ids(), vec!["u1".to_string()]);
        assert_eq!(batch.len(), 1);
    }
}
