//! Outbound message queue.
//!
//! # State Machine
//!
//! ```text
//! queued -> sending -> sent
//!                   -> queued (requeued, attempts < max)
//!                   -> failed (attempts >= max, terminal)
//! ```
//!
//! A queued message lives in two places: the owner's queue record, which
//! drives retries, and the conversation partition, where it shows as a
//! pending bubble under its temporary id. Draining is triggered from
//! outside (for example on reconnect) with a caller-supplied send
//! function; the queue never polls the network by itself.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use salmart_client::{decode_body, endpoints};
use salmart_core::{
    EntityId, EntityKind, Message, MessageStatus, OutgoingMessage, Owner, SalmartError,
    SalmartResult, Timestamp, UserId,
};
use salmart_storage::{read_json, write_json, PartitionKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapters::{ChatAdapter, MessageAdapter, THREADS_QUALIFIER};
use crate::entity_cache::EntityCache;
use crate::state::EngineState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQueueEntry {
    pub message: Message,
    pub attempts: u32,
    pub max_attempts: u32,
    pub queued_at: Timestamp,
}

impl MessageQueueEntry {
    pub fn new(message: Message, max_attempts: u32) -> Self {
        Self {
            message,
            attempts: 0,
            max_attempts,
            queued_at: Utc::now(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn outgoing(&self) -> OutgoingMessage {
        OutgoingMessage {
            receiver_id: self.message.receiver_id.clone(),
            text: self.message.text.clone(),
        }
    }
}

/// Outcome of one queue drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueReport {
    /// Confirmed messages, with their server ids.
    pub sent: Vec<Message>,
    /// Temporary ids left in the queue for another attempt.
    pub requeued: Vec<EntityId>,
    /// Temporary ids that exhausted their attempts.
    pub failed: Vec<EntityId>,
}

impl QueueReport {
    pub fn attempted(&self) -> usize {
        self.sent.len() + self.requeued.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0
    }
}

pub struct MessageQueue {
    state: Arc<EngineState>,
}

impl MessageQueue {
    pub(crate) fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    fn messages(&self) -> EntityCache<MessageAdapter> {
        EntityCache::new(self.state.clone())
    }

    fn chats(&self) -> EntityCache<ChatAdapter> {
        EntityCache::new(self.state.clone())
    }

    /// Queue records of the current owner.
    pub async fn entries(&self) -> Vec<MessageQueueEntry> {
        self.load(&self.state.owner()).await
    }

    async fn load(&self, owner: &Owner) -> Vec<MessageQueueEntry> {
        read_json(self.state.store.as_ref(), &PartitionKey::queue_key(owner))
            .await
            .unwrap_or_default()
    }

    async fn save(&self, owner: &Owner, entries: &[MessageQueueEntry]) {
        let key = PartitionKey::queue_key(owner);
        if entries.is_empty() {
            self.state.store.delete(&key).await;
        } else {
            write_json(self.state.store.as_ref(), &key, entries).await;
        }
    }

    /// Apply `f` to the queue record of `temp_id`, if still queued.
    async fn update_entry<F>(&self, owner: &Owner, temp_id: &EntityId, f: F)
    where
        F: FnOnce(&mut Vec<MessageQueueEntry>, usize) + Send,
    {
        let mut entries = self.load(owner).await;
        if let Some(pos) = entries.iter().position(|e| &e.message.id == temp_id) {
            f(&mut entries, pos);
            self.save(owner, &entries).await;
        }
    }

    /// Queue a message and show it as a pending bubble.
    pub async fn enqueue(&self, outgoing: OutgoingMessage) -> SalmartResult<Message> {
        let me = self.state.signed_in_user("send a message")?;
        if outgoing.text.trim().is_empty() {
            return Err(SalmartError::InvalidPayload {
                reason: "message text must not be empty".to_string(),
            });
        }
        let message = Message {
            id: EntityId::temporary(),
            sender_id: me.clone(),
            receiver_id: outgoing.receiver_id,
            text: outgoing.text,
            created_at: Utc::now(),
            status: MessageStatus::Queued,
        };
        self.push(Owner::User(me), message.clone()).await;
        Ok(message)
    }

    async fn push(&self, owner: Owner, message: Message) {
        let mut entries = self.load(&owner).await;
        entries.push(MessageQueueEntry::new(
            message.clone(),
            self.state.config.message_max_attempts,
        ));
        self.save(&owner, &entries).await;

        let conversation = conversation_key(&owner, &message.receiver_id);
        self.messages()
            .merge_into(&conversation, vec![message.clone()], true)
            .await;
        touch_thread(&self.chats(), &owner, &message, false).await;
        info!(
            temp_id = %message.id,
            receiver = %message.receiver_id,
            "Queued outbound message"
        );
    }

    /// Attempt every queued message once.
    pub async fn process<F, Fut>(&self, send: F) -> QueueReport
    where
        F: Fn(OutgoingMessage) -> Fut + Send + Sync,
        Fut: Future<Output = SalmartResult<Message>> + Send,
    {
        let _guard = self.state.queue_lock.lock().await;
        let owner = self.state.owner();
        let mut report = QueueReport::default();

        for entry in self.load(&owner).await {
            match self.attempt(&owner, entry, &send).await {
                Attempt::Sent(message) => report.sent.push(message),
                Attempt::Requeued(id) => report.requeued.push(id),
                Attempt::Failed(id) => report.failed.push(id),
            }
        }

        if !report.is_empty() {
            info!(
                sent = report.sent.len(),
                requeued = report.requeued.len(),
                failed = report.failed.len(),
                "Processed message queue"
            );
        }
        report
    }

    /// Attempt only the queued message `temp_id`.
    pub(crate) async fn process_one<F, Fut>(&self, temp_id: &EntityId, send: F) -> Option<Message>
    where
        F: Fn(OutgoingMessage) -> Fut + Send + Sync,
        Fut: Future<Output = SalmartResult<Message>> + Send,
    {
        let _guard = self.state.queue_lock.lock().await;
        let owner = self.state.owner();
        let entry = self
            .load(&owner)
            .await
            .into_iter()
            .find(|e| &e.message.id == temp_id)?;
        let original = entry.message.clone();
        Some(match self.attempt(&owner, entry, &send).await {
            Attempt::Sent(message) => message,
            Attempt::Requeued(_) => Message {
                status: MessageStatus::Queued,
                ..original
            },
            Attempt::Failed(_) => Message {
                status: MessageStatus::Failed,
                ..original
            },
        })
    }

    async fn attempt<F, Fut>(&self, owner: &Owner, entry: MessageQueueEntry, send: &F) -> Attempt
    where
        F: Fn(OutgoingMessage) -> Fut + Send + Sync,
        Fut: Future<Output = SalmartResult<Message>> + Send,
    {
        let temp_id = entry.message.id.clone();
        let conversation = conversation_key(owner, &entry.message.receiver_id);
        self.set_status(&conversation, &temp_id, MessageStatus::Sending)
            .await;
        let attempts = entry.attempts + 1;

        match send(entry.outgoing()).await {
            Ok(mut confirmed) => {
                confirmed.status = MessageStatus::Sent;
                self.update_entry(owner, &temp_id, |entries, pos| {
                    entries.remove(pos);
                })
                .await;
                self.messages()
                    .replace_entity(&conversation, temp_id.as_str(), confirmed.clone())
                    .await;
                touch_thread(&self.chats(), owner, &confirmed, false).await;
                info!(temp_id = %temp_id, id = %confirmed.id, "Message sent");
                Attempt::Sent(confirmed)
            }
            Err(error) if attempts >= entry.max_attempts => {
                self.update_entry(owner, &temp_id, |entries, pos| {
                    entries.remove(pos);
                })
                .await;
                self.set_status(&conversation, &temp_id, MessageStatus::Failed)
                    .await;
                warn!(
                    temp_id = %temp_id,
                    attempts = attempts,
                    error = %error,
                    "Message failed after final attempt"
                );
                Attempt::Failed(temp_id)
            }
            Err(error) => {
                self.update_entry(owner, &temp_id, |entries, pos| {
                    entries[pos].attempts = attempts;
                })
                .await;
                self.set_status(&conversation, &temp_id, MessageStatus::Queued)
                    .await;
                debug!(
                    temp_id = %temp_id,
                    attempts = attempts,
                    max_attempts = entry.max_attempts,
                    error = %error,
                    "Message requeued"
                );
                Attempt::Requeued(temp_id)
            }
        }
    }

    async fn set_status(&self, conversation: &PartitionKey, id: &EntityId, status: MessageStatus) {
        self.messages()
            .modify_partition(conversation, |message| {
                if &message.id != id || message.status == status {
                    return false;
                }
                message.status = status;
                true
            })
            .await;
    }

    /// Re-queue a failed message under a fresh temporary id.
    pub async fn retry(&self, temp_id: &EntityId) -> SalmartResult<Message> {
        let me = self.state.signed_in_user("retry a message")?;
        let owner = Owner::User(me);
        let messages = self.messages();

        for peer in self.state.partitions(&owner, EntityKind::Message).await {
            let conversation = PartitionKey::new(owner.clone(), EntityKind::Message, peer);
            let Some(failed) = messages.find_in(&conversation, temp_id.as_str()).await else {
                continue;
            };
            if failed.status != MessageStatus::Failed {
                return Err(SalmartError::InvalidPayload {
                    reason: format!("message {} has not failed", temp_id),
                });
            }
            messages
                .remove_where(&conversation, |m| &m.id == temp_id)
                .await;
            let retried = Message {
                id: EntityId::temporary(),
                created_at: Utc::now(),
                status: MessageStatus::Queued,
                ..failed
            };
            self.push(owner, retried.clone()).await;
            return Ok(retried);
        }

        Err(SalmartError::NotCached {
            kind: EntityKind::Message,
            id: temp_id.to_string(),
        })
    }
}

enum Attempt {
    Sent(Message),
    Requeued(EntityId),
    Failed(EntityId),
}

pub(crate) fn conversation_key(owner: &Owner, peer: &UserId) -> PartitionKey {
    PartitionKey::new(owner.clone(), EntityKind::Message, peer.as_str())
}

/// Send function backed by the engine's transport.
pub(crate) async fn send_via_transport(
    state: Arc<EngineState>,
    outgoing: OutgoingMessage,
) -> SalmartResult<Message> {
    let body = state
        .transport
        .fetch_json(endpoints::send_message(&outgoing))
        .await?;
    let body = match body {
        Value::Object(mut map) if map.contains_key("message") && map["message"].is_object() => {
            map.remove("message").unwrap_or(Value::Null)
        }
        other => other,
    };
    decode_body(body)
}

/// Bring the owner's chat thread with the message's peer up to date.
///
/// Only touches an already cached thread list.
pub(crate) async fn touch_thread(
    chats: &EntityCache<ChatAdapter>,
    owner: &Owner,
    message: &Message,
    incoming: bool,
) {
    let Some(me) = owner.user_id() else {
        return;
    };
    let key = PartitionKey::new(owner.clone(), EntityKind::ChatThread, THREADS_QUALIFIER);
    let Some(entry) = chats.load_entry(&key).await else {
        return;
    };
    let peer = message.peer_of(me).clone();

    let mut threads = entry.data;
    match threads.iter_mut().find(|t| t.peer_id == peer) {
        Some(thread) => {
            if message.created_at >= thread.last_message_at {
                thread.last_message = message.text.clone();
                thread.last_message_at = message.created_at;
            }
            if incoming {
                thread.unread_count += 1;
            }
        }
        None => threads.push(salmart_core::ChatThread {
            peer_id: peer,
            peer_name: String::new(),
            peer_picture: None,
            last_message: message.text.clone(),
            last_message_at: message.created_at,
            unread_count: u32::from(incoming),
        }),
    }
    chats.merge_into(&key, threads, false).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_exhaustion() {
        let message = Message {
            id: EntityId::temporary(),
            sender_id: UserId::new("me"),
            receiver_id: UserId::new("bob"),
            text: "hi".to_string(),
            created_at: Utc::now(),
            status: MessageStatus::Queued,
        };
        let mut entry = MessageQueueEntry::new(message, 2);
        assert!(!entry.is_exhausted());
        entry.attempts = 2;
        assert!(entry.is_exhausted());
        assert_eq!(entry.outgoing().receiver_id, UserId::new("bob"));
    }

    #[test]
    fn test_entry_wire_format() {
        let message = Message {
            id: EntityId::new("temp-1"),
            sender_id: UserId::new("me"),
            receiver_id: UserId::new("bob"),
            text: "hi".to_string(),
            created_at: Utc::now(),
            status: MessageStatus::Queued,
        };
        let json = serde_json::to_value(MessageQueueEntry::new(message, 3)).unwrap();
        assert_eq!(json["maxAttempts"], 3);
        assert_eq!(json["attempts"], 0);
        assert!(json.get("queuedAt").is_some());
        assert_eq!(json["message"]["status"], "queued");
    }

    #[test]
    fn test_report_counts() {
        let report = QueueReport {
            requeued: vec![EntityId::new("temp-a")],
            failed: vec![EntityId::new("temp-b")],
            ..Default::default()
        };
        assert_eq!(report.attempted(), 2);
        assert!(!report.is_empty());
    }
}
