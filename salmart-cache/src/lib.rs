//! Salmart Cache - Offline-First Cache Engine
//!
//! Serves cached partitions immediately and reconciles them with the API in
//! the background. Optimistic mutations apply locally first and resync from
//! the server when their confirmation fails. Outbound messages are queued
//! durably and drained on demand. Every visible change is announced through
//! a [`Notifier`].
//!
//! ```text
//! presentation ──get──► EntityCache ──► PersistentStore
//!      ▲                    │  ▲
//!      │                    ▼  │ merge
//!   Notifier ◄──publish── reconcile ──► ApiTransport
//!                           ▲
//!               push events ┘
//! ```

pub mod adapters;
pub mod background;
pub mod config;
mod dispatch;
pub mod engine;
pub mod entity_cache;
pub mod merge;
pub mod notifier;
pub mod optimistic;
pub mod pending;
pub mod queue;
mod state;

pub use adapters::{
    ChatAdapter, CommentAdapter, DeltaMode, EntityAdapter, FollowerAdapter, FollowingAdapter,
    LikableAdapter, MessageAdapter, PostAdapter, RequestAdapter, SuggestionAdapter,
    ALL_QUALIFIER, THREADS_QUALIFIER,
};
pub use background::BackgroundTasks;
pub use config::CacheConfig;
pub use engine::CacheEngine;
pub use entity_cache::EntityCache;
pub use merge::{merge_by_id, MergeOutcome};
pub use notifier::{BroadcastNotifier, Change, EntityBatch, Notification, Notifier, NoopNotifier};
pub use optimistic::toggle_like;
pub use pending::{PendingUpdate, PendingUpdates};
pub use queue::{MessageQueue, MessageQueueEntry, QueueReport};
