//! Salmart Core - Entity Types
//!
//! Pure data structures shared by the store, the network client and the
//! cache engine. No I/O lives here.

pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;

pub use entities::{
    ChatThread, Comment, InteractionState, Message, OutgoingMessage, Post, Request, UserSummary,
};
pub use enums::{EntityKind, LikeAction, MessageStatus, MutationKind};
pub use error::{ApiError, NetworkError, SalmartError, SalmartResult, StorageError};
pub use identity::{EntityId, Owner, Timestamp, UserId, TEMP_ID_PREFIX};
