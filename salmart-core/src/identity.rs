//! Identity types for Salmart entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Prefix carried by client-generated ids that the server has not confirmed yet.
pub const TEMP_ID_PREFIX: &str = "temp-";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Server-assigned identifier of a post, request, comment or message.
    EntityId
);

string_id!(
    /// Server-assigned identifier of a user account.
    UserId
);

impl EntityId {
    /// Generate a client-side temporary id for an entity the server has not seen.
    pub fn temporary() -> Self {
        Self(format!("{}{}", TEMP_ID_PREFIX, Uuid::now_v7()))
    }

    /// Whether this id was generated locally and awaits a server-assigned id.
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }
}

/// Namespace owning a slice of the local cache.
///
/// Every durable record belongs to exactly one owner. Logged-out sessions
/// share the anonymous namespace; a logged-in user never reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Owner {
    Anonymous,
    User(UserId),
}

impl Owner {
    pub fn user(id: impl Into<UserId>) -> Self {
        Self::User(id.into())
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(id),
        }
    }

    /// Stable segment used in storage keys.
    pub fn namespace(&self) -> String {
        match self {
            Self::Anonymous => "anon".to_string(),
            Self::User(id) => format!("u.{}", id),
        }
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::Anonymous
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.namespace())
    }
}
