//! Shared bearer-token session.

use std::sync::{Arc, RwLock};

/// Bearer token shared by the REST and push clients.
///
/// Cloning shares the same slot, so a login or logout is seen by every
/// client built from it on their next request or reconnect.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Arc<RwLock<Option<String>>>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::default();
        session.set_token(Some(token.into()));
        session
    }

    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = token.filter(|t| !t.trim().is_empty());
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|slot| slot.clone())
    }

    /// `Authorization` header value, if a token is present.
    pub fn bearer(&self) -> Option<String> {
        self.token().map(|t| format!("Bearer {}", t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_token() {
        let session = Session::anonymous();
        let other = session.clone();
        assert!(other.bearer().is_none());

        session.set_token(Some("abc".to_string()));
        assert_eq!(other.bearer().as_deref(), Some("Bearer abc"));

        other.set_token(None);
        assert!(session.token().is_none());
    }

    #[test]
    fn test_blank_token_is_anonymous() {
        let session = Session::with_token("  ");
        assert!(session.bearer().is_none());
    }
}
