//! Owner-scoped partition keys.
//!
//! `PartitionKey`'s private constructor makes it impossible to build a key
//! without naming the owning namespace, so one user's cached partitions can
//! never be addressed from another user's session.

use salmart_core::{EntityKind, Owner};
use std::fmt;

/// Version segment of every key; bump to orphan incompatible layouts.
const KEY_VERSION: &str = "salmart:v1";

/// A cache partition scoped to an owner.
///
/// # Key Format
///
/// ```text
/// salmart:v1:{owner}:{kind}:{qualifier}
/// ```
///
/// `owner` and `qualifier` are escaped so that `:` inside them cannot forge
/// another owner's prefix. Auxiliary records owned by the same namespace
/// use reserved second segments (`stale`, `index`, `queue`) that never
/// collide with an [`EntityKind`] segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    /// Private inner data - cannot be constructed externally
    inner: PartitionInner,
}

/// Private inner struct - prevents external construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PartitionInner {
    owner: Owner,
    kind: EntityKind,
    qualifier: String,
}

impl PartitionKey {
    /// Create a new owner-scoped partition key.
    ///
    /// This is the ONLY way to construct a `PartitionKey`.
    pub fn new(owner: Owner, kind: EntityKind, qualifier: impl Into<String>) -> Self {
        Self {
            inner: PartitionInner {
                owner,
                kind,
                qualifier: qualifier.into(),
            },
        }
    }

    pub fn owner(&self) -> &Owner {
        &self.inner.owner
    }

    pub fn kind(&self) -> EntityKind {
        self.inner.kind
    }

    pub fn qualifier(&self) -> &str {
        &self.inner.qualifier
    }

    /// Same kind and qualifier under another owner.
    pub fn with_owner(&self, owner: Owner) -> Self {
        Self::new(owner, self.inner.kind, self.inner.qualifier.clone())
    }

    /// Storage key of the partition's cached array.
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}",
            owner_root(&self.inner.owner),
            self.inner.kind.as_str(),
            escape(&self.inner.qualifier)
        )
    }

    /// Decode a key produced by [`PartitionKey::encode`].
    ///
    /// Returns `None` for auxiliary keys and foreign layouts.
    pub fn decode(key: &str) -> Option<Self> {
        let rest = key.strip_prefix(KEY_VERSION)?.strip_prefix(':')?;
        let mut parts = rest.splitn(3, ':');
        let owner = decode_owner(parts.next()?)?;
        let kind = EntityKind::parse(parts.next()?)?;
        let qualifier = unescape(parts.next()?)?;
        Some(Self::new(owner, kind, qualifier))
    }

    /// Storage key of this partition's stale flag.
    pub fn stale_key(&self) -> String {
        format!(
            "{}:stale:{}:{}",
            owner_root(&self.inner.owner),
            self.inner.kind.as_str(),
            escape(&self.inner.qualifier)
        )
    }

    /// Storage key of the list of cached qualifiers for one kind.
    pub fn index_key(owner: &Owner, kind: EntityKind) -> String {
        format!("{}:index:{}", owner_root(owner), kind.as_str())
    }

    /// Storage key of the owner's outbound message queue.
    pub fn queue_key(owner: &Owner) -> String {
        format!("{}:queue:outbox", owner_root(owner))
    }

    /// Prefix shared by every record of an owner.
    ///
    /// Ends with the separator so `u.ab` never matches `u.abc`.
    pub fn owner_prefix(owner: &Owner) -> String {
        format!("{}:", owner_root(owner))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.inner.owner, self.inner.kind, self.inner.qualifier
        )
    }
}

fn owner_root(owner: &Owner) -> String {
    format!("{}:{}", KEY_VERSION, escape(&owner.namespace()))
}

fn decode_owner(segment: &str) -> Option<Owner> {
    let namespace = unescape(segment)?;
    if namespace == "anon" {
        return Some(Owner::Anonymous);
    }
    let id = namespace.strip_prefix("u.")?;
    if id.is_empty() {
        return None;
    }
    Some(Owner::user(id))
}

fn escape(segment: &str) -> String {
    segment.replace('%', "%25").replace(':', "%3A")
}

fn unescape(segment: &str) -> Option<String> {
    if segment.contains(':') {
        return None;
    }
    Some(segment.replace("%3A", ":").replace("%25", "%"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_construction() {
        let key = PartitionKey::new(Owner::user("u1"), EntityKind::Post, "electronics");
        assert_eq!(key.owner(), &Owner::user("u1"));
        assert_eq!(key.kind(), EntityKind::Post);
        assert_eq!(key.qualifier(), "electronics");
        assert_eq!(key.encode(), "salmart:v1:u.u1:posts:electronics");
    }

    #[test]
    fn test_decode_round_trip() {
        let key = PartitionKey::new(Owner::Anonymous, EntityKind::Comment, "r:42%");
        let decoded = PartitionKey::decode(&key.encode()).expect("decode should succeed");
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_auxiliary_keys_do_not_decode_as_partitions() {
        let key = PartitionKey::new(Owner::user("u1"), EntityKind::Post, "all");
        assert!(PartitionKey::decode(&key.stale_key()).is_none());
        assert!(PartitionKey::decode(&PartitionKey::queue_key(&Owner::user("u1"))).is_none());
        assert!(
            PartitionKey::decode(&PartitionKey::index_key(&Owner::user("u1"), EntityKind::Post))
                .is_none()
        );
    }

    #[test]
    fn test_owner_prefix_is_exclusive() {
        let short = PartitionKey::owner_prefix(&Owner::user("ab"));
        let long_key = PartitionKey::new(Owner::user("abc"), EntityKind::Post, "all").encode();
        assert!(!long_key.starts_with(&short));

        let own_key = PartitionKey::new(Owner::user("ab"), EntityKind::Post, "all").encode();
        assert!(own_key.starts_with(&short));
        assert!(PartitionKey::queue_key(&Owner::user("ab")).starts_with(&short));
    }

    #[test]
    fn test_anonymous_and_user_namespaces_differ() {
        let anon = PartitionKey::new(Owner::Anonymous, EntityKind::Post, "all");
        let user = anon.with_owner(Owner::user("anon"));
        assert_ne!(anon.encode(), user.encode());
    }

    proptest! {
        #[test]
        fn owner_ids_cannot_forge_other_prefixes(a in "[a-z0-9:%.]{1,12}", b in "[a-z0-9:%.]{1,12}") {
            prop_assume!(a != b);
            let key_a = PartitionKey::new(Owner::user(a.as_str()), EntityKind::Post, "all").encode();
            let prefix_b = PartitionKey::owner_prefix(&Owner::user(b.as_str()));
            prop_assert!(!key_a.starts_with(&prefix_b));
        }

        #[test]
        fn partition_keys_round_trip(owner in "[a-z0-9:%]{1,10}", qualifier in "[a-zA-Z0-9 :%_-]{0,16}") {
            let key = PartitionKey::new(Owner::user(owner.as_str()), EntityKind::Message, qualifier);
            prop_assert_eq!(PartitionKey::decode(&key.encode()), Some(key));
        }
    }
}
