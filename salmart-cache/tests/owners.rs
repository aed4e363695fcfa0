//! Owner namespaces: isolation, switching and purge.

use salmart_test_utils::fixtures::{list_body, outgoing, post};
use salmart_test_utils::{EntityKind, Owner, PartitionKey, TestHarness};

#[tokio::test]
async fn test_switching_user_hides_previous_partitions() {
    let h = TestHarness::signed_in("alice");
    h.transport
        .respond("GET /posts", list_body(&[post("p1", "home", false, 1)]));
    h.engine.get_posts("home", None).await;

    h.engine.switch_owner(Owner::user("bob"));
    assert!(h.engine.posts().cached("home").await.is_none());
    assert!(h.engine.posts().partitions().await.is_empty());

    let read = h.engine.get_posts("home", None).await;
    assert!(!read.was_cache_hit());
    assert_eq!(h.transport.calls_to("GET /posts"), 2);

    h.engine.switch_owner(Owner::user("alice"));
    assert!(h.engine.get_posts("home", None).await.was_cache_hit());
}

#[tokio::test]
async fn test_anonymous_namespace_is_separate() {
    let h = TestHarness::anonymous();
    h.transport
        .respond("GET /posts", list_body(&[post("p1", "home", false, 1)]));
    h.engine.get_posts("home", None).await;

    h.engine.switch_owner(Owner::user("anon"));
    assert!(h.engine.posts().cached("home").await.is_none());
}

#[tokio::test]
async fn test_stale_flags_are_per_owner() {
    let h = TestHarness::signed_in("alice");
    h.engine.mark_stale(EntityKind::Post, "home").await;
    h.engine.switch_owner(Owner::user("bob"));
    assert!(!h.engine.is_stale(EntityKind::Post, "home").await);
}

#[tokio::test]
async fn test_queue_is_per_owner() {
    let h = TestHarness::signed_in("alice");
    h.engine.queue_message(outgoing("carol", "hi")).await.unwrap();

    h.engine.switch_owner(Owner::user("bob"));
    assert!(h.engine.queued_messages().await.is_empty());
    assert!(h.engine.drain_queue().await.is_empty());
    assert_eq!(h.transport.calls_to("POST /messages"), 0);
}

#[tokio::test]
async fn test_purge_removes_only_that_owner() {
    let h = TestHarness::signed_in("alice");
    h.transport
        .respond("GET /posts", list_body(&[post("p1", "home", false, 1)]));
    h.engine.get_posts("home", None).await;
    h.engine.queue_message(outgoing("carol", "hi")).await.unwrap();

    h.engine.switch_owner(Owner::user("bob"));
    h.engine.get_posts("home", None).await;

    let alice = Owner::user("alice");
    let removed = h.engine.purge_owner(&alice).await;
    assert!(removed >= 3);

    let keys = h.store.keys().await;
    let alice_prefix = PartitionKey::owner_prefix(&alice);
    assert!(keys.iter().all(|k| !k.starts_with(&alice_prefix)));
    assert!(h.engine.posts().cached("home").await.is_some());
}
