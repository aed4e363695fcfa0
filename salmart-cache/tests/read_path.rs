//! Read-through behaviour of the cache engine.

use std::time::Duration;

use salmart_cache::CacheConfig;
use salmart_storage::ReadSource;
use salmart_test_utils::assertions::assert_ids;
use salmart_test_utils::fixtures::{list_body, post, request};
use salmart_test_utils::{api_error, EntityId, EntityKind, Owner, TestHarness};

fn electronics() -> Vec<salmart_test_utils::Post> {
    (0..10)
        .map(|i| post(&format!("e{}", i), "electronics", i == 3 || i == 7, i as i64 * 10))
        .collect()
}

#[tokio::test]
async fn test_cold_cache_fetches_once_and_sorts_promoted_first() {
    let h = TestHarness::signed_in("u1");
    h.transport.respond("GET /posts", list_body(&electronics()));

    let read = h.engine.get_posts("electronics", None).await;

    assert_eq!(h.transport.call_count(), 1);
    assert!(matches!(read.source(), ReadSource::Network));
    let posts = read.value();
    assert_eq!(posts.len(), 10);
    assert_ids(
        &posts[..4],
        &["e3", "e7", "e0", "e1"],
    );
    let call = h.transport.last_call("GET /posts").unwrap();
    assert_eq!(call.query_value("category"), Some("electronics"));
    assert!(call.query_value("before").is_none());

    let cached = h.engine.posts().cached("electronics").await.unwrap();
    assert_eq!(cached.data.len(), 10);
}

#[tokio::test]
async fn test_fresh_partition_is_served_from_cache() {
    let h = TestHarness::signed_in("u1");
    h.transport.respond("GET /posts", list_body(&electronics()));
    h.engine.get_posts("electronics", None).await;

    let read = h.engine.get_posts("electronics", None).await;
    assert!(read.was_cache_hit());
    assert_eq!(read.value().len(), 10);
    assert_eq!(h.transport.call_count(), 1);
}

#[tokio::test]
async fn test_stale_flag_forces_refetch_despite_fresh_timestamp() {
    let h = TestHarness::signed_in("u1");
    h.transport.respond("GET /posts", list_body(&electronics()));
    h.engine.get_posts("electronics", None).await;

    h.engine.mark_stale(EntityKind::Post, "electronics").await;
    let read = h.engine.get_posts("electronics", None).await;

    assert!(!read.was_cache_hit());
    assert_eq!(h.transport.calls_to("GET /posts"), 2);
    assert!(!h.engine.is_stale(EntityKind::Post, "electronics").await);

    // Cleared after the successful fetch, so the next read is a hit again
    assert!(h.engine.get_posts("electronics", None).await.was_cache_hit());
}

#[tokio::test]
async fn test_stale_flag_survives_failed_refetch() {
    let h = TestHarness::signed_in("u1");
    h.transport.respond("GET /posts", list_body(&electronics()));
    h.engine.get_posts("electronics", None).await;
    h.engine.mark_stale(EntityKind::Post, "electronics").await;

    h.transport.set_offline(true);
    let read = h.engine.get_posts("electronics", None).await;

    assert!(read.is_fallback());
    assert_eq!(read.value().len(), 10);
    assert!(h.engine.is_stale(EntityKind::Post, "electronics").await);
}

#[tokio::test]
async fn test_expired_partition_is_refetched() {
    let h = TestHarness::with_config(
        Owner::user("u1"),
        CacheConfig::new()
            .with_freshness_window(Duration::ZERO)
            .with_background_sync(false),
    );
    h.transport.respond("GET /posts", list_body(&electronics()));
    h.engine.get_posts("electronics", None).await;
    h.engine.get_posts("electronics", None).await;

    assert_eq!(h.transport.calls_to("GET /posts"), 2);
}

#[tokio::test]
async fn test_failed_load_falls_back_to_stored_copy_with_server_message() {
    let h = TestHarness::with_config(
        Owner::user("u1"),
        CacheConfig::new()
            .with_freshness_window(Duration::ZERO)
            .with_background_sync(false),
    );
    h.transport.respond("GET /posts", list_body(&electronics()));
    h.engine.get_posts("electronics", None).await;

    h.transport
        .fail("GET /posts", api_error(503, "Maintenance in progress"));
    let read = h.engine.get_posts("electronics", None).await;

    assert!(read.is_fallback());
    assert_eq!(read.value().len(), 10);
    assert!(read.cached_at().is_some());
    assert_eq!(
        read.error().map(|e| e.user_message()),
        Some("Maintenance in progress".to_string())
    );
}

#[tokio::test]
async fn test_failed_cold_load_is_empty_not_an_error() {
    let h = TestHarness::signed_in("u1");
    let read = h.engine.get_posts("fashion", None).await;

    assert!(read.is_fallback());
    assert!(read.value().is_empty());
    assert!(h.engine.posts().cached("fashion").await.is_none());
}

#[tokio::test]
async fn test_load_more_merges_page_and_keeps_cached_at() {
    let h = TestHarness::signed_in("u1");
    h.transport.respond(
        "GET /posts",
        list_body(&[post("a", "home", false, 1), post("b", "home", false, 2)]),
    );
    h.engine.get_posts("home", None).await;
    let cached_at = h.engine.posts().cached("home").await.unwrap().cached_at;

    h.transport.respond(
        "GET /posts",
        list_body(&[post("c", "home", false, 30), post("d", "home", false, 40)]),
    );
    let page = h.engine.get_posts("home", Some(&EntityId::new("b"))).await;

    assert_ids(page.value(), &["c", "d"]);
    let call = h.transport.last_call("GET /posts").unwrap();
    assert_eq!(call.query_value("before"), Some("b"));

    let cached = h.engine.posts().cached("home").await.unwrap();
    assert_ids(&cached.data, &["a", "b", "c", "d"]);
    assert_eq!(cached.cached_at, cached_at);
}

#[tokio::test]
async fn test_all_category_sends_no_filter() {
    let h = TestHarness::signed_in("u1");
    h.transport
        .respond("GET /posts", list_body(&[post("a", "home", false, 1)]));
    h.engine.get_posts("all", None).await;

    let call = h.transport.last_call("GET /posts").unwrap();
    assert!(call.query_value("category").is_none());
}

#[tokio::test]
async fn test_wrapped_list_response_is_accepted() {
    let h = TestHarness::signed_in("u1");
    h.transport.respond(
        "GET /requests",
        serde_json::json!({ "requests": [request("r1", 5), request("r2", 1)] }),
    );

    let read = h.engine.get_requests(None).await;
    assert_ids(read.value(), &["r2", "r1"]);
}

#[tokio::test]
async fn test_background_reconcile_runs_after_cached_read() {
    let h = TestHarness::with_config(Owner::user("u1"), CacheConfig::new());
    h.transport
        .respond("GET /posts", list_body(&[post("a", "home", false, 5)]));
    h.transport.respond(
        "POST /posts/interactions",
        serde_json::json!({ "interactions": [] }),
    );
    h.engine.get_posts("home", None).await;
    assert_eq!(h.transport.calls_to("GET /posts"), 1);

    let read = h.engine.get_posts("home", None).await;
    assert!(read.was_cache_hit());
    h.engine.settle().await;

    // Delta sync asked only for entities newer than the cached one
    assert_eq!(h.transport.calls_to("GET /posts"), 2);
    let delta = h.transport.last_call("GET /posts").unwrap();
    assert!(delta.query_value("since").is_some());
    assert_eq!(h.transport.calls_to("POST /posts/interactions"), 1);
}
