//! Broadcast delivery and recovery of lagged subscribers.

use std::sync::Arc;

use salmart_cache::{BroadcastNotifier, CacheConfig, CacheEngine, Change, EntityBatch};
use salmart_client::PushEvent;
use salmart_test_utils::fixtures::{list_body, post};
use salmart_test_utils::{EntityId, MemoryStore, MockTransport, Owner};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

const CATEGORIES: [&str; 3] = ["electronics", "fashion", "home"];

fn engine(notifier: Arc<BroadcastNotifier>) -> (CacheEngine, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let engine = CacheEngine::new(
        Arc::new(MemoryStore::new()),
        transport.clone(),
        notifier,
        CacheConfig::new().with_background_sync(false),
    )
    .with_owner(Owner::user("u1"));
    (engine, transport)
}

#[tokio::test]
async fn test_lagged_subscriber_catches_up_through_resnapshot() {
    let notifier = Arc::new(BroadcastNotifier::new(4));
    let (engine, transport) = engine(notifier.clone());
    let mut rx = notifier.subscribe();

    transport.respond(
        "GET /posts",
        list_body(&[post("p1", "home", false, 1), post("p2", "home", false, 2)]),
    );
    for category in CATEGORIES {
        engine.get_posts(category, None).await;
    }
    let p1 = EntityId::new("p1");
    engine
        .apply_push(PushEvent::SoldStatusChanged {
            entity_id: p1.clone(),
            is_sold: true,
        })
        .await;
    engine
        .apply_push(PushEvent::EntityPromoted {
            entity_id: p1.clone(),
        })
        .await;

    assert!(matches!(rx.recv().await, Err(RecvError::Lagged(_))));

    let mut rx = rx.resubscribe();
    assert_eq!(engine.resnapshot().await, CATEGORIES.len());

    let mut seen = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(notification) => seen.push(notification),
            Err(TryRecvError::Lagged(_)) => panic!("Resnapshot overflowed the channel"),
            Err(_) => break,
        }
    }
    assert_eq!(seen.len(), CATEGORIES.len());
    for notification in seen {
        match notification.change {
            Change::Snapshot(EntityBatch::Posts(posts)) => {
                let cached = posts.iter().find(|p| p.id == p1).unwrap();
                assert!(cached.is_sold);
                assert!(cached.is_promoted);
            }
            other => panic!("Expected post snapshot, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_resnapshot_covers_only_the_current_owner() {
    let notifier = Arc::new(BroadcastNotifier::new(16));
    let (engine, transport) = engine(notifier.clone());
    transport.respond("GET /posts", list_body(&[post("p1", "home", false, 1)]));
    engine.get_posts("home", None).await;

    engine.switch_owner(Owner::user("u2"));
    let mut rx = notifier.subscribe();
    assert_eq!(engine.resnapshot().await, 0);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    engine.switch_owner(Owner::user("u1"));
    assert_eq!(engine.resnapshot().await, 1);
    let notification = rx.try_recv().unwrap();
    assert_eq!(notification.partition.qualifier(), "home");
}
