//! Salmart sync daemon entry point.
//!
//! Loads the client config, opens the store, warms the configured feeds and
//! then applies push events until interrupted.

use std::sync::Arc;

use salmart_cache::{BroadcastNotifier, CacheConfig, CacheEngine, Notification};
use salmart_client::{
    spawn_push_listener, ClientConfig, ListenerEvent, LogFormat, RestClient, Session, WsClient,
};
use salmart_core::{Owner, SalmartError, SalmartResult};
use salmart_storage::{LmdbStore, NoopStore, PersistentStore};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> SalmartResult<()> {
    let config = ClientConfig::load()?;
    init_tracing(config.logging.format)?;

    let store = open_store(&config).await;
    let session = match &config.auth.token {
        Some(token) => Session::with_token(token.clone()),
        None => Session::anonymous(),
    };
    let owner = config
        .auth
        .user_id
        .as_deref()
        .map(Owner::user)
        .unwrap_or(Owner::Anonymous);

    let rest = RestClient::new(&config, session.clone())?;
    let notifier = Arc::new(BroadcastNotifier::default());
    let engine = CacheEngine::new(
        store,
        Arc::new(rest),
        notifier.clone(),
        CacheConfig::from(&config.cache),
    )
    .with_owner(owner);

    tracing::info!(
        api = %config.api_base_url,
        owner = %engine.owner(),
        durable = engine.is_durable(),
        "Salmart sync starting"
    );

    tokio::spawn(log_notifications(engine.clone(), notifier.subscribe()));
    warm(&engine, &config.cache.warm_categories).await;

    let (tx, mut rx) = mpsc::channel::<ListenerEvent>(256);
    let listener = spawn_push_listener(WsClient::new(&config, session), tx);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, shutting down");
                break;
            }
            event = rx.recv() => match event {
                Some(event) => engine.handle_listener_event(event).await,
                None => {
                    tracing::warn!("Push listener stopped");
                    break;
                }
            }
        }
    }

    listener.abort();
    engine.settle().await;
    Ok(())
}

fn init_tracing(format: LogFormat) -> SalmartResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("salmart_cache=debug,salmart_client=info,info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.map_err(|e| SalmartError::Config {
        field: "logging".to_string(),
        reason: format!("Failed to init subscriber: {}", e),
    })
}

async fn open_store(config: &ClientConfig) -> Arc<dyn PersistentStore> {
    match &config.cache.store_path {
        Some(path) => {
            let store = LmdbStore::new(path, config.cache.map_size_mb);
            if !store.ready().await {
                tracing::warn!(path = %path.display(), "Store unavailable, every read goes to the network");
            }
            Arc::new(store)
        }
        None => Arc::new(NoopStore),
    }
}

async fn warm(engine: &CacheEngine, categories: &[String]) {
    for category in categories {
        let read = engine.get_posts(category, None).await;
        match read.error() {
            Some(err) => tracing::warn!(category = %category, error = %err, "Warm-up read failed"),
            None => tracing::info!(
                category = %category,
                posts = read.value().len(),
                cache_hit = read.was_cache_hit(),
                "Feed warmed"
            ),
        }
    }
    if engine.owner().user_id().is_some() {
        let chats = engine.get_chats().await;
        tracing::info!(threads = chats.value().len(), "Chat threads warmed");
    }
}

async fn log_notifications(engine: CacheEngine, mut rx: broadcast::Receiver<Notification>) {
    loop {
        match rx.recv().await {
            Ok(notification) => tracing::debug!(
                partition = %notification.partition,
                change = notification.change.label(),
                "Cache changed"
            ),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                rx = rx.resubscribe();
                let partitions = engine.resnapshot().await;
                tracing::warn!(
                    missed = missed,
                    partitions = partitions,
                    "Notification log lagged, resnapshotted cached partitions"
                );
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
