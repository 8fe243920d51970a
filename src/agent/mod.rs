pub mod http;
pub mod worker;

use crate::cache::ScraperLruCache;
use crate::config::Config;
use crate::scraper::Scraper;
use crate::store::AgentStore;
use std::sync::Arc;

/// Shared state threaded through the agent's HTTP handlers and workers.
pub struct AgentState {
    pub store: Arc<dyn AgentStore>,
    pub cache: Arc<ScraperLruCache<Arc<dyn Scraper>>>,
    pub registry: Arc<crate::scraper::ScraperRegistry>,
    pub queues: worker::PriorityQueues,
    pub config: Config,
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn AgentStore> = Arc::new(
        crate::store::mongo::MongoAgentStore::connect(&config.mongo_uri, &config.mongo_dbname).await?,
    );
    let cache = Arc::new(ScraperLruCache::new(config.scraper_cache_max_size));
    let registry = Arc::new(worker::default_registry());
    let queues = worker::PriorityQueues::new();

    let state = Arc::new(AgentState {
        store,
        cache,
        registry,
        queues,
        config: config.clone(),
    });

    worker::spawn_workers(state.clone(), 4);

    let app = http::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.agent_bind_addr).await?;
    tracing::info!("agent listening on {}", config.agent_bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    Ok(())
}

/// Waits for Ctrl+C, then closes every scraper still held by the cache so
/// browser sessions held by in-flight-but-not-yet-returned instances don't
/// leak past process exit.
async fn shutdown_signal(state: Arc<AgentState>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining scraper cache");
    for scraper in state.cache.drain() {
        scraper.close().await;
    }
}
