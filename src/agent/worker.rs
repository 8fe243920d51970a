//! Priority job queues and the worker loop that drains them, running the
//! listing-walk and product-detail task bodies.

use super::AgentState;
use crate::error::ScraperError;
use crate::models::*;
use crate::scraper::{GenericJsonScraper, RequestLoader, Scraper, ScraperRegistry};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as TokioMutex};

type Rx = Arc<TokioMutex<mpsc::UnboundedReceiver<Job>>>;

pub struct PriorityQueues {
    high: (mpsc::UnboundedSender<Job>, Rx),
    medium: (mpsc::UnboundedSender<Job>, Rx),
    low: (mpsc::UnboundedSender<Job>, Rx),
}

impl PriorityQueues {
    pub fn new() -> Self {
        Self {
            high: Self::channel(),
            medium: Self::channel(),
            low: Self::channel(),
        }
    }

    fn channel() -> (mpsc::UnboundedSender<Job>, Rx) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Arc::new(TokioMutex::new(rx)))
    }

    pub fn submit(&self, job: Job) -> Result<(), mpsc::error::SendError<Job>> {
        match job.priority {
            Priority::High => self.high.0.send(job),
            Priority::Medium => self.medium.0.send(job),
            Priority::Low => self.low.0.send(job),
        }
    }
}

impl Default for PriorityQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry wired at startup. `example` is the one fully concrete
/// registration in this deployment; real per-site scrapers register the
/// same way from an external collaborator crate.
pub fn default_registry() -> ScraperRegistry {
    let mut registry = ScraperRegistry::new();
    registry.register(
        "example",
        Arc::new(|| -> Arc<dyn Scraper> {
            let loader = Arc::new(RequestLoader::new(30).expect("default http loader"));
            Arc::new(GenericJsonScraper::new("example", loader))
        }),
    );
    registry
}

pub fn spawn_workers(state: Arc<AgentState>, workers_per_priority: usize) {
    for rx in [&state.queues.high.1, &state.queues.medium.1, &state.queues.low.1] {
        for _ in 0..workers_per_priority {
            let state = state.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    match job {
                        Some(job) => run_job(state.clone(), job).await,
                        None => break,
                    }
                }
            });
        }
    }
}

async fn get_or_build_scraper(state: &AgentState, url: &str) -> Result<Arc<dyn Scraper>, ScraperError> {
    let domain_token = ScraperRegistry::domain_token(url)?;
    if let Some(scraper) = state.cache.get(&domain_token) {
        return Ok(scraper);
    }
    state.registry.build_for(&domain_token)
}

async fn run_job(state: Arc<AgentState>, job: Job) {
    if state.store.set_job_processing(&job.job_id).await.is_err() {
        tracing::error!(job_id = %job.job_id, "failed to mark job processing");
        return;
    }

    let outcome = match job.type_page {
        TypePage::Listing => run_listing_job(&state, &job).await,
        TypePage::Product => run_product_job(&state, &job).await,
    };

    match outcome {
        Ok(payload) => {
            let result = JobResult {
                job_id: job.job_id.clone(),
                result: Some(payload),
                status: JobStatus::Completed,
                completed_at: Utc::now(),
                error_message: None,
            };
            if let Err(e) = state.store.create_job_result(result).await {
                tracing::error!(job_id = %job.job_id, error = %e, "failed to persist job result");
            }
            let _ = state
                .store
                .set_job_terminal(&job.job_id, JobStatus::Completed, None)
                .await;
        }
        Err(err) => {
            let message = err.as_job_error_message();
            let result = JobResult {
                job_id: job.job_id.clone(),
                result: None,
                status: JobStatus::Failed,
                completed_at: Utc::now(),
                error_message: Some(message.clone()),
            };
            if let Err(e) = state.store.create_job_result(result).await {
                tracing::error!(job_id = %job.job_id, error = %e, "failed to persist failed job result");
            }
            let _ = state
                .store
                .set_job_terminal(&job.job_id, JobStatus::Failed, Some(message))
                .await;
        }
    }
}

/// Return a scraper to the cache, closing it immediately instead if the
/// cache evicts something to make room. Called on every exit path of a
/// job — success or failure — so a scraper is never silently dropped
/// without releasing its held resources.
async fn release_scraper(state: &AgentState, source_key: &str, scraper: Arc<dyn Scraper>) {
    if let Some(evicted) = state.cache.insert(source_key, scraper) {
        evicted.close().await;
    }
}

async fn walk_listing(
    state: &AgentState,
    scraper: &Arc<dyn Scraper>,
    start_url: &str,
) -> Result<Vec<ListingItem>, ScraperError> {
    let mut url = Some(start_url.to_string());
    let mut rank: i64 = 1;
    let mut pages_scanned: u32 = 0;
    let mut items = Vec::new();

    while let Some(current_url) = url.clone() {
        if pages_scanned >= state.config.max_listing_pages {
            break;
        }
        let pagination = scraper.pagination(&current_url).await?;
        let page_urls = scraper.product_listings(&current_url, pagination.current_page).await?;
        for product_url in page_urls {
            items.push(ListingItem {
                url: product_url,
                page_rank: rank,
            });
            rank += 1;
        }
        url = pagination.next_page_url;
        pages_scanned += 1;
    }

    Ok(items)
}

async fn run_listing_job(state: &AgentState, job: &Job) -> Result<JobResultPayload, ScraperError> {
    let scraper = get_or_build_scraper(state, &job.webpage_url).await?;
    let source_key = scraper.source_key().to_string();

    let outcome = walk_listing(state, &scraper, &job.webpage_url).await;
    release_scraper(state, &source_key, scraper).await;

    outcome.map(|items| JobResultPayload::Listing { items })
}

async fn run_product_job(state: &AgentState, job: &Job) -> Result<JobResultPayload, ScraperError> {
    let scraper = get_or_build_scraper(state, &job.webpage_url).await?;
    let source_key = scraper.source_key().to_string();

    let outcome = scraper.product_details(&job.webpage_url).await;
    release_scraper(state, &source_key, scraper).await;

    outcome.map(|product| JobResultPayload::Product(Box::new(product)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ScraperLruCache;
    use crate::config::Config;
    use crate::models::Pagination;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Returns a fixed page of products and always claims there is a next
    /// page, to exercise the listing walk's hard page cap.
    struct EndlessPaginationScraper {
        page_size: usize,
    }

    #[async_trait]
    impl Scraper for EndlessPaginationScraper {
        fn source_key(&self) -> &str {
            "example"
        }

        async fn page_content(&self, _url: &str) -> Result<String, ScraperError> {
            Ok(String::new())
        }

        async fn pagination(&self, url: &str) -> Result<Pagination, ScraperError> {
            Ok(Pagination {
                current_page: 1,
                total_pages: None,
                next_page_url: Some(url.to_string()),
            })
        }

        async fn product_listings(&self, url: &str, _page: u32) -> Result<Vec<String>, ScraperError> {
            Ok((0..self.page_size).map(|i| format!("{url}/item-{i}")).collect())
        }

        async fn product_details(&self, _url: &str) -> Result<Product, ScraperError> {
            unreachable!("not exercised by the listing-walk test")
        }
    }

    fn test_config() -> Config {
        Config {
            mongo_uri: "mongodb://localhost/unused".into(),
            mongo_dbname: "unused".into(),
            scraping_agent_api_url: "http://localhost".into(),
            scraping_agent_token: "unused".into(),
            api_access_token: "unused".into(),
            redis_url: "redis://localhost".into(),
            maximum_batch_size: 100,
            maximum_batches_to_process: 10,
            scraper_cache_max_size: 17,
            max_listing_pages: 30,
            timezone: "Asia/Kolkata".into(),
            agent_bind_addr: "0.0.0.0:0".into(),
            ingestor_bind_addr: "0.0.0.0:0".into(),
            admin_password: "unused".into(),
            session_secret: "unused".into(),
        }
    }

    #[tokio::test]
    async fn listing_walk_hard_caps_at_configured_page_count() {
        let page_size = 3usize;
        let mut registry = ScraperRegistry::new();
        registry.register(
            "example",
            Arc::new(move || -> Arc<dyn Scraper> { Arc::new(EndlessPaginationScraper { page_size }) }),
        );

        let state = AgentState {
            store: Arc::new(InMemoryStore::new()),
            cache: Arc::new(ScraperLruCache::new(4)),
            registry: Arc::new(registry),
            queues: PriorityQueues::new(),
            config: test_config(),
        };

        let job = Job::new("https://example.com/cat".into(), Priority::Low, TypePage::Listing);
        let payload = run_listing_job(&state, &job).await.expect("listing walk succeeds");

        let JobResultPayload::Listing { items } = payload else {
            panic!("expected a listing payload");
        };

        assert_eq!(items.len(), page_size * state.config.max_listing_pages as usize);
        let ranks: Vec<i64> = items.iter().map(|i| i.page_rank).collect();
        let expected: Vec<i64> = (1..=items.len() as i64).collect();
        assert_eq!(ranks, expected);
    }

    /// A scraper whose first call always fails with `DataParsing`, to
    /// exercise the error path of the job runners. Tracks whether `close`
    /// was invoked.
    struct FailingScraper {
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Scraper for FailingScraper {
        fn source_key(&self) -> &str {
            "example"
        }

        async fn page_content(&self, _url: &str) -> Result<String, ScraperError> {
            Err(ScraperError::DataParsing("boom".to_string()))
        }

        async fn pagination(&self, _url: &str) -> Result<Pagination, ScraperError> {
            Err(ScraperError::DataParsing("boom".to_string()))
        }

        async fn product_listings(&self, _url: &str, _page: u32) -> Result<Vec<String>, ScraperError> {
            Err(ScraperError::DataParsing("boom".to_string()))
        }

        async fn product_details(&self, _url: &str) -> Result<Product, ScraperError> {
            Err(ScraperError::DataParsing("boom".to_string()))
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn listing_job_returns_scraper_to_cache_on_scrape_failure() {
        let closed = Arc::new(AtomicBool::new(false));
        let closed_for_factory = closed.clone();
        let mut registry = ScraperRegistry::new();
        registry.register(
            "example",
            Arc::new(move || -> Arc<dyn Scraper> {
                Arc::new(FailingScraper {
                    closed: closed_for_factory.clone(),
                })
            }),
        );

        let state = AgentState {
            store: Arc::new(InMemoryStore::new()),
            cache: Arc::new(ScraperLruCache::new(4)),
            registry: Arc::new(registry),
            queues: PriorityQueues::new(),
            config: test_config(),
        };

        let job = Job::new("https://example.com/cat".into(), Priority::Low, TypePage::Listing);
        let result = run_listing_job(&state, &job).await;
        assert!(result.is_err());

        // The scraper was returned to the cache rather than dropped, so a
        // follow-up job for the same source reuses it instead of leaking it.
        assert_eq!(state.cache.len(), 1);
        assert!(!closed.load(Ordering::SeqCst));
        assert!(state.cache.get("example").is_some());
    }

    #[tokio::test]
    async fn product_job_returns_scraper_to_cache_on_scrape_failure() {
        let closed = Arc::new(AtomicBool::new(false));
        let closed_for_factory = closed.clone();
        let mut registry = ScraperRegistry::new();
        registry.register(
            "example",
            Arc::new(move || -> Arc<dyn Scraper> {
                Arc::new(FailingScraper {
                    closed: closed_for_factory.clone(),
                })
            }),
        );

        let state = AgentState {
            store: Arc::new(InMemoryStore::new()),
            cache: Arc::new(ScraperLruCache::new(4)),
            registry: Arc::new(registry),
            queues: PriorityQueues::new(),
            config: test_config(),
        };

        let job = Job::new("https://example.com/p/1".into(), Priority::High, TypePage::Product);
        let result = run_product_job(&state, &job).await;
        assert!(result.is_err());

        assert_eq!(state.cache.len(), 1);
        assert!(!closed.load(Ordering::SeqCst));
    }
}
