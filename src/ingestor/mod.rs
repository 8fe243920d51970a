pub mod http;
pub mod scheduler;

use crate::config::Config;
use crate::models::{Job, JobResult, Priority, TypePage};
use crate::store::IngestorStore;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Shared state threaded through the scheduler and the admin HTTP API.
pub struct IngestorState {
    pub store: Arc<dyn IngestorStore>,
    pub agent_client: reqwest::Client,
    pub config: Config,
}

impl IngestorState {
    pub fn new(store: Arc<dyn IngestorStore>, config: Config) -> Self {
        let agent_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("agent http client");
        Self {
            store,
            agent_client,
            config,
        }
    }

    fn priority_str(priority: Priority) -> &'static str {
        match priority {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    fn type_page_str(type_page: TypePage) -> &'static str {
        match type_page {
            TypePage::Listing => "listing",
            TypePage::Product => "product",
        }
    }

    /// Dispatch a scrape to the agent, returning the accepted job_id.
    pub async fn submit_scrape(&self, webpage_url: &str, priority: Priority, type_page: TypePage) -> Result<String> {
        let url = format!("{}/scrape", self.config.scraping_agent_api_url);
        let body = serde_json::json!({
            "webpage_url": webpage_url,
            "priority": Self::priority_str(priority),
            "type_page": Self::type_page_str(type_page),
        });

        let response = self
            .agent_client
            .post(&url)
            .bearer_auth(&self.config.scraping_agent_token)
            .json(&body)
            .send()
            .await
            .context("agent dispatch request failed")?;

        if !response.status().is_success() {
            bail!("agent returned {} for dispatch", response.status());
        }

        let parsed: serde_json::Value = response.json().await.context("invalid agent dispatch response")?;
        parsed
            .get("job_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .context("agent response missing job_id")
    }

    pub async fn fetch_job_status(&self, job_id: &str) -> Result<Job> {
        let url = format!("{}/scrape/{}/status/", self.config.scraping_agent_api_url, job_id);
        let response = self
            .agent_client
            .get(&url)
            .bearer_auth(&self.config.scraping_agent_token)
            .send()
            .await
            .context("agent status request failed")?;

        if !response.status().is_success() {
            bail!("agent returned {} for status", response.status());
        }
        response.json().await.context("invalid agent status response")
    }

    pub async fn fetch_job_result(&self, job_id: &str) -> Result<Option<JobResult>> {
        let url = format!("{}/scrape/{}/result/", self.config.scraping_agent_api_url, job_id);
        let response = self
            .agent_client
            .get(&url)
            .bearer_auth(&self.config.scraping_agent_token)
            .send()
            .await
            .context("agent result request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            bail!("agent returned {} for result", response.status());
        }
        Ok(Some(response.json().await.context("invalid agent result response")?))
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn IngestorStore> = Arc::new(
        crate::store::mongo::MongoIngestorStore::connect(&config.mongo_uri, &config.mongo_dbname).await?,
    );
    let state = Arc::new(IngestorState::new(store, config.clone()));

    let _scheduler = scheduler::start_scheduler(state.clone()).await?;

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&config.ingestor_bind_addr).await?;
    tracing::info!("ingestor listening on {}", config.ingestor_bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
