//! The `Scraper` capability, its `ContentLoader` building block, and the
//! registry that maps a source domain token to a scraper factory.

use crate::error::ScraperError;
use crate::models::{Pagination, Product};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A loader's only contract: turn a URL into HTML, or fail with one of the
/// content-loading error kinds. Real browser automation (Selenium,
/// Playwright, infinite-scroll variants) is an external-collaborator
/// concern; only the plain HTTP loader is implemented here.
#[async_trait]
pub trait ContentLoader: Send + Sync {
    async fn load_content(&self, url: &str) -> Result<String, ScraperError>;
}

/// Plain HTTP GET loader built on `reqwest`.
pub struct RequestLoader {
    client: Client,
}

impl RequestLoader {
    pub fn new(timeout_secs: u64) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| ScraperError::ContentNotLoaded(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentLoader for RequestLoader {
    async fn load_content(&self, url: &str) -> Result<String, ScraperError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ScraperError::Timeout(url.to_string())
            } else {
                ScraperError::ContentNotLoaded(e.to_string())
            }
        })?;

        match response.status() {
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(ScraperError::RateLimit(url.to_string())),
            status if status.is_success() => response
                .text()
                .await
                .map_err(|e| ScraperError::ContentNotLoaded(e.to_string())),
            status => Err(ScraperError::ContentNotLoaded(format!(
                "HTTP {status} for {url}"
            ))),
        }
    }
}

/// Browser-automation loader variant not implemented in this deployment.
/// Declared so the capability surface matches the full loader taxonomy;
/// invoking it fails fast rather than silently degrading to plain HTTP.
pub struct UnsupportedLoader {
    variant: &'static str,
}

impl UnsupportedLoader {
    pub fn selenium() -> Self {
        Self { variant: "selenium" }
    }

    pub fn selenium_infinite_scroll(_max_scrolls: u32, _target_element_class: &str, _scroll_delay: Duration) -> Self {
        Self {
            variant: "selenium_infinite_scroll",
        }
    }

    pub fn playwright() -> Self {
        Self { variant: "playwright" }
    }
}

#[async_trait]
impl ContentLoader for UnsupportedLoader {
    async fn load_content(&self, url: &str) -> Result<String, ScraperError> {
        Err(ScraperError::ContentNotLoaded(format!(
            "{} loader is not available in this deployment (url: {url})",
            self.variant
        )))
    }
}

/// Per-site scraping capability: pagination, listing enumeration, product
/// detail extraction, and cache lifecycle hooks.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// The registered domain token this instance was constructed for.
    fn source_key(&self) -> &str;

    async fn page_content(&self, url: &str) -> Result<String, ScraperError>;

    async fn pagination(&self, url: &str) -> Result<Pagination, ScraperError>;

    async fn product_listings(&self, url: &str, page: u32) -> Result<Vec<String>, ScraperError>;

    async fn product_details(&self, url: &str) -> Result<Product, ScraperError>;

    /// Release any held resources (browser session, cookies). Called by
    /// the cache on eviction and by workers when a scraper is discarded
    /// instead of returned to the cache.
    async fn close(&self) {}
}

/// Builds a fresh `Scraper` instance for a registered source.
pub trait ScraperFactory: Send + Sync {
    fn build(&self) -> Arc<dyn Scraper>;
}

impl<F> ScraperFactory for F
where
    F: Fn() -> Arc<dyn Scraper> + Send + Sync,
{
    fn build(&self) -> Arc<dyn Scraper> {
        (self)()
    }
}

/// Maps a second-level domain token (`amazon`, `myntra`, ...) to a factory.
#[derive(Default)]
pub struct ScraperRegistry {
    factories: HashMap<String, Arc<dyn ScraperFactory>>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, domain_token: impl Into<String>, factory: Arc<dyn ScraperFactory>) {
        self.factories.insert(domain_token.into(), factory);
    }

    /// Extract the registered domain token from a URL (the second-level
    /// domain, e.g. `https://www.amazon.in/...` -> `amazon`).
    pub fn domain_token(url: &str) -> Result<String, ScraperError> {
        let parsed = Url::parse(url).map_err(|_| ScraperError::BadUrl(url.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ScraperError::BadUrl(url.to_string()))?;
        let labels: Vec<&str> = host.split('.').collect();
        let token = if labels.len() >= 2 {
            labels[labels.len() - 2]
        } else {
            host
        };
        Ok(token.to_lowercase())
    }

    pub fn build_for(&self, domain_token: &str) -> Result<Arc<dyn Scraper>, ScraperError> {
        self.factories
            .get(domain_token)
            .map(|f| f.build())
            .ok_or_else(|| ScraperError::BadUrl(format!("no scraper registered for {domain_token}")))
    }
}

/// A `Scraper` built from a JSON listing/detail convention (`?page=N` for
/// pagination, a CSS-free JSON product feed for detail pages). Serves as
/// the one concrete, registrable implementation in this deployment; real
/// per-site extraction logic is supplied by external collaborators
/// satisfying the same trait.
pub struct GenericJsonScraper {
    source: String,
    loader: Arc<dyn ContentLoader>,
}

impl GenericJsonScraper {
    pub fn new(source: impl Into<String>, loader: Arc<dyn ContentLoader>) -> Self {
        Self {
            source: source.into(),
            loader,
        }
    }
}

#[async_trait]
impl Scraper for GenericJsonScraper {
    fn source_key(&self) -> &str {
        &self.source
    }

    async fn page_content(&self, url: &str) -> Result<String, ScraperError> {
        self.loader.load_content(url).await
    }

    async fn pagination(&self, url: &str) -> Result<Pagination, ScraperError> {
        let body = self.loader.load_content(url).await?;
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ScraperError::DataParsing(e.to_string()))?;

        let current_page = value
            .get("page")
            .and_then(|v| v.as_u64())
            .unwrap_or(1) as u32;
        let total_pages = value.get("total_pages").and_then(|v| v.as_u64()).map(|v| v as u32);
        let next_page_url = value
            .get("next_page_url")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Pagination {
            current_page,
            total_pages,
            next_page_url,
        })
    }

    async fn product_listings(&self, url: &str, _page: u32) -> Result<Vec<String>, ScraperError> {
        let body = self.loader.load_content(url).await?;
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ScraperError::DataParsing(e.to_string()))?;
        let items = value
            .get("items")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ScraperError::DataComponentNotFound("items".to_string()))?;

        Ok(items
            .iter()
            .filter_map(|item| item.get("url").and_then(|u| u.as_str()))
            .map(|s| s.to_string())
            .collect())
    }

    async fn product_details(&self, url: &str) -> Result<Product, ScraperError> {
        let body = self.loader.load_content(url).await?;
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ScraperError::DataParsing(e.to_string()))?;

        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ScraperError::DataComponentNotFound("id".to_string()))?
            .to_string();

        Ok(Product {
            id,
            url_id: String::new(),
            title: value.get("title").and_then(|v| v.as_str()).map(String::from),
            price: value.get("price").and_then(|v| v.as_f64()),
            category: value.get("category").and_then(|v| v.as_str()).map(String::from),
            gender: value.get("gender").and_then(|v| v.as_str()).map(String::from),
            url: url.to_string(),
            image_url: value.get("image_url").and_then(|v| v.as_str()).map(String::from),
            colors: value
                .get("colors")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
            sizes: value
                .get("sizes")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
            material: value.get("material").and_then(|v| v.as_str()).map(String::from),
            description: value.get("description").and_then(|v| v.as_str()).map(String::from),
            rating: value.get("rating").and_then(|v| v.as_f64()),
            review_count: value.get("review_count").and_then(|v| v.as_i64()),
            processed: false,
            scraped_at: Utc::now(),
            processed_at: None,
            page_index: 0,
            page_content: Some(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_token_extracts_second_level_domain() {
        assert_eq!(
            ScraperRegistry::domain_token("https://www.amazon.in/s?k=shoes").unwrap(),
            "amazon"
        );
        assert_eq!(
            ScraperRegistry::domain_token("https://myntra.com/shoes").unwrap(),
            "myntra"
        );
    }

    #[test]
    fn domain_token_rejects_unparseable_url() {
        assert!(ScraperRegistry::domain_token("not a url").is_err());
    }

    #[test]
    fn registry_fails_on_unknown_domain() {
        let registry = ScraperRegistry::new();
        assert!(registry.build_for("unknown").is_err());
    }
}
