use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A website from which products are ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub listings: Vec<String>,
    pub listing_count: i64,
}

impl Source {
    pub fn new(name: String, base_url: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            base_url,
            active: true,
            created_at: Utc::now(),
            listings: Vec::new(),
            listing_count: 0,
        }
    }
}

/// A URL within a Source that paginates into product URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub source_id: String,
    pub url: String,
    pub active: bool,
    pub last_listed: Option<DateTime<Utc>>,
}

impl Listing {
    pub fn new(source_id: String, url: String, active: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_id,
            url,
            active,
            last_listed: None,
        }
    }
}

/// A single product-page URL discovered from a Listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductUrl {
    pub id: String,
    pub url: String,
    pub source_id: String,
    pub listing_id: String,
    pub page_index: i64,
    pub batched: bool,
    pub batch_id: Option<String>,
}

impl ProductUrl {
    pub fn new(url: String, source_id: String, listing_id: String, page_index: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url,
            source_id,
            listing_id,
            page_index,
            batched: false,
            batch_id: None,
        }
    }
}

/// A bounded group of ProductUrls scheduled together for product-detail scraping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub batch_size: i64,
    pub urls: Vec<String>,
    pub last_processed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            batch_size: 0,
            urls: Vec::new(),
            last_processed: None,
            created_at: Utc::now(),
        }
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

/// The canonical record produced by scraping a product page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub url_id: String,
    pub title: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub gender: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
    pub material: Option<String>,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i64>,
    pub processed: bool,
    pub scraped_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub page_index: i64,
    pub page_content: Option<String>,
}

impl Product {
    /// Apply an additive update: overwrite a field only when the incoming
    /// value is present/non-empty. Missing incoming data never clobbers an
    /// existing value. `review_count = 0` is treated as missing, not a
    /// real count of zero reviews.
    pub fn apply_additive_update(&mut self, incoming: &Product) {
        if let Some(price) = incoming.price {
            self.price = Some(price);
        }
        if !incoming.colors.is_empty() {
            self.colors = incoming.colors.clone();
        }
        if !incoming.sizes.is_empty() {
            self.sizes = incoming.sizes.clone();
        }
        if let Some(rating) = incoming.rating {
            self.rating = Some(rating);
        }
        if let Some(review_count) = incoming.review_count {
            if review_count != 0 {
                self.review_count = Some(review_count);
            }
        }
        self.scraped_at = incoming.scraped_at;
        if let Some(content) = &incoming.page_content {
            if !content.is_empty() {
                self.page_content = Some(content.clone());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionType {
    Listing,
    Product,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Processing,
    Completed,
    Failed,
}

/// The ingestor's tracking row for an outstanding Job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub ingestion_type: IngestionType,
    pub job_id: String,
    pub entity_id: String,
    pub status: StatusState,
}

impl Status {
    pub fn new(ingestion_type: IngestionType, job_id: String, entity_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ingestion_type,
            job_id,
            entity_id,
            status: StatusState::Processing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypePage {
    Listing,
    Product,
}

impl TypePage {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "listing" => Some(Self::Listing),
            "product" => Some(Self::Product),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// A unit of work on the agent (listing or product scrape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub webpage_url: String,
    pub priority: Priority,
    pub type_page: TypePage,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Job {
    pub fn new(webpage_url: String, priority: Priority, type_page: TypePage) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            webpage_url,
            priority,
            type_page,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }
}

/// One item discovered during a listing walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingItem {
    pub url: String,
    pub page_rank: i64,
}

/// The payload a worker produces for a completed Job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum JobResultPayload {
    Listing { items: Vec<ListingItem> },
    Product(Box<Product>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub result: Option<JobResultPayload>,
    pub status: JobStatus,
    pub completed_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

/// Pagination state returned by a scraper for a given listing URL.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: Option<u32>,
    pub next_page_url: Option<String>,
}
