//! Durable store abstraction. The ingestor side persists Sources,
//! Listings, ProductUrls, Batches, Products, and Statuses; the agent side
//! persists Jobs and JobResults. Two trait objects rather than one keep
//! the two DBs named in the external interfaces separate, the way the
//! original deployment uses two Mongo databases.

pub mod memory;
pub mod mongo;

use crate::error::StoreError;
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait IngestorStore: Send + Sync {
    async fn create_source(&self, source: Source) -> Result<(), StoreError>;
    async fn get_source(&self, id: &str) -> Result<Source, StoreError>;
    async fn list_sources(&self) -> Result<Vec<Source>, StoreError>;
    async fn list_active_sources(&self) -> Result<Vec<Source>, StoreError>;
    async fn delete_source(&self, id: &str) -> Result<(), StoreError>;

    async fn create_listing(&self, listing: Listing) -> Result<(), StoreError>;
    async fn get_listing(&self, id: &str) -> Result<Listing, StoreError>;
    async fn add_listing_to_source(&self, source_id: &str, listing_id: &str) -> Result<(), StoreError>;
    async fn remove_listing_from_source(&self, source_id: &str, listing_id: &str) -> Result<(), StoreError>;
    async fn delete_listing(&self, id: &str) -> Result<(), StoreError>;
    /// One Listing per Source: the active Listing with the smallest
    /// `last_listed` (null treated as the minimum).
    async fn oldest_listing_per_source(&self, source_id: &str) -> Result<Option<Listing>, StoreError>;
    async fn set_listing_last_listed(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn product_url_exists(&self, url: &str) -> Result<bool, StoreError>;
    async fn find_product_url_by_url(&self, url: &str) -> Result<Option<ProductUrl>, StoreError>;
    async fn get_product_url(&self, id: &str) -> Result<ProductUrl, StoreError>;
    async fn create_product_url(&self, product_url: ProductUrl) -> Result<(), StoreError>;
    async fn list_unbatched_product_urls(&self) -> Result<Vec<ProductUrl>, StoreError>;
    async fn mark_product_url_batched(&self, id: &str, batch_id: &str) -> Result<(), StoreError>;

    async fn create_batch(&self, batch: Batch) -> Result<(), StoreError>;
    async fn get_batch(&self, id: &str) -> Result<Batch, StoreError>;
    /// Oldest batch (by created_at) with `batch_size < capacity`, if any.
    async fn batch_with_space(&self, capacity: usize) -> Result<Option<Batch>, StoreError>;
    async fn append_url_to_batch(&self, batch_id: &str, url_id: &str) -> Result<(), StoreError>;
    /// The `n` oldest unprocessed batches, null `last_processed` first.
    async fn oldest_unprocessed_batches(&self, n: usize) -> Result<Vec<Batch>, StoreError>;
    async fn set_batch_last_processed(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError>;
    async fn upsert_product(&self, product: Product) -> Result<(), StoreError>;

    async fn create_status(&self, status: Status) -> Result<(), StoreError>;
    async fn list_processing_statuses(&self) -> Result<Vec<Status>, StoreError>;
    async fn set_status_state(&self, id: &str, state: StatusState) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn create_job(&self, job: Job) -> Result<(), StoreError>;
    async fn get_job(&self, job_id: &str) -> Result<Job, StoreError>;
    async fn set_job_processing(&self, job_id: &str) -> Result<(), StoreError>;
    async fn set_job_terminal(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError>;

    async fn create_job_result(&self, result: JobResult) -> Result<(), StoreError>;
    async fn get_job_result(&self, job_id: &str) -> Result<Option<JobResult>, StoreError>;
}
