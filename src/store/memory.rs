//! In-memory store used by tests (and suitable for a single-process demo
//! deployment). Mirrors the Mongo-backed implementation's semantics
//! without requiring a live database.

use super::{AgentStore, IngestorStore};
use crate::error::StoreError;
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct InMemoryStore {
    sources: Mutex<HashMap<String, Source>>,
    listings: Mutex<HashMap<String, Listing>>,
    product_urls: Mutex<HashMap<String, ProductUrl>>,
    batches: Mutex<HashMap<String, Batch>>,
    products: Mutex<HashMap<String, Product>>,
    statuses: Mutex<HashMap<String, Status>>,
    jobs: Mutex<HashMap<String, Job>>,
    job_results: Mutex<HashMap<String, JobResult>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IngestorStore for InMemoryStore {
    async fn create_source(&self, source: Source) -> Result<(), StoreError> {
        self.sources.lock().insert(source.id.clone(), source);
        Ok(())
    }

    async fn get_source(&self, id: &str) -> Result<Source, StoreError> {
        self.sources
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("source {id}")))
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        Ok(self.sources.lock().values().cloned().collect())
    }

    async fn list_active_sources(&self) -> Result<Vec<Source>, StoreError> {
        Ok(self.sources.lock().values().filter(|s| s.active).cloned().collect())
    }

    async fn delete_source(&self, id: &str) -> Result<(), StoreError> {
        self.sources.lock().remove(id);
        Ok(())
    }

    async fn create_listing(&self, listing: Listing) -> Result<(), StoreError> {
        self.listings.lock().insert(listing.id.clone(), listing);
        Ok(())
    }

    async fn get_listing(&self, id: &str) -> Result<Listing, StoreError> {
        self.listings
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("listing {id}")))
    }

    async fn add_listing_to_source(&self, source_id: &str, listing_id: &str) -> Result<(), StoreError> {
        let mut sources = self.sources.lock();
        let source = sources
            .get_mut(source_id)
            .ok_or_else(|| StoreError::NotFound(format!("source {source_id}")))?;
        if !source.listings.contains(&listing_id.to_string()) {
            source.listings.push(listing_id.to_string());
            source.listing_count = source.listings.len() as i64;
        }
        Ok(())
    }

    async fn remove_listing_from_source(&self, source_id: &str, listing_id: &str) -> Result<(), StoreError> {
        let mut sources = self.sources.lock();
        let source = sources
            .get_mut(source_id)
            .ok_or_else(|| StoreError::NotFound(format!("source {source_id}")))?;
        source.listings.retain(|l| l != listing_id);
        source.listing_count = source.listings.len() as i64;
        Ok(())
    }

    async fn delete_listing(&self, id: &str) -> Result<(), StoreError> {
        self.listings.lock().remove(id);
        Ok(())
    }

    async fn oldest_listing_per_source(&self, source_id: &str) -> Result<Option<Listing>, StoreError> {
        let listings = self.listings.lock();
        Ok(listings
            .values()
            .filter(|l| l.source_id == source_id && l.active)
            .min_by_key(|l| l.last_listed.map(|t| t.timestamp_micros()).unwrap_or(i64::MIN))
            .cloned())
    }

    async fn set_listing_last_listed(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut listings = self.listings.lock();
        let listing = listings
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("listing {id}")))?;
        listing.last_listed = Some(at);
        Ok(())
    }

    async fn product_url_exists(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.product_urls.lock().values().any(|p| p.url == url))
    }

    async fn find_product_url_by_url(&self, url: &str) -> Result<Option<ProductUrl>, StoreError> {
        Ok(self.product_urls.lock().values().find(|p| p.url == url).cloned())
    }

    async fn get_product_url(&self, id: &str) -> Result<ProductUrl, StoreError> {
        self.product_urls
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("product_url {id}")))
    }

    async fn create_product_url(&self, product_url: ProductUrl) -> Result<(), StoreError> {
        self.product_urls.lock().insert(product_url.id.clone(), product_url);
        Ok(())
    }

    async fn list_unbatched_product_urls(&self) -> Result<Vec<ProductUrl>, StoreError> {
        Ok(self
            .product_urls
            .lock()
            .values()
            .filter(|p| !p.batched)
            .cloned()
            .collect())
    }

    async fn mark_product_url_batched(&self, id: &str, batch_id: &str) -> Result<(), StoreError> {
        let mut urls = self.product_urls.lock();
        let url = urls
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("product_url {id}")))?;
        url.batched = true;
        url.batch_id = Some(batch_id.to_string());
        Ok(())
    }

    async fn create_batch(&self, batch: Batch) -> Result<(), StoreError> {
        self.batches.lock().insert(batch.id.clone(), batch);
        Ok(())
    }

    async fn get_batch(&self, id: &str) -> Result<Batch, StoreError> {
        self.batches
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("batch {id}")))
    }

    async fn batch_with_space(&self, capacity: usize) -> Result<Option<Batch>, StoreError> {
        let batches = self.batches.lock();
        Ok(batches
            .values()
            .filter(|b| (b.batch_size as usize) < capacity)
            .min_by_key(|b| b.created_at)
            .cloned())
    }

    async fn append_url_to_batch(&self, batch_id: &str, url_id: &str) -> Result<(), StoreError> {
        let mut batches = self.batches.lock();
        let batch = batches
            .get_mut(batch_id)
            .ok_or_else(|| StoreError::NotFound(format!("batch {batch_id}")))?;
        batch.urls.push(url_id.to_string());
        batch.batch_size = batch.urls.len() as i64;
        Ok(())
    }

    async fn oldest_unprocessed_batches(&self, n: usize) -> Result<Vec<Batch>, StoreError> {
        let batches = self.batches.lock();
        let mut all: Vec<Batch> = batches.values().cloned().collect();
        all.sort_by_key(|b| b.last_processed.map(|t| t.timestamp_micros()).unwrap_or(i64::MIN));
        all.truncate(n);
        Ok(all)
    }

    async fn set_batch_last_processed(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut batches = self.batches.lock();
        let batch = batches
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("batch {id}")))?;
        batch.last_processed = Some(at);
        Ok(())
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.products.lock().get(id).cloned())
    }

    async fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        self.products.lock().insert(product.id.clone(), product);
        Ok(())
    }

    async fn create_status(&self, status: Status) -> Result<(), StoreError> {
        self.statuses.lock().insert(status.id.clone(), status);
        Ok(())
    }

    async fn list_processing_statuses(&self) -> Result<Vec<Status>, StoreError> {
        Ok(self
            .statuses
            .lock()
            .values()
            .filter(|s| s.status == StatusState::Processing)
            .cloned()
            .collect())
    }

    async fn set_status_state(&self, id: &str, state: StatusState) -> Result<(), StoreError> {
        let mut statuses = self.statuses.lock();
        let status = statuses
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("status {id}")))?;
        status.status = state;
        Ok(())
    }
}

#[async_trait]
impl AgentStore for InMemoryStore {
    async fn create_job(&self, job: Job) -> Result<(), StoreError> {
        self.jobs.lock().insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Job, StoreError> {
        self.jobs
            .lock()
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))
    }

    async fn set_job_processing(&self, job_id: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))?;
        job.status = JobStatus::Processing;
        Ok(())
    }

    async fn set_job_terminal(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))?;
        job.status = status;
        job.completed_at = Some(Utc::now());
        job.error_message = error_message;
        Ok(())
    }

    async fn create_job_result(&self, result: JobResult) -> Result<(), StoreError> {
        self.job_results.lock().insert(result.job_id.clone(), result);
        Ok(())
    }

    async fn get_job_result(&self, job_id: &str) -> Result<Option<JobResult>, StoreError> {
        Ok(self.job_results.lock().get(job_id).cloned())
    }
}
