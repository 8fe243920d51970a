//! MongoDB-backed store, one `Database` handle per side (ingestor DB
//! holds sources/listings/product_urls/batches/products/statuses, agent
//! DB holds jobs/job_results), matching the persistent layout.

use super::{AgentStore, IngestorStore};
use crate::error::StoreError;
use crate::models::*;
use async_trait::async_trait;
use bson::doc;
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::{Client, Collection, Database};

#[derive(Clone)]
pub struct MongoIngestorStore {
    db: Database,
}

impl MongoIngestorStore {
    pub async fn connect(uri: &str, dbname: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            db: client.database(dbname),
        })
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    fn sources(&self) -> Collection<Source> {
        self.db.collection("sources")
    }

    fn listings(&self) -> Collection<Listing> {
        self.db.collection("listings")
    }

    fn product_urls(&self) -> Collection<ProductUrl> {
        self.db.collection("product_urls")
    }

    fn batches(&self) -> Collection<Batch> {
        self.db.collection("batches")
    }

    fn products(&self) -> Collection<Product> {
        self.db.collection("products")
    }

    fn statuses(&self) -> Collection<Status> {
        self.db.collection("statuses")
    }
}

#[async_trait]
impl IngestorStore for MongoIngestorStore {
    async fn create_source(&self, source: Source) -> Result<(), StoreError> {
        self.sources().insert_one(source).await?;
        Ok(())
    }

    async fn get_source(&self, id: &str) -> Result<Source, StoreError> {
        self.sources()
            .find_one(doc! { "id": id })
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("source {id}")))
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        let cursor = self.sources().find(doc! {}).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_active_sources(&self) -> Result<Vec<Source>, StoreError> {
        let cursor = self.sources().find(doc! { "active": true }).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn delete_source(&self, id: &str) -> Result<(), StoreError> {
        self.sources().delete_one(doc! { "id": id }).await?;
        Ok(())
    }

    async fn create_listing(&self, listing: Listing) -> Result<(), StoreError> {
        self.listings().insert_one(listing).await?;
        Ok(())
    }

    async fn get_listing(&self, id: &str) -> Result<Listing, StoreError> {
        self.listings()
            .find_one(doc! { "id": id })
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("listing {id}")))
    }

    async fn add_listing_to_source(&self, source_id: &str, listing_id: &str) -> Result<(), StoreError> {
        self.sources()
            .update_one(
                doc! { "id": source_id },
                doc! {
                    "$addToSet": { "listings": listing_id },
                    "$inc": { "listing_count": 1 },
                },
            )
            .await?;
        Ok(())
    }

    async fn remove_listing_from_source(&self, source_id: &str, listing_id: &str) -> Result<(), StoreError> {
        self.sources()
            .update_one(
                doc! { "id": source_id },
                doc! {
                    "$pull": { "listings": listing_id },
                    "$inc": { "listing_count": -1 },
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_listing(&self, id: &str) -> Result<(), StoreError> {
        self.listings().delete_one(doc! { "id": id }).await?;
        Ok(())
    }

    async fn oldest_listing_per_source(&self, source_id: &str) -> Result<Option<Listing>, StoreError> {
        let listing = self
            .listings()
            .find_one(doc! { "source_id": source_id, "active": true })
            .sort(doc! { "last_listed": 1 })
            .await?;
        Ok(listing)
    }

    async fn set_listing_last_listed(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.listings()
            .update_one(
                doc! { "id": id },
                doc! { "$set": { "last_listed": bson::DateTime::from_chrono(at) } },
            )
            .await?;
        Ok(())
    }

    async fn product_url_exists(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.product_urls().find_one(doc! { "url": url }).await?.is_some())
    }

    async fn find_product_url_by_url(&self, url: &str) -> Result<Option<ProductUrl>, StoreError> {
        Ok(self.product_urls().find_one(doc! { "url": url }).await?)
    }

    async fn get_product_url(&self, id: &str) -> Result<ProductUrl, StoreError> {
        self.product_urls()
            .find_one(doc! { "id": id })
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("product_url {id}")))
    }

    async fn create_product_url(&self, product_url: ProductUrl) -> Result<(), StoreError> {
        self.product_urls().insert_one(product_url).await?;
        Ok(())
    }

    async fn list_unbatched_product_urls(&self) -> Result<Vec<ProductUrl>, StoreError> {
        let cursor = self.product_urls().find(doc! { "batched": false }).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn mark_product_url_batched(&self, id: &str, batch_id: &str) -> Result<(), StoreError> {
        self.product_urls()
            .update_one(
                doc! { "id": id },
                doc! { "$set": { "batched": true, "batch_id": batch_id } },
            )
            .await?;
        Ok(())
    }

    async fn create_batch(&self, batch: Batch) -> Result<(), StoreError> {
        self.batches().insert_one(batch).await?;
        Ok(())
    }

    async fn get_batch(&self, id: &str) -> Result<Batch, StoreError> {
        self.batches()
            .find_one(doc! { "id": id })
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("batch {id}")))
    }

    async fn batch_with_space(&self, capacity: usize) -> Result<Option<Batch>, StoreError> {
        let batch = self
            .batches()
            .find_one(doc! { "$expr": { "$lt": ["$batch_size", capacity as i64] } })
            .sort(doc! { "created_at": 1 })
            .await?;
        Ok(batch)
    }

    async fn append_url_to_batch(&self, batch_id: &str, url_id: &str) -> Result<(), StoreError> {
        self.batches()
            .update_one(
                doc! { "id": batch_id },
                doc! {
                    "$addToSet": { "urls": url_id },
                    "$inc": { "batch_size": 1 },
                },
            )
            .await?;
        Ok(())
    }

    async fn oldest_unprocessed_batches(&self, n: usize) -> Result<Vec<Batch>, StoreError> {
        let cursor = self
            .batches()
            .find(doc! {})
            .sort(doc! { "last_processed": 1 })
            .limit(n as i64)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn set_batch_last_processed(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.batches()
            .update_one(
                doc! { "id": id },
                doc! { "$set": { "last_processed": bson::DateTime::from_chrono(at) } },
            )
            .await?;
        Ok(())
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.products().find_one(doc! { "id": id }).await?)
    }

    async fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        let id = product.id.clone();
        let doc = bson::to_document(&product)?;
        self.products()
            .update_one(doc! { "id": id }, doc! { "$set": doc })
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn create_status(&self, status: Status) -> Result<(), StoreError> {
        self.statuses().insert_one(status).await?;
        Ok(())
    }

    async fn list_processing_statuses(&self) -> Result<Vec<Status>, StoreError> {
        let cursor = self.statuses().find(doc! { "status": "processing" }).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn set_status_state(&self, id: &str, state: StatusState) -> Result<(), StoreError> {
        let state_str = match state {
            StatusState::Processing => "processing",
            StatusState::Completed => "completed",
            StatusState::Failed => "failed",
        };
        self.statuses()
            .update_one(doc! { "id": id }, doc! { "$set": { "status": state_str } })
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct MongoAgentStore {
    db: Database,
}

impl MongoAgentStore {
    pub async fn connect(uri: &str, dbname: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            db: client.database(dbname),
        })
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    fn jobs(&self) -> Collection<Job> {
        self.db.collection("jobs")
    }

    fn job_results(&self) -> Collection<JobResult> {
        self.db.collection("job_results")
    }
}

#[async_trait]
impl AgentStore for MongoAgentStore {
    async fn create_job(&self, job: Job) -> Result<(), StoreError> {
        self.jobs().insert_one(job).await?;
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Job, StoreError> {
        self.jobs()
            .find_one(doc! { "job_id": job_id })
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("job {job_id}")))
    }

    async fn set_job_processing(&self, job_id: &str) -> Result<(), StoreError> {
        self.jobs()
            .update_one(doc! { "job_id": job_id }, doc! { "$set": { "status": "processing" } })
            .await?;
        Ok(())
    }

    async fn set_job_terminal(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        let status_str = match status {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        self.jobs()
            .update_one(
                doc! { "job_id": job_id },
                doc! {
                    "$set": {
                        "status": status_str,
                        "completed_at": bson::DateTime::from_chrono(Utc::now()),
                        "error_message": error_message,
                    }
                },
            )
            .await?;
        Ok(())
    }

    async fn create_job_result(&self, result: JobResult) -> Result<(), StoreError> {
        self.job_results().insert_one(result).await?;
        Ok(())
    }

    async fn get_job_result(&self, job_id: &str) -> Result<Option<JobResult>, StoreError> {
        Ok(self.job_results().find_one(doc! { "job_id": job_id }).await?)
    }
}
