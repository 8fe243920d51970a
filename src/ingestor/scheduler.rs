//! The four periodic ingestor tasks (S1-S4), plus the cron wiring that
//! fires them on the configured wall-clock cadence. Task bodies are also
//! invoked directly by the admin trigger endpoints, so the scheduler and
//! the HTTP surface share exactly one implementation per task.

use super::IngestorState;
use crate::models::*;
use crate::validation::{validate_batch, validate_product};
use chrono::{TimeZone, Timelike, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

/// S1: for each active Source, dispatch a listing scrape for the Listing
/// with the smallest `last_listed` (nulls first). Per-listing failures are
/// logged and do not abort the task; this mirrors the original worker,
/// which never guards against a previous open Status on the same Listing.
pub async fn start_scraping_listing(state: &IngestorState) {
    let sources = match state.store.list_active_sources().await {
        Ok(sources) => sources,
        Err(e) => {
            tracing::error!(error = %e, "S1: failed to list active sources");
            return;
        }
    };

    for source in sources {
        let listing = match state.store.oldest_listing_per_source(&source.id).await {
            Ok(Some(l)) => l,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(source_id = %source.id, error = %e, "S1: failed to find oldest listing");
                continue;
            }
        };

        let job_id = match state
            .submit_scrape(&listing.url, Priority::Low, TypePage::Listing)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(listing_id = %listing.id, error = %e, "S1: agent dispatch failed");
                continue;
            }
        };

        let status = Status::new(IngestionType::Listing, job_id, listing.id.clone());
        if let Err(e) = state.store.create_status(status).await {
            tracing::error!(listing_id = %listing.id, error = %e, "S1: failed to persist status");
        }
    }
}

/// S2: group unbatched ProductUrls into Batches of at most
/// `MAXIMUM_BATCH_SIZE`, filling an existing under-capacity batch first.
pub async fn create_product_batches(state: &IngestorState) {
    let max = state.config.maximum_batch_size;
    let mut unbatched = match state.store.list_unbatched_product_urls().await {
        Ok(urls) => urls,
        Err(e) => {
            tracing::error!(error = %e, "S2: failed to list unbatched product urls");
            return;
        }
    };
    if unbatched.is_empty() {
        return;
    }

    if let Ok(Some(batch)) = state.store.batch_with_space(max).await {
        let batch_id = batch.id.clone();
        let space = max.saturating_sub(batch.batch_size as usize);
        let take = space.min(unbatched.len());
        for url in unbatched.drain(0..take) {
            if let Err(e) = fill_one(state, &batch_id, &url).await {
                tracing::error!(batch_id = %batch_id, url_id = %url.id, error = %e, "S2: failed to assign url to batch");
            }
        }
        check_batch_invariant(state, &batch_id, max).await;
    }

    for chunk in unbatched.chunks(max) {
        let batch = Batch::new();
        if let Err(e) = state.store.create_batch(batch.clone()).await {
            tracing::error!(error = %e, "S2: failed to create batch");
            continue;
        }
        for url in chunk {
            if let Err(e) = fill_one(state, &batch.id, url).await {
                tracing::error!(batch_id = %batch.id, url_id = %url.id, error = %e, "S2: failed to assign url to new batch");
            }
        }
        check_batch_invariant(state, &batch.id, max).await;
    }
}

/// Re-read a just-filled batch and log if `batch_size <= max` ever drifts;
/// a violation here would mean the per-URL update and the batch update
/// desynced.
async fn check_batch_invariant(state: &IngestorState, batch_id: &str, max: usize) {
    if let Ok(batch) = state.store.get_batch(batch_id).await {
        if let Err(e) = validate_batch(&batch, max) {
            tracing::error!(batch_id = %batch_id, error = %e, "S2: batch invariant violated");
        }
    }
}

async fn fill_one(state: &IngestorState, batch_id: &str, url: &ProductUrl) -> Result<(), anyhow::Error> {
    state.store.mark_product_url_batched(&url.id, batch_id).await?;
    state.store.append_url_to_batch(batch_id, &url.id).await?;
    Ok(())
}

/// S3: dispatch the N oldest unprocessed batches as high-priority product
/// jobs, one per URL, then mark each batch's `last_processed`.
pub async fn scrape_batch(state: &IngestorState) {
    let n = state.config.maximum_batches_to_process;
    let batches = match state.store.oldest_unprocessed_batches(n).await {
        Ok(batches) => batches,
        Err(e) => {
            tracing::error!(error = %e, "S3: failed to list unprocessed batches");
            return;
        }
    };

    for batch in batches {
        for url_id in &batch.urls {
            let product_url = match state.store.get_product_url(url_id).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(url_id = %url_id, error = %e, "S3: product url not found");
                    continue;
                }
            };

            let job_id = match state
                .submit_scrape(&product_url.url, Priority::High, TypePage::Product)
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    tracing::error!(url_id = %product_url.id, error = %e, "S3: agent dispatch failed");
                    continue;
                }
            };

            let status = Status::new(IngestionType::Product, job_id, product_url.id.clone());
            if let Err(e) = state.store.create_status(status).await {
                tracing::error!(url_id = %product_url.id, error = %e, "S3: failed to persist status");
            }
        }

        if let Err(e) = state.store.set_batch_last_processed(&batch.id, Utc::now()).await {
            tracing::error!(batch_id = %batch.id, error = %e, "S3: failed to mark batch processed");
        }
    }
}

/// S4: reconcile every still-open Status against the agent's job status.
pub async fn fetch_results(state: &IngestorState) {
    let statuses = match state.store.list_processing_statuses().await {
        Ok(statuses) => statuses,
        Err(e) => {
            tracing::error!(error = %e, "S4: failed to list processing statuses");
            return;
        }
    };

    for status in statuses {
        if let Err(e) = reconcile_one(state, &status).await {
            tracing::error!(status_id = %status.id, error = %e, "S4: reconciliation failed");
            let _ = state.store.set_status_state(&status.id, StatusState::Failed).await;
        }
    }
}

async fn reconcile_one(state: &IngestorState, status: &Status) -> Result<(), anyhow::Error> {
    let job = state.fetch_job_status(&status.job_id).await?;

    match job.status {
        JobStatus::Completed => {
            let result = state
                .fetch_job_result(&status.job_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("job {} reported completed with no result", status.job_id))?;

            match (status.ingestion_type, result.result) {
                (IngestionType::Listing, Some(JobResultPayload::Listing { items })) => {
                    let listing = state.store.get_listing(&status.entity_id).await?;
                    for item in items {
                        if state.store.product_url_exists(&item.url).await? {
                            continue;
                        }
                        let product_url =
                            ProductUrl::new(item.url, listing.source_id.clone(), listing.id.clone(), item.page_rank);
                        state.store.create_product_url(product_url).await?;
                    }
                    state.store.set_listing_last_listed(&listing.id, Utc::now()).await?;
                    state.store.set_status_state(&status.id, StatusState::Completed).await?;
                }
                (IngestionType::Product, Some(JobResultPayload::Product(incoming))) => {
                    if let Err(e) = validate_product(&incoming) {
                        tracing::warn!(product_id = %incoming.id, error = %e, "S4: scraped product failed validation");
                        state.store.set_status_state(&status.id, StatusState::Failed).await?;
                        return Ok(());
                    }
                    match state.store.get_product(&incoming.id).await? {
                        Some(mut existing) => {
                            existing.apply_additive_update(&incoming);
                            state.store.upsert_product(existing).await?;
                        }
                        None => {
                            let product_url = state.store.find_product_url_by_url(&incoming.url).await?;
                            match product_url {
                                Some(url) => {
                                    let mut product = *incoming;
                                    product.url_id = url.id;
                                    product.page_index = url.page_index;
                                    product.processed = false;
                                    state.store.upsert_product(product).await?;
                                }
                                None => {
                                    state.store.set_status_state(&status.id, StatusState::Failed).await?;
                                    return Ok(());
                                }
                            }
                        }
                    }
                    state.store.set_status_state(&status.id, StatusState::Completed).await?;
                }
                _ => {
                    state.store.set_status_state(&status.id, StatusState::Failed).await?;
                }
            }
        }
        JobStatus::Failed => {
            state.store.set_status_state(&status.id, StatusState::Failed).await?;
        }
        JobStatus::Queued | JobStatus::Processing => {}
    }

    Ok(())
}

/// Shift an `hour:minute` wall-clock time in `tz` to the equivalent UTC
/// hour:minute, for building cron strings the scheduler (which runs in
/// UTC) can fire at the right real-world moment.
fn to_utc_hour_minute(hour: u32, minute: u32, tz_name: &str) -> (u32, u32) {
    let tz = chrono_tz::Tz::from_str(tz_name).unwrap_or(chrono_tz::Asia::Kolkata);
    let today = Utc::now().date_naive();
    let local_dt = tz
        .from_local_datetime(&today.and_hms_opt(hour, minute, 0).unwrap())
        .single()
        .unwrap_or_else(|| Utc::now().with_timezone(&tz));
    let utc_dt = local_dt.with_timezone(&Utc);
    (utc_dt.time().hour(), utc_dt.time().minute())
}

fn cron_expr(hour: u32, minute: u32) -> String {
    format!("0 {minute} {hour} * * *")
}

/// Register S1-S4 on the configured cadence and start the scheduler.
pub async fn start_scheduler(state: Arc<IngestorState>) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    let tz = state.config.timezone.clone();

    let (h, m) = to_utc_hour_minute(7, 0, &tz);
    let s1_morning = cron_expr(h, m);
    let (h, m) = to_utc_hour_minute(19, 0, &tz);
    let s1_evening = cron_expr(h, m);

    for expr in [s1_morning, s1_evening] {
        let state = state.clone();
        scheduler
            .add(Job::new_async(expr.as_str(), move |_uuid, _lock| {
                let state = state.clone();
                Box::pin(async move { start_scraping_listing(&state).await })
            })?)
            .await?;
    }

    let (h, m) = to_utc_hour_minute(8, 0, &tz);
    let s2_morning = cron_expr(h, m);
    let (h, m) = to_utc_hour_minute(20, 0, &tz);
    let s2_evening = cron_expr(h, m);

    for expr in [s2_morning, s2_evening] {
        let state = state.clone();
        scheduler
            .add(Job::new_async(expr.as_str(), move |_uuid, _lock| {
                let state = state.clone();
                Box::pin(async move { create_product_batches(&state).await })
            })?)
            .await?;
    }

    let (h, m) = to_utc_hour_minute(9, 0, &tz);
    let s3_morning = cron_expr(h, m);
    let (h, m) = to_utc_hour_minute(21, 0, &tz);
    let s3_evening = cron_expr(h, m);

    for expr in [s3_morning, s3_evening] {
        let state = state.clone();
        scheduler
            .add(Job::new_async(expr.as_str(), move |_uuid, _lock| {
                let state = state.clone();
                Box::pin(async move { scrape_batch(&state).await })
            })?)
            .await?;
    }

    {
        let state = state.clone();
        scheduler
            .add(Job::new_async("0 */15 * * * *", move |_uuid, _lock| {
                let state = state.clone();
                Box::pin(async move { fetch_results(&state).await })
            })?)
            .await?;
    }

    scheduler.start().await?;
    tracing::info!(timezone = %tz, "ingestor scheduler started");
    Ok(scheduler)
}
