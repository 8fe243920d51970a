use chrono::Utc;
use fashion_ingestion_pipeline::config::Config;
use fashion_ingestion_pipeline::ingestor::scheduler;
use fashion_ingestion_pipeline::ingestor::IngestorState;
use fashion_ingestion_pipeline::models::*;
use fashion_ingestion_pipeline::store::memory::InMemoryStore;
use fashion_ingestion_pipeline::store::IngestorStore;
use std::sync::Arc;

fn test_config(agent_url: String) -> Config {
    Config {
        mongo_uri: "mongodb://localhost/unused".into(),
        mongo_dbname: "unused".into(),
        scraping_agent_api_url: agent_url,
        scraping_agent_token: "test-token".into(),
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

/// Scenario 1: fresh source, a listing walk's result turns into new
/// ProductUrls and the Listing's last_listed is set.
#[tokio::test]
async fn fresh_source_listing_to_product_urls() {
    let mut server = mockito::Server::new_async().await;

    let store = Arc::new(InMemoryStore::new());
    let state = Arc::new(IngestorState::new(store.clone(), test_config(server.url())));

    let mut source = Source::new("example".into(), "https://example.com/".into());
    let listing = Listing::new(source.id.clone(), "https://example.com/cat".into(), true);
    source.listings.push(listing.id.clone());
    source.listing_count = 1;
    store.create_source(source.clone()).await.unwrap();
    store.create_listing(listing.clone()).await.unwrap();

    let dispatch_mock = server
        .mock("POST", "/scrape")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"job_id": "job-1"}"#)
        .create_async()
        .await;

    scheduler::start_scraping_listing(&state).await;
    dispatch_mock.assert_async().await;

    let statuses = store.list_processing_statuses().await.unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].entity_id, listing.id);
    assert_eq!(statuses[0].job_id, "job-1");

    let status_mock = server
        .mock("GET", "/scrape/job-1/status/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "job_id": "job-1",
                "webpage_url": listing.url,
                "priority": "low",
                "type_page": "listing",
                "status": "completed",
                "created_at": Utc::now(),
                "completed_at": Utc::now(),
                "error_message": null,
            })
            .to_string(),
        )
        .create_async()
        .await;

    let result_mock = server
        .mock("GET", "/scrape/job-1/result/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "job_id": "job-1",
                "status": "completed",
                "completed_at": Utc::now(),
                "error_message": null,
                "result": {
                    "kind": "Listing",
                    "items": [
                        {"url": "https://example.com/p/u1", "page_rank": 1},
                        {"url": "https://example.com/p/u2", "page_rank": 2},
                    ]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    scheduler::fetch_results(&state).await;
    status_mock.assert_async().await;
    result_mock.assert_async().await;

    let urls = store.list_unbatched_product_urls().await.unwrap();
    assert_eq!(urls.len(), 2);
    let mut ranks: Vec<i64> = urls.iter().map(|u| u.page_index).collect();
    ranks.sort();
    assert_eq!(ranks, vec![1, 2]);

    let refreshed_listing = store.get_listing(&listing.id).await.unwrap();
    assert!(refreshed_listing.last_listed.is_some());

    let statuses = store.list_processing_statuses().await.unwrap();
    assert!(statuses.is_empty());
}

/// Scenario 2: 250 unbatched ProductUrls with MAX_BATCH_SIZE=100 split
/// into batches of 100, 100, 50.
#[tokio::test]
async fn batching_splits_into_bounded_chunks() {
    let server = mockito::Server::new_async().await;
    let store = Arc::new(InMemoryStore::new());
    let state = IngestorState::new(store.clone(), test_config(server.url()));

    let source = Source::new("example".into(), "https://example.com".into());
    let listing = Listing::new(source.id.clone(), "https://example.com/cat".into(), true);
    store.create_source(source.clone()).await.unwrap();
    store.create_listing(listing.clone()).await.unwrap();

    for i in 0..250 {
        let url = ProductUrl::new(format!("https://example.com/p/{i}"), source.id.clone(), listing.id.clone(), i);
        store.create_product_url(url).await.unwrap();
    }

    scheduler::create_product_batches(&state).await;

    let batches = store.oldest_unprocessed_batches(10).await.unwrap();
    let mut batch_sizes: Vec<i64> = batches.iter().map(|b| b.batch_size).collect();
    batch_sizes.sort();
    assert_eq!(batch_sizes, vec![50, 100, 100]);

    let remaining_unbatched = store.list_unbatched_product_urls().await.unwrap();
    assert!(remaining_unbatched.is_empty());
}

/// Scenario 3: an existing under-capacity batch is filled before a new
/// batch is created.
#[tokio::test]
async fn partial_batch_is_filled_before_creating_a_new_one() {
    let server = mockito::Server::new_async().await;
    let store = Arc::new(InMemoryStore::new());
    let state = IngestorState::new(store.clone(), test_config(server.url()));

    let source = Source::new("example".into(), "https://example.com".into());
    let listing = Listing::new(source.id.clone(), "https://example.com/cat".into(), true);
    store.create_source(source.clone()).await.unwrap();
    store.create_listing(listing.clone()).await.unwrap();

    let mut existing_batch = Batch::new();
    for i in 0..40 {
        let mut url = ProductUrl::new(format!("https://example.com/existing/{i}"), source.id.clone(), listing.id.clone(), i);
        url.batched = true;
        url.batch_id = Some(existing_batch.id.clone());
        existing_batch.urls.push(url.id.clone());
        store.create_product_url(url).await.unwrap();
    }
    existing_batch.batch_size = 40;
    store.create_batch(existing_batch.clone()).await.unwrap();

    for i in 0..30 {
        let url = ProductUrl::new(format!("https://example.com/new/{i}"), source.id.clone(), listing.id.clone(), i);
        store.create_product_url(url).await.unwrap();
    }

    scheduler::create_product_batches(&state).await;

    let grown = store.get_batch(&existing_batch.id).await.unwrap();
    assert_eq!(grown.batch_size, 70);

    let batches = store.oldest_unprocessed_batches(10).await.unwrap();
    assert_eq!(batches.len(), 1);
}

/// Scenario 5: additive update never clobbers a present field with an
/// absent one.
#[tokio::test]
async fn additive_update_preserves_existing_rating() {
    let server = mockito::Server::new_async().await;
    let store = Arc::new(InMemoryStore::new());
    let state = Arc::new(IngestorState::new(store.clone(), test_config(server.url())));

    let existing = Product {
        id: "amzn_X".into(),
        url_id: "u1".into(),
        title: Some("Shoe".into()),
        price: Some(500.0),
        category: None,
        gender: None,
        url: "https://example.com/p/amzn_X".into(),
        image_url: None,
        colors: vec![],
        sizes: vec![],
        material: None,
        description: None,
        rating: Some(4.0),
        review_count: Some(10),
        processed: false,
        scraped_at: Utc::now(),
        processed_at: None,
        page_index: 1,
        page_content: None,
    };
    store.upsert_product(existing.clone()).await.unwrap();

    let status = Status::new(IngestionType::Product, "job-p1".into(), "u1".into());
    store.create_status(status.clone()).await.unwrap();

    let status_mock = server
        .mock("GET", "/scrape/job-p1/status/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "job_id": "job-p1",
                "webpage_url": existing.url,
                "priority": "high",
                "type_page": "product",
                "status": "completed",
                "created_at": Utc::now(),
                "completed_at": Utc::now(),
                "error_message": null,
            })
            .to_string(),
        )
        .create_async()
        .await;

    let result_mock = server
        .mock("GET", "/scrape/job-p1/result/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "job_id": "job-p1",
                "status": "completed",
                "completed_at": Utc::now(),
                "error_message": null,
                "result": {
                    "kind": "Product",
                    "id": "amzn_X",
                    "url_id": "",
                    "title": null,
                    "price": 999.0,
                    "category": null,
                    "gender": null,
                    "url": existing.url,
                    "image_url": null,
                    "colors": [],
                    "sizes": [],
                    "material": null,
                    "description": null,
                    "rating": null,
                    "review_count": null,
                    "processed": false,
                    "scraped_at": Utc::now(),
                    "processed_at": null,
                    "page_index": 0,
                    "page_content": null,
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    scheduler::fetch_results(&state).await;
    status_mock.assert_async().await;
    result_mock.assert_async().await;

    let updated = store.get_product("amzn_X").await.unwrap().unwrap();
    assert_eq!(updated.price, Some(999.0));
    assert_eq!(updated.rating, Some(4.0));
}
