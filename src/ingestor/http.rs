//! Ingestor admin HTTP API: session-authenticated CRUD over Sources and
//! Listings, plus the four trigger endpoints that run S1-S4 on demand.

use super::scheduler;
use super::IngestorState;
use crate::error::ApiError;
use crate::models::{Listing, Source};
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const COOKIE_NAME: &str = "ingestor_session";
const SESSION_DURATION_SECS: i64 = 7 * 24 * 3600;

fn session_secret(state: &IngestorState) -> &str {
    if state.config.session_secret.is_empty() {
        &state.config.admin_password
    } else {
        &state.config.session_secret
    }
}

fn sign(payload: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn create_session_cookie(secret: &str) -> String {
    let expiry = chrono::Utc::now().timestamp() + SESSION_DURATION_SECS;
    let payload = format!("admin|{expiry}");
    let signature = sign(&payload, secret);
    format!("{COOKIE_NAME}={payload}|{signature}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_DURATION_SECS}")
}

fn verify_session(value: &str, secret: &str) -> bool {
    let mut parts = value.splitn(3, '|');
    let (Some(user), Some(expiry_str), Some(signature)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let payload = format!("{user}|{expiry_str}");
    if sign(&payload, secret) != signature {
        return false;
    }
    let Ok(expiry) = expiry_str.parse::<i64>() else {
        return false;
    };
    expiry > chrono::Utc::now().timestamp()
}

fn parse_cookie(header_value: &str, name: &str) -> Option<String> {
    header_value.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix(&format!("{name}="))
            .map(|rest| rest.to_string())
    })
}

/// Authenticated admin session, extracted from a signed cookie.
pub struct AdminSession;

impl FromRequestParts<Arc<IngestorState>> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<IngestorState>) -> Result<Self, Self::Rejection> {
        let cookie_header = parts
            .headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let session_value = parse_cookie(cookie_header, COOKIE_NAME).ok_or(ApiError::Unauthorized)?;
        if verify_session(&session_value, session_secret(state)) {
            Ok(AdminSession)
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

pub fn router(state: Arc<IngestorState>) -> Router {
    Router::new()
        .route("/admin/login", post(login))
        .route("/api/sources", get(list_sources).post(create_source))
        .route("/api/sources/{id}", delete(delete_source))
        .route("/api/sources/{id}/listings", post(add_listing))
        .route("/api/listings/{id}", delete(delete_listing))
        .route("/api/trigger-listing-scrape", post(trigger_listing_scrape))
        .route("/api/trigger-batch-create", post(trigger_batch_create))
        .route("/api/trigger-batch-scrape", post(trigger_batch_scrape))
        .route("/api/trigger-status-update", post(trigger_status_update))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    password: String,
}

async fn login(
    State(state): State<Arc<IngestorState>>,
    Json(request): Json<LoginRequest>,
) -> Result<([(header::HeaderName, String); 1], StatusCode), ApiError> {
    if request.password != state.config.admin_password {
        return Err(ApiError::Unauthorized);
    }
    let cookie = create_session_cookie(session_secret(&state));
    Ok(([(header::SET_COOKIE, cookie)], StatusCode::OK))
}

async fn list_sources(
    _session: AdminSession,
    State(state): State<Arc<IngestorState>>,
) -> Result<Json<Vec<Source>>, ApiError> {
    Ok(Json(state.store.list_sources().await?))
}

#[derive(Debug, Deserialize)]
struct CreateSourceRequest {
    name: String,
    base_url: String,
}

async fn create_source(
    _session: AdminSession,
    State(state): State<Arc<IngestorState>>,
    Json(request): Json<CreateSourceRequest>,
) -> Result<Json<Source>, ApiError> {
    let source = Source::new(request.name, request.base_url);
    state.store.create_source(source.clone()).await?;
    Ok(Json(source))
}

async fn delete_source(
    _session: AdminSession,
    State(state): State<Arc<IngestorState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let source = state.store.get_source(&id).await?;
    if !source.listings.is_empty() {
        return Err(ApiError::BadRequest(
            "source has listings; remove them before deleting the source".to_string(),
        ));
    }
    state.store.delete_source(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct CreateListingRequest {
    url: String,
}

async fn add_listing(
    _session: AdminSession,
    State(state): State<Arc<IngestorState>>,
    Path(source_id): Path<String>,
    Json(request): Json<CreateListingRequest>,
) -> Result<Json<Listing>, ApiError> {
    let source = state.store.get_source(&source_id).await?;
    let listing = Listing::new(source.id.clone(), request.url, source.active);
    state.store.create_listing(listing.clone()).await?;
    state.store.add_listing_to_source(&source.id, &listing.id).await?;
    Ok(Json(listing))
}

async fn delete_listing(
    _session: AdminSession,
    State(state): State<Arc<IngestorState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let listing = state.store.get_listing(&id).await?;
    state
        .store
        .remove_listing_from_source(&listing.source_id, &listing.id)
        .await?;
    state.store.delete_listing(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn trigger_listing_scrape(_session: AdminSession, State(state): State<Arc<IngestorState>>) -> StatusCode {
    scheduler::start_scraping_listing(&state).await;
    StatusCode::ACCEPTED
}

async fn trigger_batch_create(_session: AdminSession, State(state): State<Arc<IngestorState>>) -> StatusCode {
    scheduler::create_product_batches(&state).await;
    StatusCode::ACCEPTED
}

async fn trigger_batch_scrape(_session: AdminSession, State(state): State<Arc<IngestorState>>) -> StatusCode {
    scheduler::scrape_batch(&state).await;
    StatusCode::ACCEPTED
}

async fn trigger_status_update(_session: AdminSession, State(state): State<Arc<IngestorState>>) -> StatusCode {
    scheduler::fetch_results(&state).await;
    StatusCode::ACCEPTED
}
