//! Agent HTTP surface: job submission, status, and result endpoints,
//! all behind bearer-token auth.

use super::AgentState;
use crate::error::ApiError;
use crate::models::{Job, JobResult, JobStatus, Priority, TypePage};
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::header;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

pub struct BearerAuth;

impl FromRequestParts<Arc<AgentState>> for BearerAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AgentState>) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = header_value.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;
        if token == state.config.scraping_agent_token {
            Ok(BearerAuth)
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

pub fn router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/scrape", post(submit_scrape))
        .route("/scrape/{job_id}/status/", get(job_status))
        .route("/scrape/{job_id}/result/", get(job_result))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ScrapeRequest {
    webpage_url: String,
    priority: String,
    type_page: String,
}

async fn submit_scrape(
    _auth: BearerAuth,
    State(state): State<Arc<AgentState>>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let priority = Priority::parse(&request.priority)
        .ok_or_else(|| ApiError::BadRequest(format!("bad priority: {}", request.priority)))?;
    let type_page = TypePage::parse(&request.type_page)
        .ok_or_else(|| ApiError::BadRequest(format!("bad type_page: {}", request.type_page)))?;

    let job = Job::new(request.webpage_url, priority, type_page);
    let job_id = job.job_id.clone();

    state
        .store
        .create_job(job.clone())
        .await
        .map_err(anyhow::Error::from)?;

    state
        .queues
        .submit(job)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("queue submit failed: {e}")))?;

    Ok(Json(serde_json::json!({ "job_id": job_id })))
}

async fn job_status(
    _auth: BearerAuth,
    State(state): State<Arc<AgentState>>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state.store.get_job(&job_id).await?;
    Ok(Json(job))
}

async fn job_result(
    _auth: BearerAuth,
    State(state): State<Arc<AgentState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResult>, ApiError> {
    let job = state.store.get_job(&job_id).await?;
    if job.status != JobStatus::Completed && job.status != JobStatus::Failed {
        return Err(ApiError::NotFound(format!("job {job_id} not terminal")));
    }
    let result = state
        .store
        .get_job_result(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("result for job {job_id}")))?;
    Ok(Json(result))
}

