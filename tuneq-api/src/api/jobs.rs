//! Read-only job inspection
//!
//! `GET /music/jobs` lists recent records, `GET /music/jobs/:key` returns one.
//! The path segment is normalized the same way as a request query.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::models::JobRecord;
use crate::normalize::normalize;
use crate::AppState;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
}

/// GET /music/jobs?limit=N
pub async fn list_jobs(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Vec<JobRecord>>> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let jobs = state.dispatcher.store().list_recent(limit).await?;
    Ok(Json(jobs))
}

/// GET /music/jobs/:key
pub async fn get_job(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    let key = normalize(&raw_key)?;
    state
        .dispatcher
        .store()
        .find(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no job for key: {}", key)))
}

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/music/jobs", get(list_jobs))
        .route("/music/jobs/:key", get(get_job))
}
