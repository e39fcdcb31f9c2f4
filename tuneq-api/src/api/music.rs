//! `POST /music`
//!
//! Answers immediately with the cached URL, `processing`, or `error`. Work
//! for a newly claimed query continues in the background.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::workflow::DispatchOutcome;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MusicRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MusicResponse {
    Cached { file_url: String },
    Processing,
    Error,
}

impl From<DispatchOutcome> for MusicResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Cached { file_url } => MusicResponse::Cached { file_url },
            DispatchOutcome::Processing | DispatchOutcome::Started => MusicResponse::Processing,
            DispatchOutcome::Failed => MusicResponse::Error,
        }
    }
}

/// POST /music
///
/// Body rejections (bad JSON, wrong content type) are rendered like every
/// other API error instead of axum's plain-text default.
pub async fn request_music(
    State(state): State<AppState>,
    request: Result<Json<MusicRequest>, JsonRejection>,
) -> ApiResult<Json<MusicResponse>> {
    let Json(request) = request.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let query = request.query.unwrap_or_default();
    let outcome = state.dispatcher.handle(&query).await?;
    Ok(Json(outcome.into()))
}

pub fn music_routes() -> Router<AppState> {
    Router::new().route("/music", post(request_music))
}
