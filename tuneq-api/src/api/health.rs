//! Liveness and health endpoints

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Body of the root liveness check
#[derive(Debug, Serialize)]
pub struct AliveResponse {
    pub status: &'static str,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("tuneq-api")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Short git hash, build timestamp and profile
    pub build: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Pipeline attempts currently running
    pub jobs_in_flight: usize,
}

/// GET / and HEAD /
pub async fn alive() -> Json<AliveResponse> {
    Json(AliveResponse { status: "alive" })
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "tuneq-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: build_info(),
        uptime_seconds,
        jobs_in_flight: state.dispatcher.executor().in_flight(),
    })
}

fn build_info() -> String {
    format!(
        "{} ({}, {})",
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    )
}

/// Build liveness and health routes
pub fn health_routes() -> Router<AppState> {
    // axum answers HEAD with the GET handler minus the body; OPTIONS is
    // answered by the CORS layer
    Router::new()
        .route("/", get(alive))
        .route("/health", get(health_check))
}
