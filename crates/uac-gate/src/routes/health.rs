//! Health check endpoints.

use axum::{Json, extract::State, response::Response};
use serde::Serialize;

use super::response::failure;
use crate::captcha::StatsSnapshot;
use crate::state::AppState;
use uac_common::UacError;
use uac_common::constants::messages;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    store: &'static str,
}

/// Readiness check (is the challenge store reachable?)
pub async fn ready_check(State(state): State<AppState>) -> Result<Json<ReadyResponse>, Response> {
    if let Err(e) = state.store.ping().await {
        return Err(failure(
            &UacError::Redis(format!("{e:#}")),
            messages::STORE_UNAVAILABLE,
        ));
    }

    Ok(Json(ReadyResponse {
        status: "ready",
        store: state.store.backend_name(),
    }))
}

#[derive(Serialize)]
pub struct MetricsResponse {
    store: &'static str,
    captcha: StatsSnapshot,
}

/// Metrics endpoint (for monitoring)
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        store: state.store.backend_name(),
        captcha: state.stats.snapshot(),
    })
}
