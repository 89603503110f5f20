//! HTTP route handlers for the gate.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::state::AppState;

mod captcha;
mod health;
mod response;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.http.request_timeout_secs);
    let body_limit = state.config.http.max_body_bytes;

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/metrics", get(health::metrics))

        // Captcha endpoints
        .route("/captcha", post(captcha::issue_challenge))
        .route("/captcha/verify", post(captcha::verify_challenge))

        // Trajectories are small; the body limit bounds verifier work
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())

        // Add shared state
        .with_state(state)
}
