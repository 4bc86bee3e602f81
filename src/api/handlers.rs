use axum::{Json, extract::State as AxumState, response::IntoResponse};
use serde_json::json;

use crate::SharedState;

/// Root health check endpoint
pub async fn root(AxumState(state): AxumState<SharedState>) -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
        "started_at": state.started_at,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "topic": state.gateway.config().topic,
    }))
}
