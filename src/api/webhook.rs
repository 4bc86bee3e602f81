//! Webhook handler for GitHub push events

use axum::{
    Json,
    body::Bytes,
    extract::State as AxumState,
    http::HeaderMap,
    response::IntoResponse,
};

use crate::SharedState;

/// Handles the GitHub webhook POST request.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let response = state.gateway.handle(&headers, body).await;
    (response.status, Json(response))
}
