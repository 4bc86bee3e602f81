//! HTTP surface of the gateway.

pub mod handlers;
pub mod webhook;

use axum::{Router, extract::DefaultBodyLimit, routing};

use crate::SharedState;

pub fn router(state: SharedState) -> Router {
    let body_limit = state.gateway.config().gateway.max_body_bytes;
    Router::new()
        .route("/", routing::get(handlers::root))
        .route(
            "/webhook",
            routing::post(webhook::handle_webhook).layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}
