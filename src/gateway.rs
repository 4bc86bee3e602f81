//! Synchronous entry point: authenticate, then republish onto the bus.
//!
//! The gateway never clones or builds anything; it only decides whether a
//! payload is allowed onto the bus and reports that decision to the caller.

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::bus::{EventPublisher, MessageId};
use crate::config::RelayConfig;
use crate::error::AuthError;
use crate::payload;
use crate::signature::{SIGNATURE_HEADER, verify_signature};

/// Body returned to the webhook sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayResponse {
    #[serde(skip)]
    pub status: StatusCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

impl GatewayResponse {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            message_id: None,
        }
    }

    fn accepted(id: MessageId) -> Self {
        Self {
            status: StatusCode::OK,
            message: "Event submitted.".to_string(),
            message_id: Some(id),
        }
    }
}

pub struct Gateway {
    config: Arc<RelayConfig>,
    publisher: Arc<dyn EventPublisher>,
}

impl Gateway {
    pub fn new(config: Arc<RelayConfig>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { config, publisher }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub async fn handle(&self, headers: &HeaderMap, body: Bytes) -> GatewayResponse {
        info!("Processing event ...");

        let signature = match headers.get(SIGNATURE_HEADER).map(|v| v.to_str()) {
            None => None,
            Some(Ok(value)) => Some(value),
            Some(Err(_)) => return unauthorized(AuthError::MalformedHeader),
        };
        if let Err(e) = verify_signature(self.config.secret.expose(), signature, &body) {
            return unauthorized(e);
        }

        if self.config.gateway.validate_before_publish {
            if let Err(e) = payload::parse(&body, self.config.payload.revision) {
                error!("{}", e);
                return GatewayResponse::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        }

        match self.publisher.publish(body).await {
            Ok(id) => {
                info!("Event submitted. Message id: {}.", id);
                GatewayResponse::accepted(id)
            }
            Err(e) => {
                let message = format!("Failed to publish event: {}", e);
                error!("{}", message);
                GatewayResponse::new(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

fn unauthorized(reason: AuthError) -> GatewayResponse {
    warn!("Webhook signature rejected: {}", reason);
    GatewayResponse::new(StatusCode::UNAUTHORIZED, reason.to_string())
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
