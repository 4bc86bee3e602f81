pub mod api;
pub mod bus;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod payload;
pub mod pipeline;
pub mod runner;
pub mod signature;
pub mod source;
pub mod worker;
pub mod workspace;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

pub use config::RelayConfig;
pub use gateway::Gateway;
pub use worker::Worker;

/// State shared by the HTTP handlers.
pub struct AppState {
    pub gateway: Gateway,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
