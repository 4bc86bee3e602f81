use pipeline_relay::api;
use pipeline_relay::bus::{EventPublisher, InMemoryBus};
use pipeline_relay::config::RelayConfig;
use pipeline_relay::error::RelayError;
use pipeline_relay::logging::{FileLogger, LOG_DIR_ENV, setup_logging};
use pipeline_relay::runner::ProcessRunner;
use pipeline_relay::{AppState, Gateway, Worker};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), RelayError> {
    let config = Arc::new(RelayConfig::from_env()?);

    let file_logger = std::env::var(LOG_DIR_ENV)
        .ok()
        .map(|dir| FileLogger::new(PathBuf::from(dir)));
    let _log_guard = setup_logging(file_logger.as_ref())?;

    let bus = Arc::new(InMemoryBus::from_config(config.topic.clone(), &config.bus));
    let subscription = bus
        .subscribe()
        .ok_or_else(|| RelayError::Config("event bus already has a subscriber".into()))?;

    let worker = Worker::new(config.clone(), Arc::new(ProcessRunner))?;
    let worker_task = tokio::spawn(async move { worker.run(subscription).await });

    let publisher: Arc<dyn EventPublisher> = bus;
    let state = Arc::new(AppState::new(Gateway::new(config.clone(), publisher)));
    let app = api::router(state);

    info!("Listening on {}", config.bind_address);
    info!("Publishing to topic '{}'", config.topic);
    if let Some(path) = &config.config_path {
        info!("Using config at {:?}", path);
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router, and with it the last publisher, is gone: the worker drains
    // what is queued and stops.
    info!("Waiting for queued jobs to finish");
    if let Err(e) = worker_task.await {
        error!("Worker task failed: {}", e);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
