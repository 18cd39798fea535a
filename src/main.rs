//! gherkinrs server - HTTP API for Gherkin generation

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gherkinrs::api::{self, AppState};
use gherkinrs::cli::Cli;
use gherkinrs::gateway::InferenceGateway;
use gherkinrs::inference::LlamaEngine;
use gherkinrs::storage::settings::load_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gherkinrs=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate();

    info!("Starting gherkinrs");
    info!("Model: {}", config.model_path.display());

    let engine = LlamaEngine::new(config.model_path.clone()).with_verbose(config.verbose);
    let gateway = InferenceGateway::new(Arc::new(engine), config.generation.clone());

    if config.preload {
        gateway.warm_up().await?;
        info!("Model ready");
    } else {
        warn!("Lazy loading enabled, the first request will load the model");
    }

    let state = AppState::new(gateway, config.max_concurrent, config.request_timeout_secs);
    let app = api::create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}
