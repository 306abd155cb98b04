//! Main Entrypoint for the ATC API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Wiring the text generator, if enabled, into the controller.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use atc_api::{config::Config, router::create_router, state::AppState};
use atc_core::{
    AtcController, PhaseChange,
    llm_client::{OpenAiCompatibleGenerator, TextGeneration},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Logs phase changes as they are committed.
async fn log_phase_changes(mut rx: mpsc::Receiver<PhaseChange>) {
    while let Some(change) = rx.recv().await {
        info!(
            callsign = %change.callsign,
            from = %change.from,
            to = %change.to,
            source = ?change.source,
            "Flight phase updated"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing controller...");

    // --- 3. Initialize the Controller ---
    let generation = if config.llm_enabled {
        info!(base_url = %config.llm_base_url, model = %config.llm_model, "Using text generator.");
        TextGeneration::available(OpenAiCompatibleGenerator::new(config.generator_settings()))
    } else {
        info!("Text generator disabled. Replies will use templates.");
        TextGeneration::Unavailable
    };

    let (phase_tx, phase_rx) = mpsc::channel(64);
    tokio::spawn(log_phase_changes(phase_rx));

    let controller = AtcController::new(generation, config.controller_settings())
        .with_phase_updates(phase_tx);
    if config.llm_enabled && !controller.generator_available().await {
        warn!("Text generator is not reachable yet. Falling back to templates until it is.");
    }

    let app_state = Arc::new(AppState {
        controller: Arc::new(controller),
        config: Arc::new(config.clone()),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        phraseology = %config.phraseology,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
