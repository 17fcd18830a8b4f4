// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pulse-Relay API Server
//!
//! Polls a biometric provider for each connected user and relays readings to
//! an analytics sink and to the user's live dashboards.

use pulse_relay::{
    config::{Config, StoreBackend},
    db::{CredentialStore, FirestoreDb, MemoryStore},
    services::{ProviderClient, SinkClient, TokenCipher},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Pulse-Relay API");

    // Initialize credential store
    let store: Arc<dyn CredentialStore> = match config.credential_store {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory credential store; records are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let cipher = TokenCipher::from_secret(&config.token_encryption_key)?;
    tracing::info!("Token encryption initialized");

    let provider = Arc::new(ProviderClient::new(&config)?);
    let sink = Arc::new(SinkClient::new(&config)?);

    // Build shared state
    let state = Arc::new(AppState::build(
        config.clone(),
        store,
        cipher,
        provider.clone(),
        provider,
        sink,
    ));

    // Resume schedules that were enabled before the restart
    if config.resume_polling_on_startup {
        match state.account.resume_enabled_schedules().await {
            Ok(count) => tracing::info!(count, "Resumed polling schedules"),
            Err(e) => tracing::error!(error = %e, "Failed to resume polling schedules"),
        }
    } else {
        tracing::info!("RESUME_POLLING_ON_STARTUP disabled, not resuming schedules");
    }

    // Build router
    let app = pulse_relay::routes::create_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.scheduler.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM (Cloud Run sends SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pulse_relay=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
