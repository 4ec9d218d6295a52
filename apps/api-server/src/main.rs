//! # Timbra API Server
//!
//! HTTP boundary for the fiscal invoice stamping service.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Timbra API Server                                │
//! │                                                                         │
//! │  POS client ───► axum ───► Coordinator ───► SQLite ledger              │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │                     Stamping provider (HTTP)                            │
//! │                     Partner API + email relay (best-effort)             │
//! │                                                                         │
//! │  Background: ReconcileProcessor drains stamped-but-unpersisted         │
//! │  invoices into the ledger.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use timbra_api::config::ServerConfig;
use timbra_api::{router, AppState};
use timbra_db::{Database, DbConfig};
use timbra_engine::{
    Coordinator, HttpNotifier, HttpStampingGateway, ReconcileProcessor, TextRenderer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Timbra API server...");

    // Load configuration
    let config = ServerConfig::load()?;
    info!(
        port = config.port,
        database_path = %config.database_path,
        "Configuration loaded"
    );

    // Open the ledger (runs migrations)
    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    info!("Ledger database ready");

    // External collaborators
    let gateway = Arc::new(HttpStampingGateway::new(
        config.engine.provider.clone(),
        config.engine.call_timeout,
    )?);
    let notifier = Arc::new(HttpNotifier::new(
        config.engine.partner.clone(),
        config.engine.email.clone(),
        config.engine.call_timeout,
    )?);

    // The coordinator: constructed once, injected everywhere
    let coordinator = Arc::new(Coordinator::new(
        db.clone(),
        gateway,
        notifier,
        Arc::new(TextRenderer),
        config.engine.clone(),
    ));

    // Background reconciliation drain
    let (processor, reconcile_handle) = ReconcileProcessor::new(
        db.clone(),
        config.engine.reconcile_poll_interval,
        config.engine.reconcile_batch_size,
    );
    tokio::spawn(processor.run());

    // HTTP surface
    let state = AppState {
        db: db.clone(),
        coordinator,
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Orderly teardown
    reconcile_handle.shutdown().await;
    db.close().await;
    info!("Server stopped");

    Ok(())
}

/// Resolves when the process receives Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}
