//! # Timbra API Server Library
//!
//! Application state and router assembly for the stamping API.
//!
//! ## Routes
//! ```text
//! POST /invoices               run one stamping attempt
//! POST /invoices/{uuid}/cancel cancellation flow
//! GET  /invoices/count         issued-invoice count (optional ?branchId=)
//! POST /folios                 provision a branch folio counter
//! GET  /health                 liveness + database reachability
//! ```

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use timbra_db::Database;
use timbra_engine::Coordinator;

pub mod config;
pub mod error;
pub mod handlers;

/// Shared state injected into every handler.
///
/// Built once in `main`; handlers receive only what they need via
/// `State<AppState>` extraction.
#[derive(Clone)]
pub struct AppState {
    /// Ledger database handle.
    pub db: Database,

    /// The compensation coordinator.
    pub coordinator: Arc<Coordinator>,
}

/// Assembles the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/invoices", post(handlers::stamp_invoice))
        .route("/invoices/count", get(handlers::invoice_count))
        .route("/invoices/{uuid}/cancel", post(handlers::cancel_invoice))
        .route("/folios", post(handlers::provision_folio))
        .with_state(state)
}
