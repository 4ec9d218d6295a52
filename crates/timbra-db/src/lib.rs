//! # timbra-db: Database Layer for Timbra
//!
//! This crate provides database access for the Timbra stamping service.
//! It uses SQLite for the local ledger with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Timbra Data Flow                                 │
//! │                                                                         │
//! │  Coordinator.stamp(request)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     timbra-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (folio.rs,    │    │  (embedded)  │  │   │
//! │  │   │               │    │  ticket.rs,   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│  invoice.rs,  │    │ 001_init.sql │  │   │
//! │  │   │ Connection    │    │  audit.rs,    │    │              │  │   │
//! │  │   │ Management    │    │  reconcile.rs)│    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (the one authority for cross-request coordination:    │
//! │  atomic increment-and-fetch, unique-constrained inserts)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (folio, ticket, ...)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use timbra_db::{Database, DbConfig};
//!
//! let config = DbConfig::new("path/to/ledger.db");
//! let db = Database::new(config).await?;
//!
//! db.folios().provision("182", 999).await?;
//! let folio = db.folios().reserve("182").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::audit::AuditRepository;
pub use repository::folio::FolioRepository;
pub use repository::invoice::InvoiceRepository;
pub use repository::reconcile::ReconciliationRepository;
pub use repository::ticket::TicketRepository;
