//! # timbra-core: Pure Domain Logic for the Timbra Stamping Service
//!
//! This crate is the **heart** of Timbra. It defines the domain types, the
//! closed error taxonomy, and the boundary validation rules for issuing
//! fiscally valid invoices - with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Timbra Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/api-server (Axum)                       │   │
//! │  │    POST /invoices ──► validate ──► Coordinator.stamp()          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    timbra-engine                                │   │
//! │  │    Gateway client, compensation coordinator, reconciliation     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ timbra-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────────────────────┐ │   │
//! │  │   │   types   │  │   error   │  │        validation          │ │   │
//! │  │   │  Invoice  │  │StampError │  │  request checks,           │ │   │
//! │  │   │  Audit    │  │ rollback  │  │  ticket normalization      │ │   │
//! │  │   └───────────┘  │  scopes   │  └────────────────────────────┘ │   │
//! │  │                  └───────────┘                                  │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    timbra-db (Database Layer)                   │   │
//! │  │        SQLite queries, migrations, ledger repositories          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (StampingRequest, InvoiceRecord, AuditEntry, ...)
//! - [`error`] - The closed error taxonomy and rollback scopes
//! - [`validation`] - Boundary validation and ticket-id normalization
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Closed Results**: Gateway outcomes and failures are enums, never strings
//! 4. **Explicit Errors**: All errors are typed, never panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Public Re-exports
// =============================================================================

pub use error::{RollbackScope, StampError, StampResult, ValidationError};
pub use types::{
    AttemptState, AuditEntry, AuditOutcome, FiscalResult, FolioCounter, InvoiceRecord,
    InvoiceStatus, ReconciliationEntry, StampOutcome, StampingRequest, TicketMarker,
};
pub use validation::{is_plausible_email, normalize_ticket_id, validate_request};

// =============================================================================
// Domain Constants
// =============================================================================

/// Maximum accepted length of a branch identifier.
pub const MAX_BRANCH_ID_LEN: usize = 32;

/// Maximum accepted length of a point-of-sale ticket identifier.
pub const MAX_TICKET_ID_LEN: usize = 64;
