//! # timbra-engine: Stamping Engine for Timbra
//!
//! This crate owns every external side effect of a stamping attempt and the
//! compensation rules that keep the local ledger consistent with the
//! provider's legally one-way stamp.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Stamping Engine Architecture                      │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  Coordinator (Main Orchestrator)                 │  │
//! │  │                                                                  │  │
//! │  │  One call per stamping request, injected into the API server    │  │
//! │  │  Reserve → Claim → Stamp → Persist → Audit → Notify             │  │
//! │  │  Any failure before Stamped compensates exactly what it took    │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ StampingGateway│  │ InvoiceNotifier│  │  ReconcileProcessor    │    │
//! │  │                │  │                │  │                        │    │
//! │  │ authenticate   │  │ Partner API +  │  │ Background drain for   │    │
//! │  │ issue / cancel │  │ email relay,   │  │ stamped-but-           │    │
//! │  │ per-call HTTP  │  │ best-effort    │  │ unpersisted invoices   │    │
//! │  │ timeouts       │  │ only           │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐                                │
//! │  │ AttemptDeadline│  │  EngineConfig  │                                │
//! │  │                │  │                │                                │
//! │  │ One wall-clock │  │ env-based      │                                │
//! │  │ budget per     │  │ settings,      │                                │
//! │  │ attempt        │  │ validated      │                                │
//! │  └────────────────┘  └────────────────┘                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod deadline;
pub mod gateway;
pub mod notify;
pub mod reconcile;
pub mod render;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, EmailSettings, EngineConfig, PartnerSettings, ProviderSettings};
pub use coordinator::{Coordinator, StampedInvoice};
pub use deadline::AttemptDeadline;
pub use gateway::{BearerToken, HttpStampingGateway, StampingGateway};
pub use notify::{HttpNotifier, InvoiceNotifier};
pub use reconcile::{ReconcileProcessor, ReconcileProcessorHandle};
pub use render::{DocumentRenderer, TextRenderer};
