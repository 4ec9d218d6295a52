//! # Repository Module
//!
//! Database repository implementations for the Timbra ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Compensation Coordinator                                              │
//! │       │                                                                 │
//! │       │  db.folios().reserve("182")                                    │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  FolioRepository                                                       │
//! │  ├── provision(&self, branch_id, initial_folio)                        │
//! │  ├── reserve(&self, branch_id)                                         │
//! │  └── release(&self, branch_id, folio)                                  │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • The coordinator sees operations, not SQL                            │
//! │  • Atomic primitives live in exactly one place                         │
//! │  • Tests run against an isolated in-memory ledger                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`folio::FolioRepository`] - Atomic folio reserve/release
//! - [`ticket::TicketRepository`] - Ticket dedup guard
//! - [`invoice::InvoiceRepository`] - Stamped invoice ledger
//! - [`audit::AuditRepository`] - Append-only attempt log
//! - [`reconcile::ReconciliationRepository`] - Stamped-but-unpersisted queue

pub mod audit;
pub mod folio;
pub mod invoice;
pub mod reconcile;
pub mod ticket;
