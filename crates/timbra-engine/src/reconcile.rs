//! # Reconciliation Processor
//!
//! Drains the reconciliation queue: stamped invoices whose local insert
//! failed get re-inserted until they land.
//!
//! ## Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Reconciliation Processor Flow                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  reconciliation_queue Table                     │   │
//! │  │                                                                 │   │
//! │  │  id | ticket_id | payload | attempts | last_error | resolved_at│   │
//! │  │  ───┼───────────┼─────────┼──────────┼────────────┼────────────│   │
//! │  │  a  │ T-1       │ {...}   │ 0        │ NULL       │ NULL       │   │
//! │  │  b  │ T-7       │ {...}   │ 3        │ disk full  │ NULL       │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  ReconcileProcessor                             │   │
//! │  │                                                                 │   │
//! │  │  1. Poll: pending(batch_size), skip past-max-attempt entries   │   │
//! │  │  2. Decode: payload → InvoiceRecord                            │   │
//! │  │  3. Insert: invoices.insert(record)                            │   │
//! │  │     • Ok              → mark_resolved                          │   │
//! │  │     • UniqueViolation → mark_resolved (already landed)         │   │
//! │  │     • other error     → mark_failed (attempts += 1)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  TIMING:                                                               │
//! │  • Poll interval: configurable (default 30 seconds)                    │
//! │  • Max attempts: 20 (then logged and skipped)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use timbra_core::InvoiceRecord;
use timbra_db::Database;

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of re-insert attempts before an entry is skipped.
const MAX_RECONCILE_ATTEMPTS: i64 = 20;

// =============================================================================
// Reconcile Processor
// =============================================================================

/// Background drain for the reconciliation queue.
pub struct ReconcileProcessor {
    /// Database connection.
    db: Database,

    /// Poll interval between passes.
    poll_interval: Duration,

    /// Maximum entries per pass.
    batch_size: u32,

    /// Shutdown receiver.
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the processor.
#[derive(Clone)]
pub struct ReconcileProcessorHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ReconcileProcessorHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl ReconcileProcessor {
    /// Creates a new processor and returns a handle.
    pub fn new(
        db: Database,
        poll_interval: Duration,
        batch_size: u32,
    ) -> (Self, ReconcileProcessorHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let processor = ReconcileProcessor {
            db,
            poll_interval,
            batch_size,
            shutdown_rx,
        };

        (processor, ReconcileProcessorHandle { shutdown_tx })
    }

    /// Runs the processor loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Reconciliation processor starting");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.process_pending().await {
                        error!(error = %e, "Reconciliation pass failed");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Reconciliation processor shutting down");
                    break;
                }
            }
        }

        info!("Reconciliation processor stopped");
    }

    /// Runs one pass over the pending entries.
    ///
    /// ## Returns
    /// Number of entries resolved in this pass.
    pub async fn process_pending(&self) -> timbra_db::DbResult<usize> {
        let entries = self.db.reconciliation().pending(self.batch_size).await?;

        if entries.is_empty() {
            debug!("No pending reconciliation entries");
            return Ok(0);
        }

        info!(count = entries.len(), "Processing reconciliation entries");

        let mut resolved = 0usize;

        for entry in entries {
            if entry.attempts >= MAX_RECONCILE_ATTEMPTS {
                warn!(
                    id = %entry.id,
                    ticket_id = %entry.ticket_id,
                    attempts = entry.attempts,
                    "Skipping entry that exceeded max reconcile attempts"
                );
                continue;
            }

            let record: InvoiceRecord = match serde_json::from_str(&entry.payload) {
                Ok(record) => record,
                Err(e) => {
                    // A payload that no longer decodes will never insert;
                    // count the attempt so the entry eventually ages out.
                    error!(id = %entry.id, error = %e, "Undecodable reconciliation payload");
                    self.db
                        .reconciliation()
                        .mark_failed(&entry.id, &format!("payload decode: {e}"))
                        .await?;
                    continue;
                }
            };

            match self.db.invoices().insert(&record).await {
                Ok(()) => {
                    info!(id = %entry.id, uuid = %record.uuid, "Reconciled stamped invoice into ledger");
                    self.db.reconciliation().mark_resolved(&entry.id).await?;
                    resolved += 1;
                }
                Err(e) if e.is_unique_violation() => {
                    // The record landed some other way (earlier pass, manual
                    // fix). The queue entry's job is done.
                    info!(id = %entry.id, uuid = %record.uuid, "Invoice already in ledger; resolving entry");
                    self.db.reconciliation().mark_resolved(&entry.id).await?;
                    resolved += 1;
                }
                Err(e) => {
                    warn!(id = %entry.id, error = %e, "Reconcile insert failed; will retry");
                    self.db
                        .reconciliation()
                        .mark_failed(&entry.id, &e.to_string())
                        .await?;
                }
            }
        }

        Ok(resolved)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use timbra_core::{InvoiceRecord, InvoiceStatus};
    use timbra_db::DbConfig;

    fn record(uuid: &str, folio: i64, ticket: &str) -> InvoiceRecord {
        InvoiceRecord {
            uuid: uuid.to_string(),
            branch_id: "182".to_string(),
            folio,
            ticket_id: ticket.to_string(),
            certificate_id: "cert-01".to_string(),
            status: InvoiceStatus::Vigente,
            fiscal_document: "{}".to_string(),
            qr_code: "qr".to_string(),
            seal_chain: "seal".to_string(),
            stamped_at: None,
            created_at: Utc::now(),
        }
    }

    async fn processor() -> (ReconcileProcessor, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (processor, _handle) =
            ReconcileProcessor::new(db.clone(), Duration::from_secs(30), 50);
        (processor, db)
    }

    #[tokio::test]
    async fn test_pending_entry_lands_in_ledger() {
        let (processor, db) = processor().await;

        let payload = serde_json::to_string(&record("u-1", 1000, "T-1")).unwrap();
        db.reconciliation().enqueue("T-1", &payload).await.unwrap();

        let resolved = processor.process_pending().await.unwrap();
        assert_eq!(resolved, 1);

        assert!(db.invoices().get_by_uuid("u-1").await.unwrap().is_some());
        assert!(db.reconciliation().pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_already_landed_entry_is_resolved() {
        let (processor, db) = processor().await;

        let rec = record("u-1", 1000, "T-1");
        db.invoices().insert(&rec).await.unwrap();

        let payload = serde_json::to_string(&rec).unwrap();
        db.reconciliation().enqueue("T-1", &payload).await.unwrap();

        let resolved = processor.process_pending().await.unwrap();
        assert_eq!(resolved, 1);
        assert!(db.reconciliation().pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_payload_counts_attempts() {
        let (processor, db) = processor().await;

        db.reconciliation()
            .enqueue("T-1", "not json at all")
            .await
            .unwrap();

        let resolved = processor.process_pending().await.unwrap();
        assert_eq!(resolved, 0);

        let pending = db.reconciliation().pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0].last_error.as_deref().unwrap().contains("payload decode"));
    }

    #[tokio::test]
    async fn test_empty_queue_is_a_quiet_pass() {
        let (processor, _db) = processor().await;
        assert_eq!(processor.process_pending().await.unwrap(), 0);
    }
}
