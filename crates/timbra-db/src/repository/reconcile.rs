//! # Reconciliation Queue Repository
//!
//! Durable queue for stamped invoices that failed local persistence.
//!
//! ## Why This Exists
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │            The One Window With No Compensating Action                   │
//! │                                                                         │
//! │  Provider stamps document  ──► legally binding, cannot be undone       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO invoices ... ──► FAILS (store unreachable, disk, ...)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  enqueue(ticket, full InvoiceRecord as JSON)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Background processor retries the insert until it lands,               │
//! │  then marks the entry resolved.                                        │
//! │                                                                         │
//! │  The queue lives in the same store that just failed - the enqueue      │
//! │  itself can fail too. That final gap is logged loudly by the           │
//! │  coordinator; it is acknowledged, not hidden.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use timbra_core::ReconciliationEntry;

/// Repository for reconciliation queue operations.
#[derive(Debug, Clone)]
pub struct ReconciliationRepository {
    pool: SqlitePool,
}

impl ReconciliationRepository {
    /// Creates a new ReconciliationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReconciliationRepository { pool }
    }

    /// Queues a stamped-but-unpersisted invoice for re-insert.
    ///
    /// ## Arguments
    /// * `ticket_id` - the ticket the stamped invoice belongs to
    /// * `payload` - JSON serialization of the full `InvoiceRecord`
    pub async fn enqueue(&self, ticket_id: &str, payload: &str) -> DbResult<ReconciliationEntry> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        debug!(id = %id, ticket_id = %ticket_id, "Queueing invoice for reconciliation");

        let entry = ReconciliationEntry {
            id: id.clone(),
            ticket_id: ticket_id.to_string(),
            payload: payload.to_string(),
            attempts: 0,
            last_error: None,
            created_at: now,
            resolved_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO reconciliation_queue (
                id, ticket_id, payload, attempts, last_error, created_at, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.ticket_id)
        .bind(&entry.payload)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.resolved_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Unresolved entries, oldest first.
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<ReconciliationEntry>> {
        let entries: Vec<ReconciliationEntry> = sqlx::query_as(
            r#"
            SELECT id, ticket_id, payload, attempts, last_error, created_at, resolved_at
              FROM reconciliation_queue
             WHERE resolved_at IS NULL
             ORDER BY created_at
             LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Marks an entry resolved after its invoice record finally landed.
    pub async fn mark_resolved(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE reconciliation_queue
               SET resolved_at = ?2
             WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a failed re-insert attempt.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE reconciliation_queue
               SET attempts = attempts + 1,
                   last_error = ?2
             WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
