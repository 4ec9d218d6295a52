//! # Invoice Ledger Repository
//!
//! Database operations for stamped invoice records.
//!
//! ## Invoice Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Invoice Lifecycle                                 │
//! │                                                                         │
//! │  1. STAMP SUCCEEDS (provider)                                          │
//! │     └── insert() → InvoiceRecord { status: Vigente }                   │
//! │         The record is written exactly once, AFTER the attempt          │
//! │         outcome is known. Failed attempts never write here.            │
//! │                                                                         │
//! │  2. (OPTIONAL) CANCEL                                                  │
//! │     └── mark_cancelled() → { status: Cancelada }                       │
//! │         Guarded by WHERE status = 'vigente' - cancelling twice         │
//! │         or cancelling an unknown uuid is NotFound.                     │
//! │                                                                         │
//! │  Everything else about a record is immutable.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use timbra_core::InvoiceRecord;

/// Repository for invoice record operations.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Inserts a stamped invoice.
    ///
    /// ## Errors
    /// * `UniqueViolation` - uuid already recorded (reconciliation replay)
    ///   or the (branch, folio) pair is already taken
    pub async fn insert(&self, invoice: &InvoiceRecord) -> DbResult<()> {
        debug!(uuid = %invoice.uuid, folio = invoice.folio, ticket_id = %invoice.ticket_id, "Inserting invoice");

        sqlx::query(
            r#"
            INSERT INTO invoices (
                uuid, branch_id, folio, ticket_id, certificate_id,
                status, fiscal_document, qr_code, seal_chain,
                stamped_at, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11
            )
            "#,
        )
        .bind(&invoice.uuid)
        .bind(&invoice.branch_id)
        .bind(invoice.folio)
        .bind(&invoice.ticket_id)
        .bind(&invoice.certificate_id)
        .bind(invoice.status)
        .bind(&invoice.fiscal_document)
        .bind(&invoice.qr_code)
        .bind(&invoice.seal_chain)
        .bind(&invoice.stamped_at)
        .bind(invoice.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets an invoice by provider uuid.
    pub async fn get_by_uuid(&self, uuid: &str) -> DbResult<Option<InvoiceRecord>> {
        let invoice: Option<InvoiceRecord> = sqlx::query_as(
            r#"
            SELECT
                uuid, branch_id, folio, ticket_id, certificate_id,
                status, fiscal_document, qr_code, seal_chain,
                stamped_at, created_at
              FROM invoices
             WHERE uuid = ?1
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(invoice)
    }

    /// Gets the invoice stamped for a ticket, if any.
    pub async fn get_by_ticket(&self, ticket_id: &str) -> DbResult<Option<InvoiceRecord>> {
        let invoice: Option<InvoiceRecord> = sqlx::query_as(
            r#"
            SELECT
                uuid, branch_id, folio, ticket_id, certificate_id,
                status, fiscal_document, qr_code, seal_chain,
                stamped_at, created_at
              FROM invoices
             WHERE ticket_id = ?1
            "#,
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(invoice)
    }

    /// Number of invoices issued for a branch (any status).
    pub async fn count_for_branch(&self, branch_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM invoices WHERE branch_id = ?1
            "#,
        )
        .bind(branch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Total number of invoices issued (any branch, any status).
    pub async fn count_all(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Flips an invoice to Cancelada.
    ///
    /// ## Errors
    /// * `NotFound` - no Vigente invoice with that uuid (unknown uuid, or
    ///   already cancelled)
    pub async fn mark_cancelled(&self, uuid: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
               SET status = 'cancelada'
             WHERE uuid = ?1 AND status = 'vigente'
            "#,
        )
        .bind(uuid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice (vigente)", uuid));
        }

        debug!(uuid = %uuid, "Invoice cancelled");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use timbra_core::{InvoiceRecord, InvoiceStatus};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn invoice(uuid: &str, folio: i64, ticket: &str) -> InvoiceRecord {
        InvoiceRecord {
            uuid: uuid.to_string(),
            branch_id: "182".to_string(),
            folio,
            ticket_id: ticket.to_string(),
            certificate_id: "cert-01".to_string(),
            status: InvoiceStatus::Vigente,
            fiscal_document: r#"{"Folio":1000}"#.to_string(),
            qr_code: "qr".to_string(),
            seal_chain: "seal".to_string(),
            stamped_at: Some("2026-08-01T12:00:00".to_string()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_round_trip() {
        let db = db().await;
        db.invoices().insert(&invoice("u-1", 1000, "T-1")).await.unwrap();

        let fetched = db.invoices().get_by_uuid("u-1").await.unwrap().unwrap();
        assert_eq!(fetched.folio, 1000);
        assert_eq!(fetched.status, InvoiceStatus::Vigente);

        let by_ticket = db.invoices().get_by_ticket("T-1").await.unwrap().unwrap();
        assert_eq!(by_ticket.uuid, "u-1");
    }

    #[tokio::test]
    async fn test_duplicate_folio_rejected() {
        let db = db().await;
        db.invoices().insert(&invoice("u-1", 1000, "T-1")).await.unwrap();

        let err = db
            .invoices()
            .insert(&invoice("u-2", 1000, "T-2"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_cancel_is_single_shot() {
        let db = db().await;
        db.invoices().insert(&invoice("u-1", 1000, "T-1")).await.unwrap();

        db.invoices().mark_cancelled("u-1").await.unwrap();
        let fetched = db.invoices().get_by_uuid("u-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, InvoiceStatus::Cancelada);

        // A second cancellation finds no vigente row.
        assert!(db.invoices().mark_cancelled("u-1").await.is_err());
    }

    #[tokio::test]
    async fn test_count_for_branch() {
        let db = db().await;
        db.invoices().insert(&invoice("u-1", 1000, "T-1")).await.unwrap();
        db.invoices().insert(&invoice("u-2", 1001, "T-2")).await.unwrap();

        assert_eq!(db.invoices().count_for_branch("182").await.unwrap(), 2);
        assert_eq!(db.invoices().count_for_branch("999").await.unwrap(), 0);
        assert_eq!(db.invoices().count_all().await.unwrap(), 2);
    }
}
