//! # Audit Trail Repository
//!
//! Append-only log of stamping attempt outcomes ("bitacora").
//!
//! One row per attempt - not per retry-loop iteration, and not per internal
//! step. The row is written after the attempt's outcome is known, success
//! and failure alike. Whether a failed append aborts anything is decided at
//! the coordinator, not here: this repository just reports the error.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use timbra_core::AuditEntry;

/// Repository for audit trail operations.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    /// Creates a new AuditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Appends one attempt outcome.
    pub async fn append(&self, entry: &AuditEntry) -> DbResult<()> {
        debug!(ticket_id = %entry.ticket_id, outcome = ?entry.outcome, "Appending audit entry");

        sqlx::query(
            r#"
            INSERT INTO audit_trail (
                ticket_id, outcome, message, issuer_rfc, receiver_rfc, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&entry.ticket_id)
        .bind(entry.outcome)
        .bind(&entry.message)
        .bind(&entry.issuer_rfc)
        .bind(&entry.receiver_rfc)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All entries for a ticket, oldest first.
    pub async fn list_for_ticket(&self, ticket_id: &str) -> DbResult<Vec<AuditEntry>> {
        let entries: Vec<AuditEntry> = sqlx::query_as(
            r#"
            SELECT ticket_id, outcome, message, issuer_rfc, receiver_rfc, created_at
              FROM audit_trail
             WHERE ticket_id = ?1
             ORDER BY id
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use timbra_core::{AuditEntry, AuditOutcome};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn entry(ticket: &str, outcome: AuditOutcome, message: &str) -> AuditEntry {
        AuditEntry {
            ticket_id: ticket.to_string(),
            outcome,
            message: message.to_string(),
            issuer_rfc: Some("ICC010101ABC".to_string()),
            receiver_rfc: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_list() {
        let db = db().await;

        db.audit()
            .append(&entry("T-1", AuditOutcome::Error, "postal code rejected"))
            .await
            .unwrap();
        db.audit()
            .append(&entry("T-1", AuditOutcome::Success, "stamped"))
            .await
            .unwrap();

        let entries = db.audit().list_for_ticket("T-1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].outcome, AuditOutcome::Error);
        assert_eq!(entries[0].message, "postal code rejected");
        assert_eq!(entries[1].outcome, AuditOutcome::Success);
    }

    #[tokio::test]
    async fn test_list_is_ticket_scoped() {
        let db = db().await;

        db.audit()
            .append(&entry("T-1", AuditOutcome::Success, "stamped"))
            .await
            .unwrap();

        assert!(db.audit().list_for_ticket("T-2").await.unwrap().is_empty());
    }
}
