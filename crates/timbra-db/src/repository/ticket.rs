//! # Ticket Deduplication Guard
//!
//! Persisted idempotency markers keyed by ticket id.
//!
//! Stamping is legally irreversible: a duplicate claim must never reach the
//! provider. The guard is nothing more than the PRIMARY KEY on
//! `ticket_markers` - a second INSERT for the same ticket fails with a
//! unique-constraint violation, which the coordinator turns into
//! `DuplicateTicketError` before any external call is made.
//!
//! Markers are deleted only on rollback. Once an invoice referencing the
//! ticket exists the marker is never released, so it becomes the permanent
//! "already stamped" record.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use timbra_core::TicketMarker;

/// Repository for ticket marker operations.
#[derive(Debug, Clone)]
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
    /// Creates a new TicketRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TicketRepository { pool }
    }

    /// Claims the marker for a ticket.
    ///
    /// Ticket ids must already be in canonical form
    /// (see `timbra_core::normalize_ticket_id`).
    ///
    /// ## Errors
    /// * `UniqueViolation` - the ticket already has a live marker; the
    ///   attempt must stop here
    pub async fn claim(&self, ticket_id: &str) -> DbResult<TicketMarker> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO ticket_markers (ticket_id, reserved_at)
            VALUES (?1, ?2)
            "#,
        )
        .bind(ticket_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(ticket_id = %ticket_id, "Claimed ticket marker");

        Ok(TicketMarker {
            ticket_id: ticket_id.to_string(),
            reserved_at: now,
        })
    }

    /// Removes the marker so the ticket can be resubmitted.
    ///
    /// Called only on rollback of a failed attempt.
    ///
    /// ## Returns
    /// * `true` - marker removed
    /// * `false` - no marker existed
    pub async fn release(&self, ticket_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM ticket_markers WHERE ticket_id = ?1
            "#,
        )
        .bind(ticket_id)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected() > 0;
        debug!(ticket_id = %ticket_id, removed, "Released ticket marker");

        Ok(removed)
    }

    /// Fetches the live marker for a ticket, if any.
    pub async fn get(&self, ticket_id: &str) -> DbResult<Option<TicketMarker>> {
        let marker: Option<TicketMarker> = sqlx::query_as(
            r#"
            SELECT ticket_id, reserved_at
              FROM ticket_markers
             WHERE ticket_id = ?1
            "#,
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(marker)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_claim_then_duplicate_claim() {
        let db = db().await;

        db.tickets().claim("T-1").await.unwrap();

        let err = db.tickets().claim("T-1").await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_release_allows_reclaim() {
        let db = db().await;

        db.tickets().claim("T-1").await.unwrap();
        assert!(db.tickets().release("T-1").await.unwrap());

        // Same ticket id can now be resubmitted.
        db.tickets().claim("T-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_release_missing_marker_is_noop() {
        let db = db().await;
        assert!(!db.tickets().release("NEVER-CLAIMED").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_reflects_liveness() {
        let db = db().await;

        assert!(db.tickets().get("T-1").await.unwrap().is_none());
        db.tickets().claim("T-1").await.unwrap();
        assert!(db.tickets().get("T-1").await.unwrap().is_some());
    }
}
