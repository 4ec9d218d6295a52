//! # Folio Ledger Repository
//!
//! Per-branch monotonic invoice numbering with atomic reserve/release.
//!
//! ## Reservation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Folio Reservation                                 │
//! │                                                                         │
//! │  reserve("182")                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE folio_counters                                                 │
//! │     SET current_folio = current_folio + 1                              │
//! │   WHERE branch_id = '182'                                              │
//! │   RETURNING current_folio          ◄── one statement, race-safe        │
//! │       │                                                                 │
//! │       ├── Some(folio)  → the attempt owns this folio                   │
//! │       └── None         → branch never provisioned (caller maps this    │
//! │                          to a configuration error, BEFORE any          │
//! │                          external call)                                │
//! │                                                                         │
//! │  release("182", folio)  ← compensation only; decrements back IF the    │
//! │                           counter still equals the reserved folio      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is deliberately no read-then-write path here: the increment and the
//! fetch are one statement, so two concurrent reservations on the same
//! branch can never observe the same folio.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use timbra_core::FolioCounter;

/// Repository for folio counter operations.
#[derive(Debug, Clone)]
pub struct FolioRepository {
    pool: SqlitePool,
}

impl FolioRepository {
    /// Creates a new FolioRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FolioRepository { pool }
    }

    /// Provisions a counter for a branch.
    ///
    /// Administrative operation; must happen before the branch's first sale.
    /// `initial_folio` is the last folio already consumed (0 for a fresh
    /// branch) - the first reservation returns `initial_folio + 1`.
    ///
    /// ## Errors
    /// * `UniqueViolation` when the branch already has a counter
    pub async fn provision(&self, branch_id: &str, initial_folio: i64) -> DbResult<FolioCounter> {
        debug!(branch_id = %branch_id, initial_folio, "Provisioning folio counter");

        sqlx::query(
            r#"
            INSERT INTO folio_counters (branch_id, current_folio)
            VALUES (?1, ?2)
            "#,
        )
        .bind(branch_id)
        .bind(initial_folio)
        .execute(&self.pool)
        .await?;

        Ok(FolioCounter {
            branch_id: branch_id.to_string(),
            current_folio: initial_folio,
        })
    }

    /// Atomically reserves the next folio for a branch.
    ///
    /// ## Returns
    /// * `Some(folio)` - the reserved folio; the counter now equals it
    /// * `None` - no counter exists for the branch
    pub async fn reserve(&self, branch_id: &str) -> DbResult<Option<i64>> {
        let folio: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE folio_counters
               SET current_folio = current_folio + 1
             WHERE branch_id = ?1
             RETURNING current_folio
            "#,
        )
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(folio) = folio {
            debug!(branch_id = %branch_id, folio, "Reserved folio");
        }

        Ok(folio)
    }

    /// Releases a reservation after a failed attempt.
    ///
    /// The decrement is conditional on the counter still holding the
    /// released folio. If a concurrent attempt reserved past it, the release
    /// is skipped and the folio becomes a hole - decrementing underneath a
    /// live reservation would hand the same folio out twice.
    ///
    /// ## Returns
    /// * `true` - counter restored to its pre-attempt value
    /// * `false` - a later reservation exists; nothing was changed
    pub async fn release(&self, branch_id: &str, folio: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE folio_counters
               SET current_folio = current_folio - 1
             WHERE branch_id = ?1 AND current_folio = ?2
            "#,
        )
        .bind(branch_id)
        .bind(folio)
        .execute(&self.pool)
        .await?;

        let restored = result.rows_affected() > 0;
        debug!(branch_id = %branch_id, folio, restored, "Released folio reservation");

        Ok(restored)
    }

    /// Current counter value for a branch, if provisioned.
    pub async fn current(&self, branch_id: &str) -> DbResult<Option<i64>> {
        let folio: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT current_folio FROM folio_counters WHERE branch_id = ?1
            "#,
        )
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(folio)
    }

    /// Fetches the full counter row for a branch.
    pub async fn get(&self, branch_id: &str) -> DbResult<FolioCounter> {
        let counter: Option<FolioCounter> = sqlx::query_as(
            r#"
            SELECT branch_id, current_folio
              FROM folio_counters
             WHERE branch_id = ?1
            "#,
        )
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        counter.ok_or_else(|| DbError::not_found("FolioCounter", branch_id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
