//! # Domain Types
//!
//! Core domain types for the stamping service.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ StampingRequest │   │  InvoiceRecord  │   │   AuditEntry    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  fiscalDocument │   │  uuid           │   │  ticket_id      │       │
//! │  │  branchId       │   │  folio          │   │  outcome        │       │
//! │  │  ticketId       │   │  status         │   │  message        │       │
//! │  │  certificateId  │   │  fiscal_document│   │  issuer_rfc     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  FolioCounter   │   │  TicketMarker   │   │  AttemptState   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  branch_id (PK) │   │  ticket_id (PK) │   │  Reserved       │       │
//! │  │  current_folio  │   │  reserved_at    │   │  Claimed        │       │
//! │  └─────────────────┘   └─────────────────┘   │  Stamped        │       │
//! │                                              │  Failed         │       │
//! │                                              │  RolledBack     │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Opaque Payload Rule
//! The fiscal document itself is never interpreted beyond two reads: the
//! issuer/receiver RFCs for the audit trail, and the `Folio` field the
//! coordinator stamps into it before the provider call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Stamping Request (API boundary)
// =============================================================================

/// An incoming stamping request, already authenticated upstream.
///
/// Deserialized and validated at the API boundary **before** any folio
/// reservation occurs - a rejected request has zero side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampingRequest {
    /// The fiscal document to stamp. Opaque to this service except for the
    /// `Folio` field the coordinator assigns.
    pub fiscal_document: Value,

    /// Issuing branch ("sucursal"). Folios are sequential per branch.
    pub branch_id: String,

    /// Point-of-sale ticket that originates this invoice.
    pub ticket_id: String,

    /// Certificate used by the issuer for this invoice.
    pub certificate_id: String,

    /// Date of the underlying sale, carried into notifications.
    pub sale_date: String,

    /// Receiver's email; delivery is skipped when absent or implausible.
    #[serde(default)]
    pub receiver_email: Option<String>,

    /// Issuer address lines for the rendered document.
    #[serde(default)]
    pub address: Option<String>,

    /// Issuer company display name for the rendered document.
    #[serde(default)]
    pub company: Option<String>,
}

impl StampingRequest {
    /// Issuer RFC read from the opaque document, when present.
    pub fn issuer_rfc(&self) -> Option<String> {
        self.fiscal_document
            .get("Emisor")
            .and_then(|e| e.get("Rfc"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    /// Receiver RFC read from the opaque document, when present.
    pub fn receiver_rfc(&self) -> Option<String> {
        self.fiscal_document
            .get("Receptor")
            .and_then(|r| r.get("Rfc"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    /// Series ("Serie") read from the opaque document, when present.
    pub fn series(&self) -> Option<String> {
        self.fiscal_document
            .get("Serie")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

// =============================================================================
// Gateway Outcomes
// =============================================================================

/// A signed fiscal result returned by the stamping provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalResult {
    /// Provider-assigned invoice UUID.
    pub uuid: String,

    /// The signed fiscal document payload (opaque).
    pub document: String,

    /// QR code for the printed representation.
    pub qr_code: String,

    /// Certification seal chain.
    pub seal_chain: String,

    /// Provider stamping timestamp, in the provider's own format.
    pub stamped_at: Option<String>,
}

/// The closed outcome of a provider `issue` call.
///
/// A rejection is an **expected** outcome (synchronous validation), not an
/// exceptional one - transport failures are a separate error entirely.
#[derive(Debug, Clone)]
pub enum StampOutcome {
    /// The provider signed and registered the document.
    Issued(FiscalResult),

    /// The provider rejected the document; message surfaced verbatim.
    Rejected { message: String },
}

// =============================================================================
// Invoice Record
// =============================================================================

/// Lifecycle status of a persisted invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Stamped and in force.
    Vigente,
    /// Cancelled through the cancellation flow.
    Cancelada,
}

/// A stamped invoice as recorded in the local ledger.
///
/// Created only after a successful stamping call; immutable except the
/// status transition to [`InvoiceStatus::Cancelada`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InvoiceRecord {
    /// Provider-assigned invoice UUID.
    pub uuid: String,

    /// Issuing branch.
    pub branch_id: String,

    /// The folio this invoice consumed. Equals the folio embedded in the
    /// fiscal document.
    pub folio: i64,

    /// Originating ticket (normalized form).
    pub ticket_id: String,

    /// Certificate used for the stamp.
    pub certificate_id: String,

    /// Vigente or Cancelada.
    pub status: InvoiceStatus,

    /// The signed fiscal document payload (opaque).
    pub fiscal_document: String,

    /// QR code for the printed representation.
    pub qr_code: String,

    /// Certification seal chain.
    pub seal_chain: String,

    /// Provider stamping timestamp, provider format.
    pub stamped_at: Option<String>,

    /// When the record was persisted locally.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Audit Trail
// =============================================================================

/// Outcome recorded for one stamping attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Error,
}

/// One append-only audit entry per attempt (not per retry-loop iteration).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AuditEntry {
    /// Ticket the attempt was for (normalized form).
    pub ticket_id: String,

    /// Success or error.
    pub outcome: AuditOutcome,

    /// Human-readable outcome; provider messages verbatim on rejection.
    pub message: String,

    /// Issuer RFC, when the document carried one.
    pub issuer_rfc: Option<String>,

    /// Receiver RFC, when the document carried one.
    pub receiver_rfc: Option<String>,

    /// When the attempt concluded.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Ledger Rows
// =============================================================================

/// Per-branch monotonic folio counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FolioCounter {
    pub branch_id: String,
    pub current_folio: i64,
}

/// Idempotency marker for a ticket with a stamping attempt in flight
/// (or stamped - markers become permanent once an invoice references
/// the ticket).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TicketMarker {
    pub ticket_id: String,
    pub reserved_at: DateTime<Utc>,
}

// =============================================================================
// Reconciliation Queue
// =============================================================================

/// A stamped invoice that could not be persisted locally.
///
/// Stamping cannot be undone, so this window gets a durable queue entry
/// instead of a rollback; a background processor retries the insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReconciliationEntry {
    /// Queue entry id (UUID v4).
    pub id: String,

    /// Ticket the stamped invoice belongs to.
    pub ticket_id: String,

    /// JSON serialization of the full [`InvoiceRecord`] to re-insert.
    pub payload: String,

    /// Number of failed re-insert attempts so far.
    pub attempts: i64,

    /// Last re-insert failure, for diagnostics.
    pub last_error: Option<String>,

    /// When the entry was queued.
    pub created_at: DateTime<Utc>,

    /// Set once the invoice record finally landed.
    pub resolved_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Attempt State Machine
// =============================================================================

/// States of a single stamping attempt.
///
/// ```text
/// Reserved ──► Claimed ──► Stamped            (terminal success)
///    │            │
///    └────────────┴──► Failed ──► RolledBack  (terminal failure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// A folio has been reserved for the attempt.
    Reserved,
    /// The ticket marker has been claimed.
    Claimed,
    /// The provider stamped the document. Terminal.
    Stamped,
    /// The attempt failed; compensation pending.
    Failed,
    /// Compensation completed. Terminal.
    RolledBack,
}

impl AttemptState {
    /// True for states no attempt ever leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Stamped | AttemptState::RolledBack)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_request() -> StampingRequest {
        StampingRequest {
            fiscal_document: json!({
                "Serie": "A",
                "Emisor": {"Rfc": "ICC010101ABC", "Nombre": "Industrias Con Clase"},
                "Receptor": {"Rfc": "XAXX010101000", "Nombre": "Publico General"},
                "SubTotal": "100.00",
                "Total": "116.00"
            }),
            branch_id: "182".to_string(),
            ticket_id: "T-1".to_string(),
            certificate_id: "cert-01".to_string(),
            sale_date: "2026-08-01".to_string(),
            receiver_email: Some("cliente@example.com".to_string()),
            address: None,
            company: None,
        }
    }

    #[test]
    fn test_rfc_extraction() {
        let req = sample_request();
        assert_eq!(req.issuer_rfc().as_deref(), Some("ICC010101ABC"));
        assert_eq!(req.receiver_rfc().as_deref(), Some("XAXX010101000"));
        assert_eq!(req.series().as_deref(), Some("A"));
    }

    #[test]
    fn test_rfc_extraction_missing_fields() {
        let mut req = sample_request();
        req.fiscal_document = json!({"SubTotal": "100.00"});
        assert_eq!(req.issuer_rfc(), None);
        assert_eq!(req.receiver_rfc(), None);
        assert_eq!(req.series(), None);
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let raw = r#"{
            "fiscalDocument": {"Serie": "A"},
            "branchId": "182",
            "ticketId": "T-9",
            "certificateId": "cert-01",
            "saleDate": "2026-08-01"
        }"#;
        let req: StampingRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.branch_id, "182");
        assert_eq!(req.ticket_id, "T-9");
        assert_eq!(req.receiver_email, None);
    }

    #[test]
    fn test_attempt_state_terminality() {
        assert!(AttemptState::Stamped.is_terminal());
        assert!(AttemptState::RolledBack.is_terminal());
        assert!(!AttemptState::Reserved.is_terminal());
        assert!(!AttemptState::Claimed.is_terminal());
        assert!(!AttemptState::Failed.is_terminal());
    }

    #[test]
    fn test_invoice_status_serde() {
        assert_eq!(
            serde_json::to_string(&InvoiceStatus::Vigente).unwrap(),
            r#""vigente""#
        );
        assert_eq!(
            serde_json::to_string(&AuditOutcome::Error).unwrap(),
            r#""error""#
        );
    }
}
