//! # Compensation Coordinator
//!
//! Orchestrates one stamping attempt across three independently-failing
//! systems: the local ledger, the stamping provider and the notification
//! targets. The provider call is legally one-way - everything in this
//! module exists to make sure the local ledger agrees with whatever the
//! provider did.
//!
//! ## Attempt State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      One Stamping Attempt                               │
//! │                                                                         │
//! │  validate (boundary, no side effects yet)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. RESERVE folio        ── ConfigurationError → fail fast, no cleanup │
//! │       │ Reserved                                                        │
//! │       ▼                                                                 │
//! │  2. CLAIM ticket marker  ── DuplicateTicket → release folio, return    │
//! │       │ Claimed             (provider is NEVER called)                  │
//! │       ▼                                                                 │
//! │  3. AUTHENTICATE + ISSUE ── Rejected/Transport → release folio,        │
//! │       │                      release marker, error audit, return        │
//! │       ▼                                                                 │
//! │  4. PERSIST invoice      ── failure → reconciliation queue (the stamp  │
//! │       │ Stamped              cannot be undone), error audit, return     │
//! │       ▼                                                                 │
//! │  5. success audit + notification fan-out (best-effort)                 │
//! │                                                                         │
//! │  INVARIANT: any attempt that does not reach Stamped leaves the folio   │
//! │  counter at its pre-attempt value and no ticket marker behind. The     │
//! │  only surviving trace of a failed attempt is its audit entry.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use timbra_core::{
    normalize_ticket_id, AttemptState, AuditEntry, AuditOutcome, InvoiceRecord, InvoiceStatus,
    RollbackScope, StampError, StampOutcome, StampResult, StampingRequest,
};
use timbra_db::Database;

use crate::config::EngineConfig;
use crate::deadline::AttemptDeadline;
use crate::gateway::StampingGateway;
use crate::notify::InvoiceNotifier;
use crate::render::DocumentRenderer;

// =============================================================================
// Result Type
// =============================================================================

/// What a successful attempt hands back to the API boundary.
#[derive(Debug, Clone)]
pub struct StampedInvoice {
    /// The persisted ledger record.
    pub invoice: InvoiceRecord,

    /// Rendered representation for the response body and notifications.
    pub rendered_document: Vec<u8>,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Orchestrates stamping attempts.
///
/// Holds its collaborators behind seams (`StampingGateway`,
/// `InvoiceNotifier`, `DocumentRenderer`) - constructed once per process
/// and injected, never reached through globals.
pub struct Coordinator {
    db: Database,
    gateway: Arc<dyn StampingGateway>,
    notifier: Arc<dyn InvoiceNotifier>,
    renderer: Arc<dyn DocumentRenderer>,
    config: EngineConfig,
}

impl Coordinator {
    /// Creates a new coordinator.
    pub fn new(
        db: Database,
        gateway: Arc<dyn StampingGateway>,
        notifier: Arc<dyn InvoiceNotifier>,
        renderer: Arc<dyn DocumentRenderer>,
        config: EngineConfig,
    ) -> Self {
        Coordinator {
            db,
            gateway,
            notifier,
            renderer,
            config,
        }
    }

    /// Runs one stamping attempt end to end.
    ///
    /// The request must already have passed boundary validation. Exactly one
    /// folio reservation happens per call; there is no internal retry.
    pub async fn stamp(&self, request: StampingRequest) -> StampResult<StampedInvoice> {
        let ticket_id = normalize_ticket_id(&request.ticket_id);
        let deadline = AttemptDeadline::start(self.config.attempt_deadline);

        // ---- Step 1: reserve folio --------------------------------------
        let folio = match self.db.folios().reserve(&request.branch_id).await {
            Ok(Some(folio)) => folio,
            Ok(None) => {
                // Fail fast: the branch was never provisioned. Nothing was
                // reserved, nothing to clean up.
                return Err(StampError::Configuration {
                    branch_id: request.branch_id.clone(),
                });
            }
            Err(e) => return Err(StampError::persistence(e.to_string())),
        };
        debug!(ticket_id = %ticket_id, folio, state = ?AttemptState::Reserved, "Folio reserved");

        // ---- Step 2: claim ticket marker --------------------------------
        if let Err(db_err) = self.db.tickets().claim(&ticket_id).await {
            let err = if db_err.is_unique_violation() {
                StampError::DuplicateTicket {
                    ticket_id: ticket_id.clone(),
                }
            } else {
                StampError::persistence(db_err.to_string())
            };
            // The marker was not created by this attempt. Whatever marker
            // exists belongs to an earlier attempt and must survive, so the
            // compensation here is folio-only regardless of failure kind.
            self.rollback(&request.branch_id, folio, &ticket_id, RollbackScope::FolioOnly)
                .await;
            return Err(err);
        }
        debug!(ticket_id = %ticket_id, folio, state = ?AttemptState::Claimed, "Ticket marker claimed");

        // ---- Step 3: authenticate + issue -------------------------------
        // The reserved folio becomes part of the document before the
        // provider signs it; the ledger later records the same number.
        let mut document = request.fiscal_document.clone();
        if let Value::Object(map) = &mut document {
            map.insert("Folio".to_string(), Value::from(folio));
        }

        let outcome = self.issue_within_deadline(&document, &deadline).await;

        let result = match outcome {
            Ok(StampOutcome::Issued(result)) => result,
            Ok(StampOutcome::Rejected { message }) => {
                let err = StampError::StampingValidation { message };
                self.rollback(&request.branch_id, folio, &ticket_id, err.rollback_scope())
                    .await;
                self.append_audit(&ticket_id, AuditOutcome::Error, err.to_string(), &request)
                    .await;
                return Err(err);
            }
            Err(err) => {
                self.rollback(&request.branch_id, folio, &ticket_id, err.rollback_scope())
                    .await;
                self.append_audit(&ticket_id, AuditOutcome::Error, err.to_string(), &request)
                    .await;
                return Err(err);
            }
        };

        // ---- Step 4: persist the invoice --------------------------------
        let record = InvoiceRecord {
            uuid: result.uuid,
            branch_id: request.branch_id.clone(),
            folio,
            ticket_id: ticket_id.clone(),
            certificate_id: request.certificate_id.clone(),
            status: InvoiceStatus::Vigente,
            fiscal_document: result.document,
            qr_code: result.qr_code,
            seal_chain: result.seal_chain,
            stamped_at: result.stamped_at,
            created_at: Utc::now(),
        };

        if let Err(db_err) = self.db.invoices().insert(&record).await {
            // The stamp is already legally binding; rolling back folio or
            // marker now would misrepresent reality. Queue the record so a
            // background pass lands it.
            error!(
                uuid = %record.uuid,
                ticket_id = %ticket_id,
                error = %db_err,
                "Stamped invoice failed local persistence; queueing for reconciliation"
            );
            self.enqueue_reconciliation(&record).await;
            self.append_audit(
                &ticket_id,
                AuditOutcome::Error,
                format!(
                    "stamped as {} but local persistence failed: {}",
                    record.uuid, db_err
                ),
                &request,
            )
            .await;
            return Err(StampError::persistence(db_err.to_string()));
        }

        info!(
            uuid = %record.uuid,
            ticket_id = %ticket_id,
            folio,
            state = ?AttemptState::Stamped,
            "Invoice stamped and recorded"
        );

        // ---- Step 5: audit + fan-out (neither can alter the outcome) ----
        self.append_audit(
            &ticket_id,
            AuditOutcome::Success,
            format!("stamped as {}", record.uuid),
            &request,
        )
        .await;

        let rendered = self.renderer.render(&record, &request);
        if let Err(e) = self.notifier.deliver(&record, &request, &rendered).await {
            // The stamp is final; delivery can be repeated out of band.
            warn!(uuid = %record.uuid, error = %e, "Notification fan-out failed; stamp unaffected");
        }

        Ok(StampedInvoice {
            invoice: record,
            rendered_document: rendered,
        })
    }

    /// Cancels a previously stamped invoice.
    ///
    /// Authenticates, asks the provider to cancel, then flips the local
    /// status. The provider call comes first: a locally-cancelled invoice
    /// the provider still considers vigente would be the worse lie.
    pub async fn cancel(
        &self,
        uuid: &str,
        issuer_rfc: &str,
        reason: &str,
    ) -> StampResult<InvoiceRecord> {
        let invoice = self
            .db
            .invoices()
            .get_by_uuid(uuid)
            .await
            .map_err(|e| StampError::persistence(e.to_string()))?
            .ok_or_else(|| StampError::StampingValidation {
                message: format!("No invoice recorded with uuid {uuid}"),
            })?;

        if invoice.status == InvoiceStatus::Cancelada {
            return Err(StampError::StampingValidation {
                message: format!("Invoice {uuid} is already cancelled"),
            });
        }

        let token = self.gateway.authenticate().await?;
        self.gateway.cancel(issuer_rfc, uuid, reason, &token).await?;

        self.db
            .invoices()
            .mark_cancelled(uuid)
            .await
            .map_err(|e| StampError::persistence(e.to_string()))?;

        info!(uuid = %uuid, "Invoice cancelled");

        self.db
            .invoices()
            .get_by_uuid(uuid)
            .await
            .map_err(|e| StampError::persistence(e.to_string()))?
            .ok_or_else(|| StampError::persistence(format!("invoice {uuid} vanished after cancel")))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Authenticate + issue under the remaining attempt budget.
    ///
    /// Deadline expiry is a transport failure; the caller still rolls back
    /// outside the budget.
    async fn issue_within_deadline(
        &self,
        document: &Value,
        deadline: &AttemptDeadline,
    ) -> StampResult<StampOutcome> {
        let remaining = deadline.remaining().ok_or_else(|| {
            StampError::transport("attempt deadline exhausted before the provider call")
        })?;

        let call = async {
            let token = self.gateway.authenticate().await?;
            self.gateway.issue(document, &token).await
        };

        match tokio::time::timeout(remaining, call).await {
            Ok(result) => result,
            Err(_) => Err(StampError::transport(format!(
                "attempt deadline of {:?} expired during the stamping call",
                deadline.budget()
            ))),
        }
    }

    /// Compensates a failed attempt.
    ///
    /// Rollback failures cannot fail the attempt any harder than it already
    /// failed - they are logged at error level and left for the operator.
    async fn rollback(&self, branch_id: &str, folio: i64, ticket_id: &str, scope: RollbackScope) {
        if scope == RollbackScope::None {
            return;
        }
        debug!(ticket_id = %ticket_id, folio, ?scope, state = ?AttemptState::Failed, "Rolling back attempt");

        if scope == RollbackScope::Full {
            match self.db.tickets().release(ticket_id).await {
                Ok(_) => {}
                Err(e) => error!(
                    ticket_id = %ticket_id,
                    error = %e,
                    "Rollback could not release ticket marker; ticket is stuck until operator intervention"
                ),
            }
        }

        match self.db.folios().release(branch_id, folio).await {
            Ok(true) => {
                debug!(ticket_id = %ticket_id, folio, state = ?AttemptState::RolledBack, "Attempt rolled back")
            }
            Ok(false) => warn!(
                branch_id = %branch_id,
                folio,
                "Counter advanced past the reservation; folio becomes a hole"
            ),
            Err(e) => error!(
                branch_id = %branch_id,
                folio,
                error = %e,
                "Rollback could not release folio reservation"
            ),
        }
    }

    /// Fire-and-forget audit append.
    ///
    /// An audit failure never alters an otherwise-determined outcome -
    /// audit is observability, not a correctness gate.
    async fn append_audit(
        &self,
        ticket_id: &str,
        outcome: AuditOutcome,
        message: String,
        request: &StampingRequest,
    ) {
        let entry = AuditEntry {
            ticket_id: ticket_id.to_string(),
            outcome,
            message,
            issuer_rfc: request.issuer_rfc(),
            receiver_rfc: request.receiver_rfc(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.db.audit().append(&entry).await {
            error!(ticket_id = %ticket_id, error = %e, "Audit append failed; attempt outcome unaffected");
        }
    }

    /// Queues a stamped-but-unpersisted record.
    ///
    /// If even the queue insert fails there is nothing durable left to
    /// try - log everything needed to reconstruct the invoice by hand.
    async fn enqueue_reconciliation(&self, record: &InvoiceRecord) {
        let payload = match serde_json::to_string(record) {
            Ok(payload) => payload,
            Err(e) => {
                error!(uuid = %record.uuid, error = %e, "Could not serialize stamped invoice for reconciliation");
                return;
            }
        };

        if let Err(e) = self
            .db
            .reconciliation()
            .enqueue(&record.ticket_id, &payload)
            .await
        {
            error!(
                uuid = %record.uuid,
                ticket_id = %record.ticket_id,
                folio = record.folio,
                error = %e,
                payload = %payload,
                "STAMPED INVOICE AT RISK: reconciliation enqueue failed; manual recovery required"
            );
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use timbra_core::FiscalResult;
    use timbra_db::DbConfig;

    use crate::config::ProviderSettings;
    use crate::gateway::BearerToken;
    use crate::render::TextRenderer;

    // -------------------------------------------------------------------------
    // Test Doubles
    // -------------------------------------------------------------------------

    enum IssueBehavior {
        Succeed,
        Reject(String),
        Fail(String),
    }

    struct MockGateway {
        behavior: IssueBehavior,
        auth_calls: AtomicU32,
        issue_calls: AtomicU32,
    }

    impl MockGateway {
        fn new(behavior: IssueBehavior) -> Self {
            MockGateway {
                behavior,
                auth_calls: AtomicU32::new(0),
                issue_calls: AtomicU32::new(0),
            }
        }

        fn auth_calls(&self) -> u32 {
            self.auth_calls.load(Ordering::SeqCst)
        }

        fn issue_calls(&self) -> u32 {
            self.issue_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StampingGateway for MockGateway {
        async fn authenticate(&self) -> StampResult<BearerToken> {
            self.auth_calls.fetch_add(1, Ordering::SeqCst);
            Ok(BearerToken::new("test-token"))
        }

        async fn issue(&self, document: &Value, _token: &BearerToken) -> StampResult<StampOutcome> {
            let n = self.issue_calls.fetch_add(1, Ordering::SeqCst) + 1;
            match &self.behavior {
                IssueBehavior::Succeed => Ok(StampOutcome::Issued(FiscalResult {
                    uuid: format!("uuid-{n}"),
                    // The "signed" document echoes what was submitted, folio
                    // included.
                    document: document.to_string(),
                    qr_code: "qr".to_string(),
                    seal_chain: "seal".to_string(),
                    stamped_at: Some("2026-08-01T12:00:00".to_string()),
                })),
                IssueBehavior::Reject(message) => Ok(StampOutcome::Rejected {
                    message: message.clone(),
                }),
                IssueBehavior::Fail(message) => Err(StampError::transport(message.clone())),
            }
        }

        async fn cancel(
            &self,
            _issuer_rfc: &str,
            _uuid: &str,
            _reason: &str,
            _token: &BearerToken,
        ) -> StampResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        deliveries: AtomicU32,
    }

    #[async_trait]
    impl InvoiceNotifier for RecordingNotifier {
        async fn deliver(
            &self,
            _invoice: &InvoiceRecord,
            _request: &StampingRequest,
            _rendered: &[u8],
        ) -> StampResult<()> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl InvoiceNotifier for FailingNotifier {
        async fn deliver(
            &self,
            _invoice: &InvoiceRecord,
            _request: &StampingRequest,
            _rendered: &[u8],
        ) -> StampResult<()> {
            Err(StampError::transport("partner endpoint down"))
        }
    }

    // -------------------------------------------------------------------------
    // Harness
    // -------------------------------------------------------------------------

    fn test_config() -> EngineConfig {
        EngineConfig {
            provider: ProviderSettings {
                base_url: "http://provider.invalid".to_string(),
                username: "u".to_string(),
                password: "p".to_string(),
            },
            partner: None,
            email: None,
            call_timeout: Duration::from_secs(5),
            attempt_deadline: Duration::from_secs(30),
            reconcile_poll_interval: Duration::from_secs(30),
            reconcile_batch_size: 50,
        }
    }

    async fn harness(
        behavior: IssueBehavior,
    ) -> (Coordinator, Database, Arc<MockGateway>, Arc<RecordingNotifier>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let gateway = Arc::new(MockGateway::new(behavior));
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = Coordinator::new(
            db.clone(),
            gateway.clone(),
            notifier.clone(),
            Arc::new(TextRenderer),
            test_config(),
        );
        (coordinator, db, gateway, notifier)
    }

    fn request(branch: &str, ticket: &str) -> StampingRequest {
        StampingRequest {
            fiscal_document: json!({
                "Serie": "A",
                "Emisor": {"Rfc": "ICC010101ABC"},
                "Receptor": {"Rfc": "XAXX010101000", "DomicilioFiscalReceptor": "06600"},
                "SubTotal": "100.00",
                "Total": "116.00"
            }),
            branch_id: branch.to_string(),
            ticket_id: ticket.to_string(),
            certificate_id: "cert-01".to_string(),
            sale_date: "2026-08-01".to_string(),
            receiver_email: Some("cliente@example.com".to_string()),
            address: None,
            company: None,
        }
    }

    // -------------------------------------------------------------------------
    // Scenarios
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_successful_stamp_records_folio_and_audit() {
        let (coordinator, db, _gateway, notifier) = harness(IssueBehavior::Succeed).await;
        db.folios().provision("182", 999).await.unwrap();

        let stamped = coordinator.stamp(request("182", "T-1")).await.unwrap();

        assert_eq!(stamped.invoice.folio, 1000);
        assert_eq!(stamped.invoice.status, InvoiceStatus::Vigente);
        assert_eq!(db.folios().current("182").await.unwrap(), Some(1000));

        let audit = db.audit().list_for_ticket("T-1").await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].outcome, AuditOutcome::Success);
        assert_eq!(audit[0].issuer_rfc.as_deref(), Some("ICC010101ABC"));

        assert_eq!(notifier.deliveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recorded_folio_matches_document_folio() {
        let (coordinator, db, _gateway, _notifier) = harness(IssueBehavior::Succeed).await;
        db.folios().provision("182", 999).await.unwrap();

        let stamped = coordinator.stamp(request("182", "T-1")).await.unwrap();

        let document: Value = serde_json::from_str(&stamped.invoice.fiscal_document).unwrap();
        assert_eq!(document["Folio"], json!(stamped.invoice.folio));
    }

    #[tokio::test]
    async fn test_duplicate_ticket_is_rejected_without_second_stamp() {
        let (coordinator, db, gateway, _notifier) = harness(IssueBehavior::Succeed).await;
        db.folios().provision("182", 999).await.unwrap();

        coordinator.stamp(request("182", "T-1")).await.unwrap();
        let err = coordinator.stamp(request("182", "T-1")).await.unwrap_err();

        assert!(matches!(err, StampError::DuplicateTicket { .. }));
        // The provider saw exactly one issue call; the replay never got there.
        assert_eq!(gateway.issue_calls(), 1);
        // The replay's folio reservation was released.
        assert_eq!(db.folios().current("182").await.unwrap(), Some(1000));
        // Still exactly one invoice.
        assert!(db.invoices().get_by_ticket("T-1").await.unwrap().is_some());
        assert_eq!(db.invoices().count_for_branch("182").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ticket_ids_are_normalized_before_dedup() {
        let (coordinator, db, _gateway, _notifier) = harness(IssueBehavior::Succeed).await;
        db.folios().provision("182", 999).await.unwrap();

        coordinator.stamp(request("182", "  t-1 ")).await.unwrap();
        let err = coordinator.stamp(request("182", "T-1")).await.unwrap_err();

        assert!(matches!(err, StampError::DuplicateTicket { .. }));
    }

    #[tokio::test]
    async fn test_provider_rejection_rolls_back_everything() {
        let (coordinator, db, _gateway, _notifier) = harness(IssueBehavior::Reject(
            "CFDI33136 - El campo DomicilioFiscalReceptor es invalido".to_string(),
        ))
        .await;
        db.folios().provision("182", 1001).await.unwrap();

        let err = coordinator.stamp(request("182", "T-2")).await.unwrap_err();

        match &err {
            StampError::StampingValidation { message } => {
                assert!(message.contains("DomicilioFiscalReceptor"))
            }
            other => panic!("expected StampingValidation, got {other:?}"),
        }

        // Counter back to its pre-attempt value, marker gone.
        assert_eq!(db.folios().current("182").await.unwrap(), Some(1001));
        assert!(db.tickets().get("T-2").await.unwrap().is_none());
        // No invoice for a failed attempt.
        assert!(db.invoices().get_by_ticket("T-2").await.unwrap().is_none());

        // The audit entry carries the provider message verbatim.
        let audit = db.audit().list_for_ticket("T-2").await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].outcome, AuditOutcome::Error);
        assert!(audit[0].message.contains("DomicilioFiscalReceptor"));
    }

    #[tokio::test]
    async fn test_transport_failure_rolls_back_everything() {
        let (coordinator, db, _gateway, _notifier) =
            harness(IssueBehavior::Fail("connection reset".to_string())).await;
        db.folios().provision("182", 1001).await.unwrap();

        let err = coordinator.stamp(request("182", "T-3")).await.unwrap_err();

        assert!(matches!(err, StampError::Transport(_)));
        assert_eq!(db.folios().current("182").await.unwrap(), Some(1001));
        assert!(db.tickets().get("T-3").await.unwrap().is_none());

        let audit = db.audit().list_for_ticket("T-3").await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].outcome, AuditOutcome::Error);
    }

    #[tokio::test]
    async fn test_sequential_tickets_get_consecutive_folios() {
        let (coordinator, db, _gateway, _notifier) = harness(IssueBehavior::Succeed).await;
        db.folios().provision("182", 1000).await.unwrap();

        let first = coordinator.stamp(request("182", "T-A")).await.unwrap();
        let second = coordinator.stamp(request("182", "T-B")).await.unwrap();

        assert_eq!(first.invoice.folio, 1001);
        assert_eq!(second.invoice.folio, 1002);
    }

    #[tokio::test]
    async fn test_unknown_branch_fails_before_any_external_call() {
        let (coordinator, db, gateway, _notifier) = harness(IssueBehavior::Succeed).await;

        let err = coordinator.stamp(request("999", "T-1")).await.unwrap_err();

        assert!(matches!(err, StampError::Configuration { .. }));
        assert_eq!(gateway.auth_calls(), 0);
        assert_eq!(gateway.issue_calls(), 0);
        // No marker was claimed either.
        assert!(db.tickets().get("T-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_attempt_frees_ticket_for_resubmission() {
        let (coordinator, db, _gateway, _notifier) =
            harness(IssueBehavior::Reject("rejected".to_string())).await;
        db.folios().provision("182", 999).await.unwrap();

        coordinator.stamp(request("182", "T-1")).await.unwrap_err();

        // A fresh coordinator whose provider accepts can stamp the same
        // ticket: the rollback released the marker.
        let gateway = Arc::new(MockGateway::new(IssueBehavior::Succeed));
        let retry = Coordinator::new(
            db.clone(),
            gateway,
            Arc::new(RecordingNotifier::default()),
            Arc::new(TextRenderer),
            test_config(),
        );
        let stamped = retry.stamp(request("182", "T-1")).await.unwrap();
        assert_eq!(stamped.invoice.folio, 1000);
    }

    #[tokio::test]
    async fn test_persistence_failure_enqueues_reconciliation() {
        let (coordinator, db, _gateway, _notifier) = harness(IssueBehavior::Succeed).await;
        db.folios().provision("182", 999).await.unwrap();

        // Occupy the (branch, folio) slot the attempt will try to use, so
        // the post-stamp insert hits a unique violation.
        let blocker = InvoiceRecord {
            uuid: "pre-existing".to_string(),
            branch_id: "182".to_string(),
            folio: 1000,
            ticket_id: "OTHER".to_string(),
            certificate_id: "cert-01".to_string(),
            status: InvoiceStatus::Vigente,
            fiscal_document: "{}".to_string(),
            qr_code: "qr".to_string(),
            seal_chain: "seal".to_string(),
            stamped_at: None,
            created_at: Utc::now(),
        };
        db.invoices().insert(&blocker).await.unwrap();

        let err = coordinator.stamp(request("182", "T-1")).await.unwrap_err();
        assert!(matches!(err, StampError::Persistence(_)));

        // The stamped invoice is parked durably for the background drain.
        let pending = db.reconciliation().pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].ticket_id, "T-1");

        // The stamp happened: no rollback. Marker stays, counter stays.
        assert!(db.tickets().get("T-1").await.unwrap().is_some());
        assert_eq!(db.folios().current("182").await.unwrap(), Some(1000));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_change_outcome() {
        let (coordinator, db, _gateway, _notifier) = harness(IssueBehavior::Succeed).await;
        db.folios().provision("182", 999).await.unwrap();

        // Break the audit sink only.
        sqlx::query("DROP TABLE audit_trail")
            .execute(db.pool())
            .await
            .unwrap();

        let stamped = coordinator.stamp(request("182", "T-1")).await.unwrap();
        assert_eq!(stamped.invoice.folio, 1000);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_undo_stamp() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.folios().provision("182", 999).await.unwrap();
        let coordinator = Coordinator::new(
            db.clone(),
            Arc::new(MockGateway::new(IssueBehavior::Succeed)),
            Arc::new(FailingNotifier),
            Arc::new(TextRenderer),
            test_config(),
        );

        let stamped = coordinator.stamp(request("182", "T-1")).await.unwrap();

        assert_eq!(stamped.invoice.folio, 1000);
        assert!(db.invoices().get_by_ticket("T-1").await.unwrap().is_some());
        // Success audit entry intact despite the failed fan-out.
        let audit = db.audit().list_for_ticket("T-1").await.unwrap();
        assert_eq!(audit[0].outcome, AuditOutcome::Success);
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_and_still_rolls_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.folios().provision("182", 999).await.unwrap();

        let mut config = test_config();
        config.attempt_deadline = Duration::ZERO;

        let gateway = Arc::new(MockGateway::new(IssueBehavior::Succeed));
        let coordinator = Coordinator::new(
            db.clone(),
            gateway.clone(),
            Arc::new(RecordingNotifier::default()),
            Arc::new(TextRenderer),
            config,
        );

        let err = coordinator.stamp(request("182", "T-1")).await.unwrap_err();

        assert!(matches!(err, StampError::Transport(_)));
        assert_eq!(gateway.issue_calls(), 0);
        // Rollback ran outside the expired budget.
        assert_eq!(db.folios().current("182").await.unwrap(), Some(999));
        assert!(db.tickets().get("T-1").await.unwrap().is_none());
    }

    // -------------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_cancel_flips_status_once() {
        let (coordinator, db, _gateway, _notifier) = harness(IssueBehavior::Succeed).await;
        db.folios().provision("182", 999).await.unwrap();

        let stamped = coordinator.stamp(request("182", "T-1")).await.unwrap();
        let uuid = stamped.invoice.uuid.clone();

        let cancelled = coordinator
            .cancel(&uuid, "ICC010101ABC", "02")
            .await
            .unwrap();
        assert_eq!(cancelled.status, InvoiceStatus::Cancelada);

        let err = coordinator
            .cancel(&uuid, "ICC010101ABC", "02")
            .await
            .unwrap_err();
        assert!(matches!(err, StampError::StampingValidation { .. }));
    }

    #[tokio::test]
    async fn test_cancel_unknown_uuid_is_caller_error() {
        let (coordinator, _db, _gateway, _notifier) = harness(IssueBehavior::Succeed).await;

        let err = coordinator
            .cancel("never-stamped", "ICC010101ABC", "02")
            .await
            .unwrap_err();
        assert!(err.is_caller_error());
    }
}
