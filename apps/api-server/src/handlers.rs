//! # HTTP Handlers
//!
//! The request/response surface of the stamping service. Bodies are closed
//! DTOs validated before anything is reserved; handler logic is one
//! coordinator or repository call plus mapping.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use timbra_core::{validate_request, InvoiceStatus, StampingRequest};
use timbra_engine::StampedInvoice;

use crate::error::ApiError;
use crate::AppState;

// =============================================================================
// DTOs
// =============================================================================

/// Body of a successful stamping response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampInvoiceResponse {
    pub uuid: String,
    pub folio: i64,
    pub branch_id: String,
    pub ticket_id: String,
    pub status: InvoiceStatus,
    /// The signed fiscal document payload (opaque).
    pub document: String,
    pub qr_code: String,
    pub seal_chain: String,
    pub stamped_at: Option<String>,
    /// Rendered representation, base64-encoded.
    pub rendered_document_b64: String,
}

impl From<StampedInvoice> for StampInvoiceResponse {
    fn from(stamped: StampedInvoice) -> Self {
        let invoice = stamped.invoice;
        StampInvoiceResponse {
            uuid: invoice.uuid,
            folio: invoice.folio,
            branch_id: invoice.branch_id,
            ticket_id: invoice.ticket_id,
            status: invoice.status,
            document: invoice.fiscal_document,
            qr_code: invoice.qr_code,
            seal_chain: invoice.seal_chain,
            stamped_at: invoice.stamped_at,
            rendered_document_b64: base64::engine::general_purpose::STANDARD
                .encode(stamped.rendered_document),
        }
    }
}

/// Body for provisioning a branch folio counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionFolioRequest {
    pub branch_id: String,
    /// Last folio already consumed; the first reservation returns this + 1.
    #[serde(default)]
    pub initial_folio: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolioCounterResponse {
    pub branch_id: String,
    pub current_folio: i64,
}

/// Body for cancelling a stamped invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelInvoiceRequest {
    pub issuer_rfc: String,
    /// Fiscal cancellation reason code (e.g. "02").
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelInvoiceResponse {
    pub uuid: String,
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCountQuery {
    #[serde(default)]
    pub branch_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCountResponse {
    pub branch_id: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /invoices` - run one stamping attempt.
pub async fn stamp_invoice(
    State(state): State<AppState>,
    Json(request): Json<StampingRequest>,
) -> Result<Json<StampInvoiceResponse>, ApiError> {
    debug!(branch_id = %request.branch_id, ticket_id = %request.ticket_id, "stamp_invoice request");

    // Boundary validation happens before any reservation.
    validate_request(&request)?;

    let stamped = state.coordinator.stamp(request).await?;
    Ok(Json(stamped.into()))
}

/// `POST /folios` - provision a branch counter (administrative).
pub async fn provision_folio(
    State(state): State<AppState>,
    Json(request): Json<ProvisionFolioRequest>,
) -> Result<(StatusCode, Json<FolioCounterResponse>), ApiError> {
    if request.branch_id.trim().is_empty() {
        return Err(ApiError::bad_request("branchId is required"));
    }
    if request.initial_folio < 0 {
        return Err(ApiError::bad_request("initialFolio must not be negative"));
    }

    let counter = state
        .db
        .folios()
        .provision(&request.branch_id, request.initial_folio)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(FolioCounterResponse {
            branch_id: counter.branch_id,
            current_folio: counter.current_folio,
        }),
    ))
}

/// `POST /invoices/{uuid}/cancel` - cancellation flow.
pub async fn cancel_invoice(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(request): Json<CancelInvoiceRequest>,
) -> Result<Json<CancelInvoiceResponse>, ApiError> {
    if request.issuer_rfc.trim().is_empty() {
        return Err(ApiError::bad_request("issuerRfc is required"));
    }
    if request.reason.trim().is_empty() {
        return Err(ApiError::bad_request("reason is required"));
    }

    let invoice = state
        .coordinator
        .cancel(&uuid, &request.issuer_rfc, &request.reason)
        .await?;

    Ok(Json(CancelInvoiceResponse {
        uuid: invoice.uuid,
        status: invoice.status,
    }))
}

/// `GET /invoices/count` - issued-invoice count, optionally per branch.
pub async fn invoice_count(
    State(state): State<AppState>,
    Query(query): Query<InvoiceCountQuery>,
) -> Result<Json<InvoiceCountResponse>, ApiError> {
    let count = match &query.branch_id {
        Some(branch_id) => state.db.invoices().count_for_branch(branch_id).await?,
        None => state.db.invoices().count_all().await?,
    };

    Ok(Json(InvoiceCountResponse {
        branch_id: query.branch_id,
        count,
    }))
}

/// `GET /health` - liveness plus database reachability.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = state.db.health_check().await;
    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
