//! # Notification Fan-out
//!
//! Delivers a freshly stamped invoice to the partner system and to the
//! receiver's email. Strictly best-effort: by the time fan-out runs the
//! stamp is legally binding and the ledger is written - nothing that
//! happens here may undo or fail the attempt. The coordinator logs fan-out
//! errors and moves on.
//!
//! ## Delivery Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Notification Fan-out                               │
//! │                                                                         │
//! │  Coordinator (after Stamped)                                           │
//! │       │                                                                 │
//! │       ├──► Partner API                                                 │
//! │       │    1. POST /token        (form-encoded credentials)            │
//! │       │    2. POST /invoices     (JSON + bearer token)                 │
//! │       │                                                                 │
//! │       └──► Email relay                                                 │
//! │            POST /send            (rendered document attached)          │
//! │                                                                         │
//! │  Unconfigured targets are skipped; failures are returned for           │
//! │  logging, never propagated into the attempt outcome.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use timbra_core::{is_plausible_email, InvoiceRecord, StampError, StampResult, StampingRequest};

use crate::config::{EmailSettings, PartnerSettings};

// =============================================================================
// Notifier Trait
// =============================================================================

/// Seam for the fan-out step so coordinator tests can observe (or fail)
/// deliveries without a network.
#[async_trait]
pub trait InvoiceNotifier: Send + Sync {
    /// Delivers the stamped invoice. Errors are for the caller's logs only.
    async fn deliver(
        &self,
        invoice: &InvoiceRecord,
        request: &StampingRequest,
        rendered: &[u8],
    ) -> StampResult<()>;
}

// =============================================================================
// HTTP Notifier
// =============================================================================

/// reqwest-backed notifier for the partner API and the email relay.
pub struct HttpNotifier {
    client: Client,
    partner: Option<PartnerSettings>,
    email: Option<EmailSettings>,
}

#[derive(Debug, Deserialize)]
struct PartnerTokenResponse {
    access_token: String,
}

impl HttpNotifier {
    pub fn new(
        partner: Option<PartnerSettings>,
        email: Option<EmailSettings>,
        call_timeout: Duration,
    ) -> StampResult<Self> {
        let client = Client::builder()
            .timeout(call_timeout)
            .connect_timeout(call_timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| StampError::transport(e.to_string()))?;

        Ok(HttpNotifier {
            client,
            partner,
            email,
        })
    }

    fn partner_payload(
        invoice: &InvoiceRecord,
        request: &StampingRequest,
        rendered: &[u8],
    ) -> Value {
        // Totals live inside the opaque document; forward them when present.
        let subtotal = request
            .fiscal_document
            .get("SubTotal")
            .cloned()
            .unwrap_or(Value::Null);
        let total = request
            .fiscal_document
            .get("Total")
            .cloned()
            .unwrap_or(Value::Null);

        serde_json::json!({
            "issuerRfc": request.issuer_rfc(),
            "receiverRfc": request.receiver_rfc(),
            "branchId": invoice.branch_id,
            "series": request.series(),
            "folio": invoice.folio.to_string(),
            "uuid": invoice.uuid,
            "ticketId": invoice.ticket_id,
            "saleDate": request.sale_date,
            "subtotal": subtotal,
            "total": total,
            "stampedAt": invoice.stamped_at,
            "document": invoice.fiscal_document,
            "renderedB64": base64::engine::general_purpose::STANDARD.encode(rendered),
        })
    }

    async fn deliver_to_partner(
        &self,
        settings: &PartnerSettings,
        invoice: &InvoiceRecord,
        request: &StampingRequest,
        rendered: &[u8],
    ) -> StampResult<()> {
        let base = settings.base_url.trim_end_matches('/');

        // Token exchange is form-encoded, unlike everything else the
        // partner exposes.
        let token: PartnerTokenResponse = self
            .client
            .post(format!("{base}/token"))
            .form(&[
                ("username", settings.username.as_str()),
                ("password", settings.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StampError::transport(format!("partner token: {e}")))?
            .json()
            .await
            .map_err(|e| StampError::transport(format!("partner token decode: {e}")))?;

        let response = self
            .client
            .post(format!("{base}/invoices"))
            .bearer_auth(&token.access_token)
            .json(&Self::partner_payload(invoice, request, rendered))
            .send()
            .await
            .map_err(|e| StampError::transport(format!("partner deliver: {e}")))?;

        if !response.status().is_success() {
            return Err(StampError::transport(format!(
                "partner deliver: HTTP {}",
                response.status()
            )));
        }

        info!(uuid = %invoice.uuid, "Invoice delivered to partner");
        Ok(())
    }

    async fn deliver_by_email(
        &self,
        settings: &EmailSettings,
        invoice: &InvoiceRecord,
        recipient: &str,
        rendered: &[u8],
    ) -> StampResult<()> {
        let response = self
            .client
            .post(&settings.relay_url)
            .json(&serde_json::json!({
                "from": settings.sender,
                "to": recipient,
                "subject": format!("Factura del ticket {}", invoice.ticket_id),
                "body": format!(
                    "Se adjunta la factura del ticket {}. Agradecemos su preferencia.",
                    invoice.ticket_id
                ),
                "attachments": [{
                    "filename": format!("{}.txt", invoice.uuid),
                    "contentB64": base64::engine::general_purpose::STANDARD.encode(rendered),
                }],
            }))
            .send()
            .await
            .map_err(|e| StampError::transport(format!("email relay: {e}")))?;

        if !response.status().is_success() {
            return Err(StampError::transport(format!(
                "email relay: HTTP {}",
                response.status()
            )));
        }

        info!(uuid = %invoice.uuid, recipient = %recipient, "Invoice emailed");
        Ok(())
    }
}

#[async_trait]
impl InvoiceNotifier for HttpNotifier {
    async fn deliver(
        &self,
        invoice: &InvoiceRecord,
        request: &StampingRequest,
        rendered: &[u8],
    ) -> StampResult<()> {
        let mut first_error: Option<StampError> = None;

        match &self.partner {
            Some(settings) => {
                if let Err(e) = self
                    .deliver_to_partner(settings, invoice, request, rendered)
                    .await
                {
                    first_error.get_or_insert(e);
                }
            }
            None => debug!("Partner delivery not configured, skipping"),
        }

        // Email runs even when partner delivery failed - the two targets
        // are independent.
        match (&self.email, &request.receiver_email) {
            (Some(settings), Some(recipient)) if is_plausible_email(recipient) => {
                if let Err(e) = self
                    .deliver_by_email(settings, invoice, recipient, rendered)
                    .await
                {
                    first_error.get_or_insert(e);
                }
            }
            _ => debug!("Email delivery skipped (unconfigured or no plausible recipient)"),
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use timbra_core::InvoiceStatus;

    fn invoice() -> InvoiceRecord {
        InvoiceRecord {
            uuid: "aaaa-bbbb".to_string(),
            branch_id: "182".to_string(),
            folio: 1000,
            ticket_id: "T-1".to_string(),
            certificate_id: "cert-01".to_string(),
            status: InvoiceStatus::Vigente,
            fiscal_document: "<signed/>".to_string(),
            qr_code: "qr".to_string(),
            seal_chain: "seal".to_string(),
            stamped_at: None,
            created_at: Utc::now(),
        }
    }

    fn request() -> StampingRequest {
        StampingRequest {
            fiscal_document: json!({
                "Serie": "A",
                "SubTotal": "100.00",
                "Total": "116.00",
                "Emisor": {"Rfc": "ICC010101ABC"},
                "Receptor": {"Rfc": "XAXX010101000"}
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
    fn test_partner_payload_shape() {
        let payload = HttpNotifier::partner_payload(&invoice(), &request(), b"doc");

        assert_eq!(payload["issuerRfc"], "ICC010101ABC");
        assert_eq!(payload["folio"], "1000");
        assert_eq!(payload["total"], "116.00");
        assert_eq!(payload["uuid"], "aaaa-bbbb");
        // Rendered bytes travel base64-encoded.
        assert_eq!(payload["renderedB64"], "ZG9j");
    }

    #[tokio::test]
    async fn test_unconfigured_notifier_is_a_noop() {
        let notifier = HttpNotifier::new(None, None, Duration::from_secs(1)).unwrap();
        let result = notifier.deliver(&invoice(), &request(), b"doc").await;
        assert!(result.is_ok());
    }
}
