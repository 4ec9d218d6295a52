//! # Stamping Gateway Client
//!
//! Authenticates against the external fiscal-stamping provider and submits
//! documents for certification.
//!
//! ## Call Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Stamping Gateway Flow                              │
//! │                                                                         │
//! │  ┌────────────────┐     ┌─────────────────────┐                        │
//! │  │  Coordinator   │     │  Stamping Provider  │                        │
//! │  └───────┬────────┘     └──────────┬──────────┘                        │
//! │          │                         │                                    │
//! │          │  1. authenticate        │                                    │
//! │          │    (user, password)     │                                    │
//! │          │────────────────────────►│                                    │
//! │          │  2. short-lived token   │                                    │
//! │          │◄────────────────────────│                                    │
//! │          │                         │                                    │
//! │          │  3. issue(document)     │                                    │
//! │          │────────────────────────►│  synchronous fiscal validation    │
//! │          │                         │                                    │
//! │          │  4a. Issued(result)     │  signed document, uuid, QR,       │
//! │          │◄────────────────────────│  seal chain                       │
//! │          │  4b. Rejected(message)  │  e.g. bad receiver postal code    │
//! │          │◄────────────────────────│                                    │
//! │          │                         │                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## No Token Caching
//! Tokens are short-lived and attempts are rare relative to token lifetime
//! games: every attempt re-authenticates. A cached-but-expired token would
//! turn into a mid-attempt transport failure after the folio is already
//! reserved - re-authenticating keeps the failure window in step 1.
//!
//! ## Rejections Are Not Errors
//! The provider validates synchronously and says "no" in a structured body.
//! That is an expected outcome and comes back as
//! [`StampOutcome::Rejected`]; only network/protocol problems surface as
//! [`StampError::Transport`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use timbra_core::{FiscalResult, StampError, StampOutcome, StampResult};

use crate::config::ProviderSettings;

// =============================================================================
// Bearer Token
// =============================================================================

/// Short-lived provider token. Never stored beyond the attempt.
#[derive(Debug, Clone)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        BearerToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Gateway Trait
// =============================================================================

/// Seam between the coordinator and the provider.
///
/// The coordinator only ever sees this trait; tests substitute a double
/// with call counters to prove no provider call happens on the fail-fast
/// paths.
#[async_trait]
pub trait StampingGateway: Send + Sync {
    /// Obtains a short-lived bearer token. No caching.
    async fn authenticate(&self) -> StampResult<BearerToken>;

    /// Submits a document for certification.
    async fn issue(&self, document: &Value, token: &BearerToken) -> StampResult<StampOutcome>;

    /// Requests cancellation of a previously issued invoice.
    async fn cancel(
        &self,
        issuer_rfc: &str,
        uuid: &str,
        reason: &str,
        token: &BearerToken,
    ) -> StampResult<()>;
}

// =============================================================================
// Provider Wire Types
// =============================================================================

/// Envelope every provider response arrives in.
#[derive(Debug, Deserialize)]
struct ProviderEnvelope<T> {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

impl<T> ProviderEnvelope<T> {
    fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error")
    }

    fn message_or(&self, fallback: &str) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
struct AuthData {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueData {
    uuid: String,
    document: String,
    qr_code: String,
    seal_chain: String,
    #[serde(default)]
    stamped_at: Option<String>,
}

impl From<IssueData> for FiscalResult {
    fn from(data: IssueData) -> Self {
        FiscalResult {
            uuid: data.uuid,
            document: data.document,
            qr_code: data.qr_code,
            seal_chain: data.seal_chain,
            stamped_at: data.stamped_at,
        }
    }
}

// =============================================================================
// HTTP Gateway
// =============================================================================

/// reqwest-backed gateway against the real provider.
pub struct HttpStampingGateway {
    client: Client,
    settings: ProviderSettings,
}

impl HttpStampingGateway {
    /// Builds a gateway with per-call timeouts baked into the client.
    pub fn new(settings: ProviderSettings, call_timeout: Duration) -> StampResult<Self> {
        let client = Client::builder()
            .timeout(call_timeout)
            .connect_timeout(call_timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| StampError::transport(e.to_string()))?;

        Ok(HttpStampingGateway { client, settings })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl StampingGateway for HttpStampingGateway {
    async fn authenticate(&self) -> StampResult<BearerToken> {
        debug!("Authenticating against stamping provider");

        let response = self
            .client
            .post(self.endpoint("security/authenticate"))
            .json(&serde_json::json!({
                "user": self.settings.username,
                "password": self.settings.password,
            }))
            .send()
            .await
            .map_err(|e| StampError::transport(format!("provider authenticate: {e}")))?;

        let envelope: ProviderEnvelope<AuthData> = response
            .json()
            .await
            .map_err(|e| StampError::transport(format!("provider authenticate decode: {e}")))?;

        if envelope.is_error() {
            // An account problem, not a document problem: the caller cannot
            // fix it by editing the invoice.
            return Err(StampError::transport(
                envelope.message_or("provider rejected credentials"),
            ));
        }

        let data = envelope
            .data
            .ok_or_else(|| StampError::transport("provider authenticate: missing token"))?;

        Ok(BearerToken::new(data.token))
    }

    async fn issue(&self, document: &Value, token: &BearerToken) -> StampResult<StampOutcome> {
        debug!("Submitting document to stamping provider");

        let response = self
            .client
            .post(self.endpoint("issue"))
            .bearer_auth(token.as_str())
            .json(document)
            .send()
            .await
            .map_err(|e| StampError::transport(format!("provider issue: {e}")))?;

        let http_status = response.status();
        let envelope: ProviderEnvelope<IssueData> = response
            .json()
            .await
            .map_err(|e| StampError::transport(format!("provider issue decode: {e}")))?;

        if envelope.is_error() {
            let message = envelope.message_or("provider rejected the document");
            warn!(%message, "Provider rejected document");
            return Ok(StampOutcome::Rejected { message });
        }

        match envelope.data {
            Some(data) => Ok(StampOutcome::Issued(data.into())),
            // A 2xx without a payload is a protocol violation, not a
            // rejection.
            None => Err(StampError::transport(format!(
                "provider issue: {http_status} response without result payload"
            ))),
        }
    }

    async fn cancel(
        &self,
        issuer_rfc: &str,
        uuid: &str,
        reason: &str,
        token: &BearerToken,
    ) -> StampResult<()> {
        debug!(uuid = %uuid, "Requesting invoice cancellation");

        let response = self
            .client
            .post(self.endpoint(&format!("cancel/{issuer_rfc}/{uuid}/{reason}")))
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|e| StampError::transport(format!("provider cancel: {e}")))?;

        let envelope: ProviderEnvelope<Value> = response
            .json()
            .await
            .map_err(|e| StampError::transport(format!("provider cancel decode: {e}")))?;

        if envelope.is_error() {
            return Err(StampError::StampingValidation {
                message: envelope.message_or("provider refused cancellation"),
            });
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_error_detection() {
        let raw = r#"{"status":"error","message":"CFDI33136 - invalid postal code"}"#;
        let envelope: ProviderEnvelope<IssueData> = serde_json::from_str(raw).unwrap();

        assert!(envelope.is_error());
        assert_eq!(
            envelope.message_or("fallback"),
            "CFDI33136 - invalid postal code"
        );
    }

    #[test]
    fn test_issue_data_decodes_camel_case() {
        let raw = r#"{
            "status": "success",
            "data": {
                "uuid": "aaaa-bbbb",
                "document": "<signed/>",
                "qrCode": "qr-bytes",
                "sealChain": "||1.1|aaaa-bbbb||",
                "stampedAt": "2026-08-01T12:00:00"
            }
        }"#;
        let envelope: ProviderEnvelope<IssueData> = serde_json::from_str(raw).unwrap();
        let result: FiscalResult = envelope.data.unwrap().into();

        assert_eq!(result.uuid, "aaaa-bbbb");
        assert_eq!(result.qr_code, "qr-bytes");
        assert_eq!(result.stamped_at.as_deref(), Some("2026-08-01T12:00:00"));
    }

    #[test]
    fn test_envelope_tolerates_missing_fields() {
        let envelope: ProviderEnvelope<AuthData> = serde_json::from_str("{}").unwrap();
        assert!(!envelope.is_error());
        assert!(envelope.data.is_none());
        assert_eq!(envelope.message_or("fallback"), "fallback");
    }

    #[test]
    fn test_endpoint_join_handles_trailing_slash() {
        let gateway = HttpStampingGateway::new(
            ProviderSettings {
                base_url: "http://provider.example/".to_string(),
                username: "u".to_string(),
                password: "p".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(
            gateway.endpoint("security/authenticate"),
            "http://provider.example/security/authenticate"
        );
    }
}
