//! # Validation Module
//!
//! Boundary validation for stamping requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: API boundary (this module)                                   │
//! │  ├── Closed request type deserialization                               │
//! │  └── Field checks BEFORE any folio reservation                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                            │
//! │  ├── PRIMARY KEY on ticket markers (dedup guard)                       │
//! │  └── PRIMARY KEY on folio counters                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Stamping provider                                            │
//! │  └── Full fiscal validation of the document itself                     │
//! │                                                                         │
//! │  A request that fails Layer 1 has zero side effects anywhere.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::StampingRequest;
use crate::{MAX_BRANCH_ID_LEN, MAX_TICKET_ID_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Ticket Normalization
// =============================================================================

/// Canonical normalization of a ticket id: ASCII-whitespace trim, uppercase.
///
/// This is the **single** normalization applied anywhere in the service -
/// the dedup guard, the invoice record and the audit trail all store the
/// same form. Hyphens are significant: "T-1" and "T1" are distinct tickets.
/// Widening the key (e.g. stripping separators) is a product decision, not
/// a formatting one, and is deliberately not done here.
pub fn normalize_ticket_id(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

// =============================================================================
// Request Validation
// =============================================================================

/// Validates a stamping request at the API boundary.
///
/// ## Rules
/// - `branchId`, `ticketId`, `certificateId`, `saleDate` must be non-empty
/// - `branchId` and `ticketId` are length-bounded
/// - `fiscalDocument` must be a JSON object (its contents stay opaque)
///
/// ## Example
/// ```rust,ignore
/// validate_request(&request)?;
/// let ticket_id = normalize_ticket_id(&request.ticket_id);
/// ```
pub fn validate_request(request: &StampingRequest) -> ValidationResult<()> {
    validate_required("branchId", &request.branch_id)?;
    validate_required("ticketId", &request.ticket_id)?;
    validate_required("certificateId", &request.certificate_id)?;
    validate_required("saleDate", &request.sale_date)?;

    if request.branch_id.len() > MAX_BRANCH_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "branchId".to_string(),
            max: MAX_BRANCH_ID_LEN,
        });
    }
    if request.ticket_id.trim().len() > MAX_TICKET_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "ticketId".to_string(),
            max: MAX_TICKET_ID_LEN,
        });
    }

    if !request.fiscal_document.is_object() {
        return Err(ValidationError::InvalidFormat {
            field: "fiscalDocument".to_string(),
            reason: "must be a JSON object".to_string(),
        });
    }

    Ok(())
}

/// Validates that a string field is present and non-blank.
fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Email Plausibility
// =============================================================================

/// Minimal plausibility check used to decide whether delivery is attempted.
///
/// Not an RFC 5322 validator: delivery is best-effort and the relay does the
/// real validation.
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    email.contains('@') && email.len() >= 3
}

// =============================================================================
// Unit Tests
// =============================================================================
