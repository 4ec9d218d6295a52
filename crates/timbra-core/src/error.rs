//! # Error Types
//!
//! The closed error taxonomy for a stamping attempt.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  timbra-core errors (this file)                                        │
//! │  ├── StampError       - Attempt failures, closed taxonomy              │
//! │  └── ValidationError  - Boundary validation failures                   │
//! │                                                                         │
//! │  timbra-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  API errors (in app)                                                   │
//! │  └── ApiError         - What the caller sees (status + message)        │
//! │                                                                         │
//! │  Flow: ValidationError → StampError → ApiError → HTTP response         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. The coordinator pattern-matches on the variant to pick a rollback scope
//! 3. Errors are enum variants, never String
//! 4. Provider rejection messages are carried verbatim to caller and audit

use thiserror::Error;

// =============================================================================
// Stamp Error
// =============================================================================

/// Failure of a single stamping attempt.
///
/// Stamping is legally irreversible once it succeeds, so every failure kind
/// carries an exact compensation contract - see [`StampError::rollback_scope`].
#[derive(Debug, Error)]
pub enum StampError {
    /// No folio counter has been provisioned for the branch.
    ///
    /// ## When This Occurs
    /// - First sale on a branch an administrator never provisioned
    /// - A request carrying a mistyped branch id
    ///
    /// Raised before any reservation or external call: nothing to undo.
    #[error("No folio counter provisioned for branch {branch_id}, contact an administrator")]
    Configuration { branch_id: String },

    /// The ticket already has a live marker or a stamped invoice.
    ///
    /// A duplicate claim must never reach the provider - the first stamp is
    /// the only stamp. The folio reserved for this attempt is released.
    #[error("Ticket {ticket_id} has already been submitted for stamping")]
    DuplicateTicket { ticket_id: String },

    /// The provider rejected the document during synchronous validation.
    ///
    /// An expected outcome, not an exceptional one: malformed receiver postal
    /// codes, bad tax regimes, etc. The provider message is surfaced verbatim.
    #[error("{message}")]
    StampingValidation { message: String },

    /// Network failure or deadline expiry talking to an external dependency.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The local store failed. If the stamp already succeeded this is the
    /// one window with no compensating action - the attempt is queued for
    /// reconciliation instead.
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

/// How much of a failed attempt's state must be compensated.
///
/// ```text
/// Configuration        → None      (failed before any reservation)
/// DuplicateTicket      → FolioOnly (folio reserved, marker belongs to the
///                                   earlier attempt and must survive)
/// StampingValidation   → Full      (folio + marker)
/// Transport            → Full      (folio + marker)
/// Persistence          → Full      (rollback attempted; may itself fail)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackScope {
    /// Nothing was reserved.
    None,
    /// Release the folio reservation only.
    FolioOnly,
    /// Release the folio reservation and the ticket marker.
    Full,
}

impl StampError {
    /// Shorthand for a transport failure.
    pub fn transport(msg: impl Into<String>) -> Self {
        StampError::Transport(msg.into())
    }

    /// Shorthand for a persistence failure.
    pub fn persistence(msg: impl Into<String>) -> Self {
        StampError::Persistence(msg.into())
    }

    /// The compensation contract for this failure kind.
    pub fn rollback_scope(&self) -> RollbackScope {
        match self {
            StampError::Configuration { .. } => RollbackScope::None,
            StampError::DuplicateTicket { .. } => RollbackScope::FolioOnly,
            StampError::StampingValidation { .. }
            | StampError::Transport(_)
            | StampError::Persistence(_) => RollbackScope::Full,
        }
    }

    /// True when the failure is the caller's input, not our infrastructure.
    ///
    /// Maps to HTTP 400 at the API boundary.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            StampError::Configuration { .. }
                | StampError::DuplicateTicket { .. }
                | StampError::StampingValidation { .. }
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Boundary validation errors.
///
/// These occur before any reservation: a request that fails validation has
/// zero side effects anywhere.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., non-object fiscal document).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with StampError.
pub type StampResult<T> = Result<T, StampError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StampError::Configuration {
            branch_id: "182".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No folio counter provisioned for branch 182, contact an administrator"
        );

        let err = StampError::StampingValidation {
            message: "CFDI33136 - El campo DomicilioFiscalReceptor es invalido".to_string(),
        };
        // Provider messages are surfaced verbatim.
        assert_eq!(
            err.to_string(),
            "CFDI33136 - El campo DomicilioFiscalReceptor es invalido"
        );
    }

    #[test]
    fn test_rollback_scopes() {
        assert_eq!(
            StampError::Configuration {
                branch_id: "x".into()
            }
            .rollback_scope(),
            RollbackScope::None
        );
        assert_eq!(
            StampError::DuplicateTicket {
                ticket_id: "T-1".into()
            }
            .rollback_scope(),
            RollbackScope::FolioOnly
        );
        assert_eq!(
            StampError::StampingValidation {
                message: "bad".into()
            }
            .rollback_scope(),
            RollbackScope::Full
        );
        assert_eq!(
            StampError::transport("timeout").rollback_scope(),
            RollbackScope::Full
        );
        assert_eq!(
            StampError::persistence("disk").rollback_scope(),
            RollbackScope::Full
        );
    }

    #[test]
    fn test_caller_error_classification() {
        assert!(StampError::DuplicateTicket {
            ticket_id: "T-1".into()
        }
        .is_caller_error());
        assert!(StampError::StampingValidation {
            message: "bad".into()
        }
        .is_caller_error());
        assert!(!StampError::transport("down").is_caller_error());
        assert!(!StampError::persistence("down").is_caller_error());
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "ticketId".to_string(),
        };
        assert_eq!(err.to_string(), "ticketId is required");
    }
}
