//! # API Error Types
//!
//! Every error leaves the server as `{"message": ...}` with a status code.
//! Caller errors (bad input, duplicates, provider rejections) carry their
//! real message - the provider's rejection text reaches the caller
//! verbatim. Infrastructure failures are logged in full and leave only a
//! generic message; internal detail is not a response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use timbra_core::{StampError, ValidationError};
use timbra_db::DbError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

/// API-boundary error: status code plus caller-facing message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal() -> Self {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal error, contact support",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<StampError> for ApiError {
    fn from(err: StampError) -> Self {
        if err.is_caller_error() {
            // Configuration, duplicate and provider-rejection messages are
            // safe and useful for the caller.
            ApiError::bad_request(err.to_string())
        } else {
            error!(error = %err, "Stamping attempt failed");
            ApiError::internal()
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match &err {
            DbError::UniqueViolation { .. } => {
                ApiError::new(StatusCode::CONFLICT, err.to_string())
            }
            DbError::NotFound { .. } => ApiError::new(StatusCode::NOT_FOUND, err.to_string()),
            _ => {
                error!(error = %err, "Database operation failed");
                ApiError::internal()
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_errors_keep_their_message() {
        let api: ApiError = StampError::StampingValidation {
            message: "CFDI33136 - invalid postal code".to_string(),
        }
        .into();

        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.message, "CFDI33136 - invalid postal code");
    }

    #[test]
    fn test_infrastructure_errors_are_masked() {
        let api: ApiError = StampError::transport("provider: connection reset by peer").into();

        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.message.contains("connection reset"));
    }

    #[test]
    fn test_db_error_mapping() {
        let api: ApiError = DbError::duplicate("folio_counters.branch_id", "182").into();
        assert_eq!(api.status, StatusCode::CONFLICT);

        let api: ApiError = DbError::not_found("Invoice (vigente)", "u-1").into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);
    }
}
