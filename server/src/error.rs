//! HTTP error mapping.
//!
//! Every failure leaves the daemon as `{errorCode, message}`.  An aborted
//! execution also carries its id and the terminal ledger entry so the
//! caller can see what was recorded.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use warden_contracts::{ErrorCode, LedgerRecord, WardenError};

/// A `WardenError` on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub WardenError);

impl From<WardenError> for ApiError {
    fn from(e: WardenError) -> Self {
        Self(e)
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error_code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_audit_entry: Option<LedgerRecord>,
}

/// HTTP status for each wire code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::RateLimited | ErrorCode::CooldownActive => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::GovernanceBlocked => StatusCode::FORBIDDEN,
        ErrorCode::InvalidResource => StatusCode::BAD_REQUEST,
        ErrorCode::FileNotFound | ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::ResourceLocked => StatusCode::LOCKED,
        ErrorCode::InternalFailure | ErrorCode::ConfigError => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::IntegrityViolation => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = status_for(code);

        if status.is_server_error() {
            error!(code = %code, error = %self.0, "request failed");
        } else if !self.0.is_admission_rejection() {
            warn!(code = %code, error = %self.0, "request failed");
        }

        let message = self.0.to_string();
        let (execution_id, last_audit_entry) = match self.0 {
            WardenError::ExecutionAborted {
                execution_id,
                last_entry,
                ..
            } => (Some(execution_id), last_entry.map(|entry| *entry)),
            _ => (None, None),
        };

        let body = ErrorBody {
            error_code: code,
            message,
            execution_id,
            last_audit_entry,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

// ── Tests ─────────────────────────────────────────────────────────────────────
