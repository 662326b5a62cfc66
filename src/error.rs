use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::gateway::error::GatewayError;
use crate::models::ErrorResponse;

/// Error taxonomy for the settlement engine.
///
/// Every component surfaces one of these to its caller; nothing is retried
/// internally. The HTTP layer maps each variant to a status code and an
/// `ErrorResponse` body exactly once, via `IntoResponse`.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("webhook signature verification failed")]
    SignatureInvalid,

    #[error("gateway error (status {status}): {message}")]
    Gateway { status: u16, message: String },

    #[error("store error: {0}")]
    Store(String),
}

impl SettlementError {
    fn status_code(&self) -> StatusCode {
        match self {
            SettlementError::Validation(_) => StatusCode::BAD_REQUEST,
            SettlementError::NotFound(_) => StatusCode::NOT_FOUND,
            SettlementError::PreconditionFailed(_) => StatusCode::CONFLICT,
            SettlementError::SignatureInvalid => StatusCode::BAD_REQUEST,
            SettlementError::Gateway { .. } => StatusCode::BAD_GATEWAY,
            SettlementError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            SettlementError::Validation(_) => "validation_error",
            SettlementError::NotFound(_) => "not_found",
            SettlementError::PreconditionFailed(_) => "precondition_failed",
            SettlementError::SignatureInvalid => "signature_invalid",
            SettlementError::Gateway { .. } => "gateway_error",
            SettlementError::Store(_) => "store_error",
        }
    }
}

impl IntoResponse for SettlementError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::new(self.error_code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

impl From<GatewayError> for SettlementError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::WebhookVerificationFailed => SettlementError::SignatureInvalid,
            // The gateway's own message travels verbatim to the caller.
            GatewayError::ApiError {
                status_code,
                message,
            } => SettlementError::Gateway {
                status: status_code,
                message,
            },
            other => SettlementError::Gateway {
                status: 502,
                message: other.to_string(),
            },
        }
    }
}

impl From<sqlx::Error> for SettlementError {
    fn from(err: sqlx::Error) -> Self {
        SettlementError::Store(err.to_string())
    }
}
