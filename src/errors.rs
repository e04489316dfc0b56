use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

use crate::payments::GatewayError;

/// Body returned by the HTTP surface when an operation fails
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Internal Server Error")
    pub error: String,
    /// Stable machine-readable code, see [`ServiceError::code`]
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Order is not refundable: {0}")]
    NotRefundable(String),

    #[error("Refund not allowed: {0}")]
    RefundNotAllowed(String),

    #[error("Refund validation error: {0}")]
    RefundValidation(String),

    #[error("Invalid credit: {0}")]
    InvalidCredit(String),

    #[error("Order build failed: {0}")]
    OrderBuildFailed(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// Stable error code. Callers match on these, so they never change.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidOrder(_) => "invalid_order",
            Self::NotRefundable(_) => "not_refundable",
            Self::RefundNotAllowed(_) => "refund_not_allowed",
            Self::RefundValidation(_) => "refund_validation_error",
            Self::InvalidCredit(_) => "invalid_credit",
            Self::OrderBuildFailed(_) => "order_build_failed",
            Self::Gateway(_) => "gateway_error",
            Self::SerializationError(_) => "serialization_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::InvalidOrder(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::RefundValidation(_)
            | Self::InvalidCredit(_)
            | Self::OrderBuildFailed(_) => StatusCode::BAD_REQUEST,
            Self::NotRefundable(_) => StatusCode::CONFLICT,
            Self::RefundNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_) | Self::SerializationError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::SerializationError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// True for the refund business-rule failures that leave the store untouched.
    pub fn is_refund_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidOrder(_)
                | Self::NotRefundable(_)
                | Self::RefundNotAllowed(_)
                | Self::RefundValidation(_)
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
