//! Error body and status mapping shared by the subscriber and admin endpoints.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::billing::BillingError;
use crate::domain::foundation::DomainError;

/// Structured error body: `{error, message}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// UPPER_SNAKE code for programmatic handling.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub BillingError);

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(BillingError::from(err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BillingError::NotFoundForUser(_) => StatusCode::NOT_FOUND,
            BillingError::InvalidPlan(_)
            | BillingError::RefundNotAllowed { .. }
            | BillingError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            BillingError::InvalidState { .. } | BillingError::AlreadySubscribed(_) => {
                StatusCode::CONFLICT
            }
            BillingError::Gateway(_) => StatusCode::BAD_GATEWAY,
            BillingError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Billing request failed");
        }
        // message() never carries infrastructure or gateway details
        let body = ErrorResponse::new(self.0.code().to_string(), self.0.message());
        (status, Json(body)).into_response()
    }
}
