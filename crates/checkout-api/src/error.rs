//! # API Errors
//!
//! Maps [`CheckoutError`] onto HTTP responses. Messages of non-user-facing
//! errors are replaced with a generic one; the detail only goes to the log.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use checkout_core::CheckoutError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Errors returned by handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Missing or wrong caller identity
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Malformed request that never reached the services
    #[error("{0}")]
    BadRequest(String),

    /// Webhook processing failed after the signature verified.
    /// Always a 5xx so the gateway redelivers.
    #[error("Webhook processing failed: {0}")]
    Webhook(CheckoutError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Wrap a reconciliation failure; signature failures keep their 401
    pub fn webhook(err: CheckoutError) -> Self {
        match err {
            CheckoutError::SignatureVerification => ApiError::Checkout(err),
            other => ApiError::Webhook(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Checkout(err) => checkout_error_to_response(&err),
            ApiError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new(msg, StatusCode::UNAUTHORIZED.as_u16()),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(msg, StatusCode::BAD_REQUEST.as_u16()),
            ),
            ApiError::Webhook(err) => {
                let status = StatusCode::from_u16(err.status_code())
                    .ok()
                    .filter(|s| s.is_server_error())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                error!(error = %err, "webhook processing failed, gateway will redeliver");
                (
                    status,
                    ErrorResponse::new("Webhook processing failed", status.as_u16()),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: &CheckoutError) -> (StatusCode, ErrorResponse) {
    let code = err.status_code();
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        error!(error = %err, "request failed");
    } else {
        warn!(error = %err, "request rejected");
    }

    let message = if err.is_user_facing() {
        err.to_string()
    } else {
        "Internal server error".to_string()
    };

    let mut response = ErrorResponse::new(message, code);
    if err.is_retryable() {
        response = response.with_details("The request may be retried");
    }
    (status, response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400);
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
        assert!(err.details.is_none());
    }

    #[test]
    fn test_checkout_error_conversion() {
        let err = CheckoutError::NotCancellable {
            status: "shipped".to_string(),
        };
        let (status, body) = checkout_error_to_response(&err);
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.error.contains("shipped"));
    }

    #[test]
    fn test_internal_errors_are_masked() {
        let err = CheckoutError::Internal("index out of sync for order o-1".to_string());
        let (status, body) = checkout_error_to_response(&err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Internal server error");
    }

    #[test]
    fn test_retryable_errors_say_so() {
        let err = CheckoutError::GatewayTimeout {
            operation: "create_payment_intent",
            timeout_ms: 10_000,
        };
        let (status, body) = checkout_error_to_response(&err);
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body.details.is_some());
    }

    #[test]
    fn test_webhook_failures_are_server_errors() {
        let conflict = ApiError::webhook(CheckoutError::Conflict {
            order_id: "o-1".to_string(),
        });
        assert_eq!(
            conflict.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let unparsable = ApiError::webhook(CheckoutError::WebhookParse("eof".to_string()));
        assert_eq!(
            unparsable.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let bad_signature = ApiError::webhook(CheckoutError::SignatureVerification);
        assert_eq!(
            bad_signature.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
