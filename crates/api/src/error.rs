//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::{BookingError, PaymentWebhookError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Booking saga error.
    Booking(BookingError),
    /// Payment notification error.
    PaymentWebhook(PaymentWebhookError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Booking(err) => booking_error_to_response(err),
            ApiError::PaymentWebhook(err) => payment_webhook_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn booking_error_to_response(err: BookingError) -> (StatusCode, String) {
    match &err {
        BookingError::Invalid(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        BookingError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        BookingError::NoProviderAvailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        BookingError::RolledBack { .. } => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        BookingError::CompensationFailed { .. } | BookingError::Internal(_) => {
            tracing::error!(error = %err, "booking failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn payment_webhook_error_to_response(err: PaymentWebhookError) -> (StatusCode, String) {
    match &err {
        PaymentWebhookError::InvalidSignature => (StatusCode::UNAUTHORIZED, err.to_string()),
        PaymentWebhookError::UnknownStatus(_) | PaymentWebhookError::InvalidOrderId(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        PaymentWebhookError::BookingNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        PaymentWebhookError::Storage(_) | PaymentWebhookError::Outbox(_) => {
            tracing::error!(error = %err, "payment notification failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError::Booking(err)
    }
}

impl From<PaymentWebhookError> for ApiError {
    fn from(err: PaymentWebhookError) -> Self {
        ApiError::PaymentWebhook(err)
    }
}
