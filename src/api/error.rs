// HTTP mapping for domain errors.
// Internal failures are logged and redacted before they reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use super::ApiResponse;
use crate::error::AppError;

fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
        AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
        AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        AppError::Storage(_)
        | AppError::Database(_)
        | AppError::Serialization(_)
        | AppError::Poisoned => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let message = if self.is_client_error() {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
            self.to_string()
        } else {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        };

        (status, Json(ApiResponse::<()>::failed(message))).into_response()
    }
}
