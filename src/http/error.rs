use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::error::DomainError;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }

    /// Map a service failure onto a response. The recoverable domain errors
    /// become client-facing statuses; anything else is logged and reported
    /// as a 500 with the given message.
    pub fn from_service(err: anyhow::Error, log_message: &'static str) -> Self {
        match err.downcast_ref::<DomainError>() {
            Some(domain_err @ DomainError::InvalidTransition { .. }) => {
                Self::bad_request(domain_err.to_string())
            }
            Some(DomainError::NoPendingEdit) => Self::bad_request("no pending edit to review"),
            Some(DomainError::PermissionDenied) => Self::forbidden("permission denied"),
            Some(DomainError::NotFound) => Self::not_found("not found"),
            None => {
                tracing::error!(error = ?err, "{}", log_message);
                Self::internal(log_message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
