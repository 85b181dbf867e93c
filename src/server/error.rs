//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Message returned with every 503 while the session is not ready.
const NOT_READY_MESSAGE: &str = "Please wait for WhatsApp to connect";

/// Errors a handler can return. Each maps to a fixed `{error, message}` body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("WhatsApp client not ready")]
    NotReady,

    #[error("Not found")]
    NotFound,

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::BadRequest(message) => ErrorBody {
                error: "Bad request",
                message: message.clone(),
            },
            ApiError::NotReady => ErrorBody {
                error: "WhatsApp client not ready",
                message: NOT_READY_MESSAGE.to_string(),
            },
            ApiError::NotFound => ErrorBody {
                error: "Not found",
                message: "The requested resource was not found".to_string(),
            },
            ApiError::Internal(message) => ErrorBody {
                error: "Internal server error",
                message: message.clone(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(message) = &self {
            tracing::error!(error = %message, "Request failed");
        }
        (self.status(), Json(self.body())).into_response()
    }
}
