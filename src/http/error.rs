//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::WbrError;

/// Error body returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub kind: String,
    pub description: String,
}

/// Application error for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Malformed request (missing upload field, bad multipart).
    BadRequest(String),
    /// A pipeline failure, mapped by its kind.
    Engine(WbrError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    kind: "request".to_string(),
                    description: message,
                },
            ),
            AppError::Engine(err) => {
                let status = match &err {
                    WbrError::Config { .. } | WbrError::Data { .. } => StatusCode::BAD_REQUEST,
                    WbrError::Connection { .. } => StatusCode::BAD_GATEWAY,
                    // Internal details stay out of the response body.
                    WbrError::Internal { .. } => {
                        return (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(ApiError {
                                kind: "internal".to_string(),
                                description: "internal error while building the deck".to_string(),
                            }),
                        )
                            .into_response()
                    }
                };
                (
                    status,
                    ApiError {
                        kind: err.kind().to_string(),
                        description: err.to_string(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<WbrError> for AppError {
    fn from(err: WbrError) -> Self {
        AppError::Engine(err)
    }
}
