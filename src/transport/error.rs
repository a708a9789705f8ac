//! HTTP error handling and response formatting.
//!
//! Broker and store errors are converted into JSON error responses with a
//! status code matching the failure.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::utils::error::{BrokerError, StoreError};

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("connection {0} not found")]
    ConnectionNotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Broker(BrokerError::TopicNotFound(_)) => (StatusCode::NOT_FOUND, "TOPIC_NOT_FOUND"),
            AppError::Broker(BrokerError::CapacityExceeded(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "CAPACITY_EXCEEDED")
            }
            AppError::Broker(BrokerError::ShuttingDown) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING_DOWN")
            }
            AppError::Broker(BrokerError::RegistryLockTimeout(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "REGISTRY_BUSY")
            }
            AppError::Broker(_) => (StatusCode::INTERNAL_SERVER_ERROR, "BROKER_ERROR"),
            AppError::Store(StoreError::StoreNotFound(_)) => (StatusCode::NOT_FOUND, "STORE_NOT_FOUND"),
            AppError::Store(StoreError::TableNotFound { .. }) => (StatusCode::NOT_FOUND, "TABLE_NOT_FOUND"),
            AppError::Store(StoreError::InvalidStatus(_)) => (StatusCode::BAD_REQUEST, "INVALID_STATUS"),
            AppError::ConnectionNotFound(_) => (StatusCode::NOT_FOUND, "CONNECTION_NOT_FOUND"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!("{code}: {self}");
        }
        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
