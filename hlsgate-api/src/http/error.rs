// HTTP error handling and response envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hlsgate_core::StreamStatus;
use hlsgate_livestream::StreamError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Every endpoint answers with this envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StreamStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            stream_id: None,
            status: None,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn for_stream(mut self, stream_id: impl Into<String>, status: StreamStatus) -> Self {
        self.stream_id = Some(stream_id.into());
        self.status = Some(status);
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            message: self
                .status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            stream_id: None,
            status: None,
            data: None,
            error: Some(self.message),
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<StreamError> for AppError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::NotFound(_) => Self::not_found(err.to_string()),
            StreamError::AlreadyExists(_) => Self::conflict(err.to_string()),
            StreamError::Validation(_) => Self::bad_request(err.to_string()),
            StreamError::DownstreamUnavailable(_) => {
                tracing::warn!("Downstream unavailable: {}", err);
                Self::bad_gateway(err.to_string())
            }
            StreamError::Resource(_) => {
                tracing::error!("Resource error: {}", err);
                Self::internal(err.to_string())
            }
        }
    }
}
