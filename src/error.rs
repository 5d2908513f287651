use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or blank required input, rejected before any I/O.
    #[error("{message}")]
    Validation { field: &'static str, message: String },

    /// Upstream generation call failed; carries the provider's own message.
    #[error("{0}")]
    Provider(String),

    /// Provider answered but nothing usable came back.
    #[error("{0}")]
    NoContent(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("a generation is already in flight for this session")]
    SessionBusy,

    #[error("{0} not found")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn missing(field: &'static str) -> Self {
        AppError::Validation {
            field,
            message: format!("Missing required field: {field}"),
        }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Provider(_) | AppError::NoContent(_) => StatusCode::BAD_GATEWAY,
            AppError::SessionBusy => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation { field, message } => json!({ "error": message, "field": field }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<rocksdb::Error> for AppError {
    fn from(err: rocksdb::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
