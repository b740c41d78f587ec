use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Top-level error type for request handling
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Upstream error: {0}")]
    Upstream(#[from] ForwardError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Startup configuration errors. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Ledger access errors
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Invalid settlement signature: {0}")]
    InvalidSignature(String),

    #[error("Malformed transaction {signature}: {message}")]
    Malformed { signature: String, message: String },
}

/// Upstream forwarding errors
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("Invalid upstream request: {0}")]
    InvalidRequest(String),

    #[error("Proxy request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl AppError {
    /// Status code and the short caller-visible message. Never carries internal detail.
    pub fn status_and_message(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            AppError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                "Bad Request",
                "The request could not be read",
            ),
            AppError::Upstream(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                "Upstream request failed",
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                "An internal error occurred",
            ),
        }
    }

    pub fn error_response(&self) -> (StatusCode, ErrorResponse) {
        let (status, error, message) = self.status_and_message();
        (
            status,
            ErrorResponse {
                error: error.to_string(),
                message: message.to_string(),
            },
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.error_response();
        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {:?}", error))
    }
}

impl From<solana_client::client_error::ClientError> for LedgerError {
    fn from(error: solana_client::client_error::ClientError) -> Self {
        LedgerError::Rpc(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
