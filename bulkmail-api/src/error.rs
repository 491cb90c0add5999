//! API error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bulkmail_delivery::DispatchError;
use bulkmail_ledger::LedgerError;
use bulkmail_vault::{CredentialError, CryptoError, SettingsError};
use serde_json::json;
use thiserror::Error;

/// Errors that can occur while starting or running the server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("Failed to bind API server to {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("Invalid user header {0:?}")]
    InvalidHeader(String),

    /// API server encountered a runtime error
    #[error("API server error: {0}")]
    Server(String),
}

/// A request that could not be served.
///
/// Rendered as `{"success": false, "error": "...", "details": [...]}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Settings(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
            Self::Dispatch(DispatchError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Dispatch(DispatchError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Dispatch(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
            Self::Credentials(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
            Self::Dispatch(_)
            | Self::Settings(_)
            | Self::Credentials(_)
            | Self::Crypto(_)
            | Self::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Vec<String> {
        match self {
            Self::Dispatch(DispatchError::Validation(e)) => e.errors.clone(),
            _ => Vec::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
            "details": self.details(),
        }));

        (status, body).into_response()
    }
}
