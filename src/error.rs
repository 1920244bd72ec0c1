//! Error taxonomy for the request pipeline.
//!
//! Handlers and middleware return `Result<(), AppError>`. The pipeline catches
//! `AppError` at its outermost boundary and turns it into a JSON response; a
//! user-supplied error handler may intercept it first (see `container`).

use std::fmt;

use http::StatusCode;
use serde_json::json;

use crate::response::Response;

/// Error kinds the pipeline recognizes, each mapped to a fixed HTTP status.
///
/// `Configuration` is only ever raised during construction (signer, server
/// config) and is never surfaced as an HTTP response.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    PayloadTooLarge(String),
    Timeout,
    Configuration(String),
    Unexpected(anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Timeout => StatusCode::REQUEST_TIMEOUT,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::Validation(m) => m.clone(),
            AppError::Unauthorized(m) => m.clone(),
            AppError::NotFound(m) => m.clone(),
            AppError::Conflict(m) => m.clone(),
            AppError::PayloadTooLarge(m) => m.clone(),
            AppError::Timeout => "Request Timeout".to_string(),
            AppError::Configuration(m) => m.clone(),
            AppError::Unexpected(e) => e.to_string(),
        }
    }

    /// Writes the default JSON error body onto `res` and sets the status.
    ///
    /// Does nothing if the response is already sent (partially-streamed
    /// bodies cannot be rewritten; the connection is closed instead).
    pub fn write_default(&self, res: &mut Response) {
        if res.is_sent() {
            return;
        }
        res.status = self.status_code();
        let _ = res.json(&json!({
            "error": self.message(),
            "statusCode": self.status_code().as_u16(),
        }));
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Unexpected(e)
    }
}
