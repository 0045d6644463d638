//! Error types for the web service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::error;

/// Exposes internal error detail in response bodies when set. Flipped once
/// at startup from the application config.
static DEV_MODE: AtomicBool = AtomicBool::new(false);

/// Record the development override for error rendering
pub fn init_dev_mode(dev_mode: bool) {
    DEV_MODE.store(dev_mode, Ordering::Relaxed);
}

fn dev_mode() -> bool {
    DEV_MODE.load(Ordering::Relaxed)
}

/// Field-level validation failure
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Error type for the web service
#[derive(Error, Debug)]
pub enum WebError {
    /// Request payload failed validation
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// Credentials did not verify; deliberately identical for unknown
    /// email and wrong password
    #[error("Invalid email or password")]
    InvalidCredentials { remaining_attempts: Option<u32> },

    /// Login attempts locked out for this client
    #[error("Too many login attempts")]
    TooManyAttempts { remaining_secs: u64 },

    /// Request limit exceeded
    #[error("Too many requests")]
    RateLimited,

    /// No authenticated session
    #[error("No authentication information.")]
    Unauthorized,

    /// Authenticated but not allowed
    #[error("{0}")]
    Forbidden(String),

    /// Resource does not exist
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness conflict, e.g. duplicate email
    #[error("{0}")]
    Conflict(String),

    /// Unexpected failure; detail is logged server-side only
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl WebError {
    /// HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::Validation(_) | WebError::Conflict(_) => StatusCode::BAD_REQUEST,
            WebError::InvalidCredentials { .. } | WebError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            WebError::TooManyAttempts { .. } | WebError::RateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            WebError::Forbidden(_) => StatusCode::FORBIDDEN,
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
            WebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Envelope body for machine clients
    pub fn body(&self) -> serde_json::Value {
        let mut body = json!({
            "success": false,
            "message": self.to_string(),
        });

        match self {
            WebError::Validation(errors) => {
                body["errors"] = json!(errors);
            }
            WebError::InvalidCredentials {
                remaining_attempts: Some(remaining),
            } => {
                body["data"] = json!({ "remaining_attempts": remaining });
            }
            WebError::TooManyAttempts { remaining_secs } => {
                body["data"] = json!({ "remaining_time": remaining_secs });
            }
            WebError::Internal(err) if dev_mode() => {
                body["errors"] = json!(format!("{err:#}"));
            }
            _ => {}
        }

        body
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        if let WebError::Internal(err) = &self {
            error!("Internal server error: {:#}", err);
        }

        (self.status(), Json(self.body())).into_response()
    }
}

/// Type alias for handler results
pub type WebResult<T> = Result<T, WebError>;
