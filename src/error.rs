use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::{auth::repo::StoreError, mail::MailError};

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad or duplicate input (400).
    #[error("{0}")]
    Validation(String),

    /// Bad credentials, bad reset token or missing session (401).
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// Mail transport failed after reset state was rolled back (500).
    #[error("Email could not be sent")]
    Delivery(#[source] MailError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid_credentials() -> Self {
        Self::Unauthorized("Invalid credentials".into())
    }

    pub fn not_authorized() -> Self {
        Self::Unauthorized("Not authorized to access this route".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Delivery(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AppError::Validation("Duplicate field value entered".into()),
            StoreError::NotFound => AppError::NotFound("User not found".into()),
            StoreError::Database(e) => AppError::Internal(e.into()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(status = %rejection.status(), "rejected request body");
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                error!(error = %e, "internal error");
                "Server Error".to_string()
            }
            AppError::Delivery(e) => {
                error!(error = %e, "mail delivery failed");
                self.to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
