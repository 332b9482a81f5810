use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::resumes::extraction::ExtractError;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthenticated")]
    Unauthenticated,

    /// Carries a user-facing reason: missing role, deactivated account, exhausted entitlement.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Generation returned no usable content")]
    GenerationEmpty,

    #[error("Text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn entitlement_exhausted() -> Self {
        AppError::Forbidden(
            "You have used all your revisions. Purchase a credit pack to continue.".to_string(),
        )
    }

    pub fn invalid_plan(plan_id: &str) -> Self {
        AppError::Validation(format!("Unknown plan '{plan_id}'"))
    }

    /// Stable machine-readable tag, also used as the analytics `error_kind`.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::GenerationEmpty => "GENERATION_EMPTY",
            AppError::ExtractionFailed(_) => "EXTRACTION_FAILED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Llm(_) => "LLM_ERROR",
            AppError::PaymentProvider(_) => "PAYMENT_PROVIDER_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Migration(e) => AppError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::UnsupportedType(what) => {
                AppError::Validation(format!("Unsupported file type '{what}'. Upload a PDF or DOCX."))
            }
            ExtractError::ExtractionFailed(msg) => AppError::ExtractionFailed(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InvalidSignature => {
                (StatusCode::BAD_REQUEST, "Invalid signature".to_string())
            }
            AppError::GenerationEmpty => (
                StatusCode::BAD_GATEWAY,
                "We couldn't generate a revision right now. Please try again.".to_string(),
            ),
            AppError::ExtractionFailed(msg) => {
                tracing::warn!("Extraction failed: {msg}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "We couldn't read that file. Please upload a valid PDF or DOCX.".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "We couldn't generate a revision right now. Please try again.".to_string(),
                )
            }
            AppError::PaymentProvider(msg) => {
                tracing::error!("Payment provider error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "The payment provider is unavailable. Please try again.".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
