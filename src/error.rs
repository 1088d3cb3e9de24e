use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// User-facing message strings. Kept in one place so handlers and tests agree.
pub mod msg {
    pub const MISSING_CONFIGURATION: &str = "Webhook Error: Missing configuration";
    pub const MISSING_SIGNATURE: &str = "Missing signature";
    pub const INVALID_SIGNATURE: &str = "Invalid signature";
    pub const WEBHOOK_PROCESSING_FAILED: &str = "Webhook processing failed";
    pub const PRICING_FAILED: &str = "Failed to fetch pricing data";
    pub const NO_CUSTOMER_ID: &str = "No LemonSqueezy customer ID found";
    pub const USER_NOT_FOUND: &str = "User not found";
}

#[derive(Error, Debug)]
pub enum AppError {
    /// A required secret or environment value is absent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing signature")]
    SignatureMissing,

    #[error("Invalid signature")]
    SignatureInvalid,

    /// Payload failed schema validation.
    #[error("Invalid webhook payload: {0}")]
    WebhookInvalid(String),

    /// Applying Plan/Subscription/User updates failed.
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    /// The billing provider's read API reported an error.
    #[error("LemonSqueezy API error: {0}")]
    UpstreamApi(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Configuration(reason) => {
                tracing::error!("Configuration error: {}", reason);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::MISSING_CONFIGURATION, None)
            }
            AppError::SignatureMissing => {
                tracing::error!("Missing webhook signature");
                (StatusCode::UNAUTHORIZED, msg::MISSING_SIGNATURE, None)
            }
            AppError::SignatureInvalid => {
                tracing::error!("Invalid webhook signature");
                (StatusCode::UNAUTHORIZED, msg::INVALID_SIGNATURE, None)
            }
            // Schema details are logged, never returned to the caller.
            AppError::WebhookInvalid(reason) => {
                tracing::error!("Invalid webhook payload: {}", reason);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::WEBHOOK_PROCESSING_FAILED, None)
            }
            AppError::Reconciliation(reason) => {
                tracing::error!("Error processing webhook data: {}", reason);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::WEBHOOK_PROCESSING_FAILED, None)
            }
            AppError::UpstreamApi(reason) => {
                tracing::error!("Error fetching pricing data: {}", reason);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::PRICING_FAILED, None)
            }
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, "Not found", Some(what.clone())),
            AppError::Conflict(what) => (StatusCode::CONFLICT, "Conflict", Some(what.clone())),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
