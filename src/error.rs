use thiserror::Error;

// Import Axum types for HTTP response conversion
use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// The custom error type for the application.
#[derive(Debug, Error)]
pub enum Error {
    /// An error originating from the sqlx library.
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// An error originating from IO operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The sanitizer rejected the query on form (length, encoding).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The sanitizer flagged potential prompt injection.
    #[error("Suspicious query rejected: {0}")]
    SuspiciousQuery(String),

    /// Tenant not permitted or session missing.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A not found error. Never leaks cross-tenant existence.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A conflict error (e.g. second submission while a job is active).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Tenant exceeded its throughput budget.
    #[error("Rate limited: retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    /// A batch exceeded provider limits; retryable after re-batching.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Telegram, embedding, or LLM provider failing after retries.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The answer LLM failed; retrieval results may still be usable.
    #[error("Answer unavailable: {0}")]
    AnswerUnavailable(String),

    /// An internal server error (invariant violated, storage error).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, Error>` to simplify function signatures.
pub type Result<T> = std::result::Result<T, Error>;

/// Helper function to create standardized error response bodies
fn create_error_body(msg: String, code: &str) -> serde_json::Value {
    serde_json::json!({ "error": msg, "code": code })
}

/// Log error at appropriate level based on error type
/// Client-facing errors (4xx) are logged as warnings, server errors (5xx) as errors
fn log_error(error: &Error, error_code: &str, status_code: u16) {
    if status_code >= 500 {
        tracing::error!(
            error_code,
            error = %error,
            status_code,
            "Error returned to client"
        );
    } else {
        tracing::warn!(
            error_code,
            error = %error,
            status_code,
            "Error returned to client"
        );
    }
}

/// Convert custom Error to HTTP response
///
/// This implementation maps each error variant to an appropriate HTTP status code
/// and returns a JSON response with an error message and error code.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log the error before returning response using helper
        log_error(&self, self.error_code(), self.status_code());

        let (body, status) = match self {
            Error::InvalidQuery(msg) => (
                create_error_body(msg, "INVALID_QUERY"),
                StatusCode::BAD_REQUEST,
            ),
            Error::SuspiciousQuery(msg) => (
                create_error_body(msg, "SUSPICIOUS_QUERY"),
                StatusCode::BAD_REQUEST,
            ),
            Error::Unauthorized(msg) => (
                create_error_body(msg, "UNAUTHORIZED"),
                StatusCode::UNAUTHORIZED,
            ),
            Error::NotFound(msg) => (create_error_body(msg, "NOT_FOUND"), StatusCode::NOT_FOUND),
            Error::Conflict(msg) => (create_error_body(msg, "CONFLICT"), StatusCode::CONFLICT),
            Error::RateLimited {
                retry_after_seconds,
            } => {
                let body = serde_json::json!({
                    "error": "Rate limit exceeded",
                    "code": "RATE_LIMITED",
                    "retry_after_seconds": retry_after_seconds,
                });
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                if let Ok(value) = retry_after_seconds.to_string().parse() {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                return response;
            }
            Error::PayloadTooLarge(msg) => (
                create_error_body(msg, "PAYLOAD_TOO_LARGE"),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            Error::UpstreamUnavailable(msg) => (
                create_error_body(msg, "UPSTREAM_UNAVAILABLE"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            Error::AnswerUnavailable(msg) => (
                create_error_body(msg, "ANSWER_UNAVAILABLE"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            Error::Sqlx(_) => (
                create_error_body("Database error".to_string(), "INTERNAL_ERROR"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            Error::Io(_) => (
                create_error_body("IO error".to_string(), "INTERNAL_ERROR"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            Error::Json(e) => (
                create_error_body(format!("Invalid JSON payload: {}", e), "JSON_ERROR"),
                StatusCode::BAD_REQUEST,
            ),
            Error::Config(_) => (
                create_error_body("Configuration error".to_string(), "CONFIG_ERROR"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            Error::Internal(msg) => (
                create_error_body(msg, "INTERNAL_ERROR"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl Error {
    /// Helper method to get the HTTP status code for an error
    fn status_code(&self) -> u16 {
        match self {
            Error::InvalidQuery(_) | Error::SuspiciousQuery(_) | Error::Json(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::RateLimited { .. } => 429,
            Error::PayloadTooLarge(_) => 413,
            Error::UpstreamUnavailable(_) | Error::AnswerUnavailable(_) => 503,
            _ => 500,
        }
    }

    /// Helper method to get the error code for logging
    fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidQuery(_) => "INVALID_QUERY",
            Error::SuspiciousQuery(_) => "SUSPICIOUS_QUERY",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Error::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Error::AnswerUnavailable(_) => "ANSWER_UNAVAILABLE",
            Error::Sqlx(_) => "INTERNAL_ERROR",
            Error::Io(_) => "INTERNAL_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
