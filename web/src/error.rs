//! Error types for web handlers.
//!
//! [`AppError`] is the single error type returned by handlers. Domain errors
//! (`ClaimError`, `ProjectError`, `StoreError`) convert into it with a status
//! code and keep their machine-readable `code`, so clients can branch on
//! `TOO_EARLY`, `NO_STOCK`, `RATE_LIMITED` and friends.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use cdk_core::error::{ClaimError, ProjectError, StoreError};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler() -> Result<Json<ProjectDetail>, AppError> {
///     let detail = projects.detail(&user, &id).await?; // ProjectError -> AppError
///     Ok(Json(detail))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    /// User-facing message
    message: String,
    /// Stable code for client error handling
    code: String,
    /// Seconds until the request may be retried (`Retry-After`)
    retry_after: Option<u64>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
            retry_after: None,
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Ask the client to retry after `seconds`.
    #[must_use]
    pub const fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    fn with_code(mut self, code: &str) -> Self {
        code.clone_into(&mut self.code);
        self
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "UNAUTHORIZED")
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message, "FORBIDDEN")
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND",
        )
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message, "VALIDATION_ERROR")
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_SERVER_ERROR")
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, "SERVICE_UNAVAILABLE")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = %self.code,
                message = %self.message,
                error = ?self.source,
                "Request failed"
            );
        }

        let retry_after = self.retry_after;
        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        let mut response = (self.status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

fn claim_status(err: &ClaimError) -> StatusCode {
    match err {
        ClaimError::TooEarly
        | ClaimError::TooLate
        | ClaimError::TrustLevelNotMet { .. }
        | ClaimError::RiskTooHigh
        | ClaimError::DuplicateIp => StatusCode::FORBIDDEN,
        ClaimError::NoStock | ClaimError::AlreadyClaimed => StatusCode::CONFLICT,
        ClaimError::NotFound => StatusCode::NOT_FOUND,
        ClaimError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ClaimError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ClaimError::LotteryNotEligible(_)
        | ClaimError::LotteryAuthorMismatch
        | ClaimError::LotteryCountMismatch { .. }
        | ClaimError::LotteryMalformed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ClaimError::ForumUnavailable(_) => StatusCode::BAD_GATEWAY,
    }
}

impl From<ClaimError> for AppError {
    fn from(err: ClaimError) -> Self {
        let status = claim_status(&err);
        Self::new(status, err.to_string(), err.code())
    }
}

impl From<ProjectError> for AppError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::Lottery(inner) => inner.into(),
            ProjectError::RateLimited { retry_after } => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                err.to_string(),
                err.code(),
            )
            .with_retry_after(retry_after),
            ProjectError::Storage(ref detail) => {
                let source = anyhow::anyhow!(detail.clone());
                Self::internal("Storage failure")
                    .with_source(source)
                    .with_code(err.code())
            }
            _ => {
                let status = match err {
                    ProjectError::NotFound => StatusCode::NOT_FOUND,
                    ProjectError::Forbidden => StatusCode::FORBIDDEN,
                    ProjectError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    _ => StatusCode::CONFLICT,
                };
                Self::new(status, err.to_string(), err.code())
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::unavailable("Storage backend unavailable").with_source(err.into())
    }
}
