//! Axum plumbing for the CDK distribution service.
//!
//! The service binary (`cdk-server`) builds its routes on these pieces:
//!
//! - [`AppError`]: handler error type; domain errors convert into it with a
//!   status code and a stable `code`
//! - [`extractors`]: correlation ID, client IP, bearer token
//! - [`middleware`]: correlation ID span, completion log, response header
//! - [`handlers::health`]: liveness and readiness endpoints
//!
//! # Request Flow
//!
//! 1. **Correlation layer** assigns an ID and opens the request span
//! 2. **Extractors** pull the session token and client IP
//! 3. **Handler** calls the claim coordinator or project service
//! 4. **Errors** convert into [`AppError`] and render as
//!    `{"code": "...", "message": "..."}`

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::AppError;
pub use extractors::{BearerToken, ClientIp, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, track_request};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
