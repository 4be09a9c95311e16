//! Session authentication for API routes.
//!
//! Login happens elsewhere (the forum OAuth flow writes `session:{token}`
//! into Redis). Handlers only need to turn a bearer token back into a user:
//!
//! ```ignore
//! async fn handler(SessionUser(user): SessionUser) -> impl IntoResponse {
//!     // `user` is active and loaded from Postgres
//! }
//! ```

use crate::server::state::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use cdk_core::User;
use cdk_web::{AppError, BearerToken};

/// Authenticated, active user.
///
/// Rejects with `401` for a missing, unknown or expired token and `403` for a
/// deactivated account.
#[derive(Debug, Clone)]
pub struct SessionUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;

        let user_id = state
            .sessions
            .user_for_session(&token)
            .await?
            .ok_or_else(|| AppError::unauthorized("Session expired or invalid"))?;

        let user = state
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id = %user_id, "Session points at a missing user");
                AppError::unauthorized("Session expired or invalid")
            })?;

        if !user.is_active {
            tracing::info!(user_id = %user_id, "Rejected request from deactivated account");
            return Err(AppError::forbidden("Account is deactivated"));
        }

        Ok(Self(user))
    }
}
