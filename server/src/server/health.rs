//! Readiness probes and health handlers for the CDK server.

use super::state::AppState;
use async_trait::async_trait;
use axum::{Json, extract::State, http::StatusCode};
use cdk_web::handlers::{ReadinessProbe, ReadinessReport, readiness};
use redis::aio::ConnectionManager;
use sqlx::PgPool;

pub use cdk_web::handlers::health_check;

/// Readiness check endpoint.
///
/// Round-trips Postgres and Redis; any failure answers 503.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    readiness(&state.probes).await
}

/// `SELECT 1` against the pool.
#[derive(Clone, Debug)]
pub struct PostgresProbe(pub PgPool);

#[async_trait]
impl ReadinessProbe for PostgresProbe {
    fn component(&self) -> &'static str {
        "postgres"
    }

    async fn check(&self) -> Result<(), String> {
        cdk_postgres::ping(&self.0).await.map_err(|e| e.to_string())
    }
}

/// `PING` over the shared connection manager.
#[derive(Clone)]
pub struct RedisProbe(pub ConnectionManager);

#[async_trait]
impl ReadinessProbe for RedisProbe {
    fn component(&self) -> &'static str {
        "redis"
    }

    async fn check(&self) -> Result<(), String> {
        cdk_redis::ping(&self.0).await.map_err(|e| e.to_string())
    }
}
