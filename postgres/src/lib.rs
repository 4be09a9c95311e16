//! `PostgreSQL` persistence for the CDK distribution service.
//!
//! [`PostgresProjectRepository`] is the relational source of truth for
//! projects, items, tags, reports and the users that own or claim them. The
//! fast-path inventory lives in Redis; see `cdk-redis`.
//!
//! # Example
//!
//! ```ignore
//! use cdk_postgres::{connect, PostgresProjectRepository};
//! use std::time::Duration;
//!
//! let pool = connect("postgres://localhost/cdk", 20, 2, Duration::from_secs(5)).await?;
//! let repository = PostgresProjectRepository::new(pool);
//! repository.migrate().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use cdk_core::error::{StoreError, StoreResult};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

mod repository;

pub use repository::PostgresProjectRepository;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the database cannot be reached
/// within `connect_timeout`.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    min_connections: u32,
    connect_timeout: Duration,
) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(connect_timeout)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Failed to connect to database: {e}")))?;

    tracing::info!(max_connections, min_connections, "Database pool ready");
    Ok(pool)
}

/// Run `SELECT 1` (readiness probe).
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the query fails.
pub async fn ping(pool: &PgPool) -> StoreResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| StoreError::Unavailable(format!("Database ping failed: {e}")))
}
