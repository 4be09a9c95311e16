//! # CDK Server
//!
//! HTTP service distributing redeem codes to forum users.
//!
//! Wires the Redis inventory, the Postgres repository and the forum client
//! into a [`cdk_core::DistributionEnvironment`], and exposes the claim
//! coordinator and project service under `/api/v1`.
//!
//! ## Modules
//!
//! - [`config`]: environment-driven configuration
//! - [`auth`]: bearer session extractor
//! - [`api`]: request handlers
//! - [`server`]: state, router and readiness probes
//! - [`telemetry`]: tracing subscriber and Prometheus exporter
//! - [`lifecycle`]: shutdown signals

pub mod api;
pub mod auth;
pub mod config;
pub mod lifecycle;
pub mod server;
pub mod telemetry;

pub use config::Config;
pub use server::{AppState, build_router};
