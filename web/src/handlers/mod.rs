//! HTTP request handlers shared by services.

pub mod health;

pub use health::{ComponentHealth, ReadinessProbe, ReadinessReport, health_check, readiness};
