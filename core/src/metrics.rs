//! Business metrics for the distribution service.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `cdk_claims_total{outcome}` - Claims by outcome (`success` or an error code)
//! - `cdk_claims_stranded_total` - Items popped whose push-back failed
//! - `cdk_projects_created_total{mode}` - Projects created by distribution mode
//! - `cdk_projects_reported_total` - Reports accepted
//!
//! ## Histograms
//! - `cdk_claim_duration_seconds` - Time spent in the claim coordinator

use crate::error::ClaimError;
use crate::types::DistributionMode;
use metrics::{describe_counter, describe_histogram};

/// Register all metric descriptions. Call once at startup.
pub fn register_business_metrics() {
    describe_counter!(
        "cdk_claims_total",
        "Total number of claim attempts by outcome"
    );
    describe_counter!(
        "cdk_claims_stranded_total",
        "Items removed from inventory whose push-back failed"
    );
    describe_histogram!(
        "cdk_claim_duration_seconds",
        "Time taken to pop, persist and (if needed) compensate a claim"
    );
    describe_counter!(
        "cdk_projects_created_total",
        "Total number of projects created by distribution mode"
    );
    describe_counter!(
        "cdk_projects_reported_total",
        "Total number of project reports accepted"
    );

    tracing::info!("Business metrics registered");
}

/// Record a successful claim.
pub fn record_claim_succeeded(duration_secs: f64) {
    metrics::counter!("cdk_claims_total", "outcome" => "success").increment(1);
    metrics::histogram!("cdk_claim_duration_seconds").record(duration_secs);
}

/// Record a rejected or failed claim.
pub fn record_claim_failed(error: &ClaimError) {
    metrics::counter!("cdk_claims_total", "outcome" => error.code()).increment(1);
}

/// Record an item stranded outside the inventory.
pub fn record_claim_stranded() {
    metrics::counter!("cdk_claims_stranded_total").increment(1);
}

/// Record a project creation.
pub fn record_project_created(mode: DistributionMode) {
    metrics::counter!("cdk_projects_created_total", "mode" => mode.label()).increment(1);
}

/// Record an accepted report.
pub fn record_project_reported() {
    metrics::counter!("cdk_projects_reported_total").increment(1);
}
