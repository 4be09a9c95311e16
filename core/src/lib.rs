//! # CDK Core
//!
//! Domain types and decision logic for distributing redeem codes (items) to
//! eligible users.
//!
//! ## Components
//!
//! - **Inventory Store** ([`providers::InventoryStore`]): atomically poppable
//!   per-project inventory. A list for first-come projects, a hash keyed by
//!   winner username for lottery projects.
//! - **Eligibility Checker** ([`eligibility`]): ordered predicate chain over
//!   time window, trust level, risk level, same-IP history and stock.
//! - **Claim Coordinator** ([`claim::ClaimCoordinator`]): pop one item,
//!   persist the assignment, push the item back if persistence fails.
//! - **Lottery Resolver** ([`lottery`]): parses a closed forum lottery thread
//!   and maps each winner to their merged prize content.
//! - **Project Service** ([`projects::ProjectService`]): project lifecycle
//!   (create, update, delete, detail, report, claim history).
//! - **Listings** ([`listings`]): explore feed, the caller's own projects,
//!   active tags, a project's receivers and the daily claim chart.
//!
//! ## Flow
//!
//! ```text
//! request → eligibility::check → ClaimCoordinator::claim
//!                                   ├─ InventoryStore::pop      (atomic take-one)
//!                                   ├─ ProjectRepository::commit_claim
//!                                   └─ InventoryStore::push     (compensation on failure)
//! ```
//!
//! All I/O sits behind the traits in [`providers`], injected through a
//! [`environment::DistributionEnvironment`], so every rule runs against
//! in-memory mocks in tests.

pub mod claim;
pub mod eligibility;
pub mod environment;
pub mod error;
pub mod listings;
pub mod lottery;
pub mod metrics;
pub mod projects;
pub mod providers;
pub mod types;

pub use claim::ClaimCoordinator;
pub use environment::{Clock, DistributionEnvironment, SystemClock};
pub use error::{ClaimError, ForumError, LotteryError, ProjectError, StoreError, StoreResult};
pub use listings::{ListQuery, MAX_CHART_DAYS};
pub use projects::{
    CreateProject, ProjectDraft, ProjectService, ProjectSettings, RateLimitRule, UpdateProject,
};
pub use types::{
    ClaimRecord, ClaimedItem, DailyClaims, DistributionMode, ExploreFilter, InventoryEntry, Item,
    ItemId, Page, Paged, Project, ProjectDetail, ProjectId, ProjectListing, ProjectStatus,
    ReceivedRecord, ReceiverRecord, ReportOutcome, TrustLevel, User, UserId,
};
