//! # CDK Testing
//!
//! Testing utilities for the CDK distribution service.
//!
//! This crate provides:
//! - In-memory implementations of every provider trait, with failure
//!   injection for the compensation paths
//! - A fixed clock
//! - Fixtures for users, projects and a fully wired environment
//! - proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use cdk_testing::{TestHarness, fixtures};
//!
//! #[tokio::test]
//! async fn claims_first_item() {
//!     let harness = TestHarness::new();
//!     let project = harness.seed_first_come(fixtures::project(), &["A", "B"]).await;
//!     let user = harness.seed_user(fixtures::user(1, "alice"));
//!
//!     let claimed = harness.coordinator().claim(&project, &user, "1.1.1.1").await.unwrap();
//!     assert_eq!(claimed.content, "A");
//! }
//! ```

use chrono::{DateTime, Utc};
use cdk_core::environment::Clock;

#[allow(clippy::unwrap_used)] // Mocks: mutex poisoning is a test failure
mod forum_mocks;
#[allow(clippy::unwrap_used)] // Mocks: mutex poisoning is a test failure
mod harness;
#[allow(clippy::unwrap_used)] // Mocks: mutex poisoning is a test failure
mod inventory_mocks;
#[allow(clippy::unwrap_used)] // Mocks: mutex poisoning is a test failure
mod repository_mocks;

#[allow(clippy::unwrap_used)] // Mocks: mutex poisoning is a test failure
pub mod fixtures;

pub use forum_mocks::MockForumClient;
pub use harness::TestHarness;
pub use inventory_mocks::{
    InMemoryInventoryStore, InMemoryRateLimiter, InMemorySameIpStore, InMemorySessionStore,
};
pub use repository_mocks::InMemoryProjectRepository;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Settable clock for deterministic tests
    ///
    /// Returns the same time until moved with [`FixedClock::set`] or
    /// [`FixedClock::advance`]. Clones share the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use cdk_testing::mocks::FixedClock;
    /// use cdk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2);
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock to `time`
        #[allow(clippy::unwrap_used)]
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }

        /// Move the clock forward
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }
    }

    impl Clock for FixedClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// proptest strategies for domain types.
pub mod properties {
    use cdk_core::types::TrustLevel;
    use proptest::prelude::*;

    /// Any trust tier.
    pub fn trust_level() -> impl Strategy<Value = TrustLevel> {
        prop::sample::select(TrustLevel::ALL.to_vec())
    }

    /// Plausible forum usernames.
    pub fn username() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{2,12}"
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
