//! Ready-made users, projects and lottery posts.
//!
//! Every project fixture is open at [`crate::test_clock`] time
//! (2025-01-01 00:00 UTC): it starts an hour earlier and ends an hour later.

use crate::test_clock;
use cdk_core::environment::Clock;
use cdk_core::types::{
    DistributionMode, MAX_USER_SCORE, Project, ProjectId, ProjectStatus, TrustLevel, User, UserId,
};
use chrono::Duration;

/// Id of the user owning fixture projects.
pub const CREATOR_ID: UserId = UserId(1000);

/// Username of the user owning fixture projects.
pub const CREATOR_USERNAME: &str = "creator";

/// An active TL2 user with a perfect score (risk level 0).
#[must_use]
pub fn user(id: u64, username: &str) -> User {
    User {
        id: UserId(id),
        username: username.to_string(),
        nickname: String::new(),
        trust_level: TrustLevel::User,
        score: MAX_USER_SCORE,
        is_active: true,
    }
}

/// The owner of fixture projects.
#[must_use]
pub fn creator() -> User {
    User {
        trust_level: TrustLevel::ActiveUser,
        nickname: "Creator".to_string(),
        ..user(CREATOR_ID.0, CREATOR_USERNAME)
    }
}

/// Open first-come project with no trust or risk gate and no repeat IPs.
#[must_use]
pub fn project() -> Project {
    let now = test_clock().now();
    Project {
        id: ProjectId::new(),
        name: "test codes".to_string(),
        description: "codes for tests".to_string(),
        distribution_mode: DistributionMode::FirstCome,
        total_items: 0,
        start_time: now - Duration::hours(1),
        end_time: now + Duration::hours(1),
        minimum_trust_level: TrustLevel::NewUser,
        allow_same_ip: false,
        risk_level: 100,
        creator_id: CREATOR_ID,
        is_completed: false,
        status: ProjectStatus::Normal,
        report_count: 0,
        hide_from_explore: false,
        created_at: now - Duration::days(1),
        updated_at: now - Duration::days(1),
    }
}

/// Open lottery project.
#[must_use]
pub fn lottery_project() -> Project {
    Project {
        distribution_mode: DistributionMode::Lottery,
        allow_same_ip: true,
        ..project()
    }
}

/// Raw markdown of a lottery result post.
#[must_use]
pub fn lottery_post(author: &str, winners: &[&str]) -> String {
    let mut raw = format!("## 抽奖结果\n\n帖子作者: {author}\n参与人数: 42\n\n### 以下为中奖佬友及对应楼层：\n");
    for (i, winner) in winners.iter().enumerate() {
        raw.push_str(&format!("- @{winner} ({}楼)\n", i * 7 + 3));
    }
    raw
}
