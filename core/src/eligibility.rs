//! Eligibility chain evaluated before any inventory is touched.
//!
//! Rules run in a fixed order and the first failure wins:
//!
//! 1. claim window opened (`TooEarly`)
//! 2. claim window not closed (`TooLate`)
//! 3. trust tier (`TrustLevelNotMet`)
//! 4. risk level (`RiskTooHigh`)
//! 5. same-IP marker (`DuplicateIp`, skipped when the project allows it)
//! 6. remaining stock (`NoStock`)
//!
//! Rules 1-4 are pure and exposed as [`check_rules`]; the full chain in
//! [`check`] adds the two store lookups.

use crate::environment::DistributionEnvironment;
use crate::error::ClaimError;
use crate::types::{Project, User};
use chrono::{DateTime, Utc};

/// Pure rules: time window, trust tier and risk level.
///
/// # Errors
///
/// Returns the first failing rule's [`ClaimError`].
pub fn check_rules(now: DateTime<Utc>, project: &Project, user: &User) -> Result<(), ClaimError> {
    if now < project.start_time {
        return Err(ClaimError::TooEarly);
    }
    if project.end_time < now {
        return Err(ClaimError::TooLate);
    }
    if user.trust_level < project.minimum_trust_level {
        return Err(ClaimError::TrustLevelNotMet {
            required: project.minimum_trust_level,
        });
    }
    if user.risk_level() > i16::from(project.risk_level) {
        return Err(ClaimError::RiskTooHigh);
    }
    Ok(())
}

/// Full eligibility chain.
///
/// Reads the same-IP marker (only when the project forbids repeat IPs) and
/// the stock count. Never mutates inventory.
///
/// # Errors
///
/// Returns the first failing rule's [`ClaimError`], or
/// [`ClaimError::StoreUnavailable`] when a lookup fails.
pub async fn check(
    env: &DistributionEnvironment,
    now: DateTime<Utc>,
    project: &Project,
    user: &User,
    ip: &str,
) -> Result<(), ClaimError> {
    check_rules(now, project, user)?;

    if !project.allow_same_ip && env.same_ip.exists(&project.id, ip).await? {
        return Err(ClaimError::DuplicateIp);
    }

    if env.inventory.stock(&project.id, project.distribution_mode).await? == 0 {
        return Err(ClaimError::NoStock);
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{
        DistributionMode, ProjectId, ProjectStatus, TrustLevel, UserId, MAX_USER_SCORE,
        MIN_USER_SCORE,
    };
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn project(trust: TrustLevel, risk: u8) -> Project {
        let start = base_time();
        Project {
            id: ProjectId::from_string("p1"),
            name: "codes".into(),
            description: String::new(),
            distribution_mode: DistributionMode::FirstCome,
            total_items: 1,
            start_time: start,
            end_time: start + Duration::hours(1),
            minimum_trust_level: trust,
            allow_same_ip: false,
            risk_level: risk,
            creator_id: UserId(99),
            is_completed: false,
            status: ProjectStatus::Normal,
            report_count: 0,
            hide_from_explore: false,
            created_at: start,
            updated_at: start,
        }
    }

    fn user(trust: TrustLevel, score: i16) -> User {
        User {
            id: UserId(1),
            username: "alice".into(),
            nickname: String::new(),
            trust_level: trust,
            score,
            is_active: true,
        }
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let p = project(TrustLevel::NewUser, 100);
        let u = user(TrustLevel::User, 100);
        assert_eq!(check_rules(p.start_time - Duration::seconds(1), &p, &u), Err(ClaimError::TooEarly));
        assert_eq!(check_rules(p.start_time, &p, &u), Ok(()));
        assert_eq!(check_rules(p.end_time, &p, &u), Ok(()));
        assert_eq!(check_rules(p.end_time + Duration::seconds(1), &p, &u), Err(ClaimError::TooLate));
    }

    #[test]
    fn time_is_checked_before_trust() {
        let p = project(TrustLevel::Leader, 0);
        let u = user(TrustLevel::NewUser, MIN_USER_SCORE);
        assert_eq!(
            check_rules(p.start_time - Duration::minutes(5), &p, &u),
            Err(ClaimError::TooEarly)
        );
    }

    #[test]
    fn trust_is_checked_before_risk() {
        let p = project(TrustLevel::ActiveUser, 0);
        let u = user(TrustLevel::User, MIN_USER_SCORE);
        assert_eq!(
            check_rules(p.start_time, &p, &u),
            Err(ClaimError::TrustLevelNotMet {
                required: TrustLevel::ActiveUser
            })
        );
    }

    #[test]
    fn risk_threshold() {
        let p = project(TrustLevel::NewUser, 20);
        assert_eq!(check_rules(p.start_time, &p, &user(TrustLevel::User, 80)), Ok(()));
        assert_eq!(
            check_rules(p.start_time, &p, &user(TrustLevel::User, 79)),
            Err(ClaimError::RiskTooHigh)
        );
        assert_eq!(check_rules(p.start_time, &p, &user(TrustLevel::User, MAX_USER_SCORE)), Ok(()));
    }

    fn trust_level() -> impl Strategy<Value = TrustLevel> {
        (0u8..=4).prop_map(|v| TrustLevel::try_from(v).unwrap())
    }

    proptest! {
        #[test]
        fn raising_trust_never_revokes_eligibility(
            required in trust_level(),
            held in trust_level(),
            score in MIN_USER_SCORE..=MAX_USER_SCORE,
            risk in 0u8..=100,
        ) {
            let p = project(required, risk);
            let now = p.start_time + Duration::minutes(10);
            if check_rules(now, &p, &user(held, score)).is_ok() {
                for higher in TrustLevel::ALL.into_iter().filter(|l| *l >= held) {
                    prop_assert!(check_rules(now, &p, &user(higher, score)).is_ok());
                }
            }
        }

        #[test]
        fn raising_score_never_revokes_eligibility(
            required in trust_level(),
            score in MIN_USER_SCORE..MAX_USER_SCORE,
            bump in 1i16..=200,
            risk in 0u8..=100,
        ) {
            let p = project(required, risk);
            let now = p.start_time;
            let held = TrustLevel::Leader;
            if check_rules(now, &p, &user(held, score)).is_ok() {
                let better = score.saturating_add(bump).min(MAX_USER_SCORE);
                prop_assert!(check_rules(now, &p, &user(held, better)).is_ok());
            }
        }
    }
}
