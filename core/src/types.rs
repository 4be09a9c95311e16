//! Domain types for the distribution service.
//!
//! Value objects (identifiers, trust tiers, modes) and the entities persisted
//! by the relational store: projects, items, users and claim records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a project (a UUID rendered as a string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Creates a new random `ProjectId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for an item (database sequence value).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user (the forum account id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Forum trust tier, ordered from newest to most trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TrustLevel {
    /// TL0
    NewUser,
    /// TL1
    BasicUser,
    /// TL2
    User,
    /// TL3
    ActiveUser,
    /// TL4
    Leader,
}

impl TrustLevel {
    /// All tiers in ascending order.
    pub const ALL: [Self; 5] = [
        Self::NewUser,
        Self::BasicUser,
        Self::User,
        Self::ActiveUser,
        Self::Leader,
    ];

    /// Numeric tier (0-4).
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<TrustLevel> for u8 {
    fn from(level: TrustLevel) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for TrustLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .ok_or_else(|| format!("invalid trust level {value}, expected 0-4"))
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// How a project hands out its items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMode {
    /// Any eligible claimant takes the next item (FIFO).
    FirstCome,
    /// Items are pre-assigned to lottery winners.
    Lottery,
}

impl DistributionMode {
    /// Database representation.
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        match self {
            Self::FirstCome => 0,
            Self::Lottery => 1,
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub const fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::FirstCome),
            1 => Some(Self::Lottery),
            _ => None,
        }
    }

    /// Label used for metrics and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FirstCome => "first_come",
            Self::Lottery => "lottery",
        }
    }
}

/// Moderation status of a project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Visible and claimable.
    Normal,
    /// Hidden pending admin review (report threshold reached).
    Hidden,
    /// Confirmed violation.
    Violation,
}

impl ProjectStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        match self {
            Self::Normal => 0,
            Self::Hidden => 1,
            Self::Violation => 2,
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub const fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::Hidden),
            2 => Some(Self::Violation),
            _ => None,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Lowest score a user can hold.
pub const MIN_USER_SCORE: i16 = -100;
/// Highest score a user can hold.
pub const MAX_USER_SCORE: i16 = 100;
/// Risk level is measured as the distance from this score.
pub const BASE_USER_SCORE: i16 = 100;

/// A forum user known to the service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Forum account id
    pub id: UserId,
    /// Unique forum username (lottery winners are matched on this)
    pub username: String,
    /// Display name, may be empty
    pub nickname: String,
    /// Forum trust tier
    pub trust_level: TrustLevel,
    /// Badge score, always within `[MIN_USER_SCORE, MAX_USER_SCORE]`
    pub score: i16,
    /// Banned users are inactive
    pub is_active: bool,
}

impl User {
    /// Clamp a raw score into the allowed range.
    #[must_use]
    pub fn clamp_score(raw: i64) -> i16 {
        let clamped = raw.clamp(i64::from(MIN_USER_SCORE), i64::from(MAX_USER_SCORE));
        // In range after the clamp above.
        i16::try_from(clamped).unwrap_or(MIN_USER_SCORE)
    }

    /// Derived risk level: `100 - score`, in `[0, 200]`.
    #[must_use]
    pub const fn risk_level(&self) -> i16 {
        BASE_USER_SCORE - self.score
    }

    /// Nickname if set, username otherwise.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.nickname.is_empty() {
            &self.username
        } else {
            &self.nickname
        }
    }
}

/// A distribution campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project identifier
    pub id: ProjectId,
    /// Short name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// First-come or lottery
    pub distribution_mode: DistributionMode,
    /// Number of items ever added
    pub total_items: u64,
    /// Claims open at
    pub start_time: DateTime<Utc>,
    /// Claims close at
    pub end_time: DateTime<Utc>,
    /// Lowest trust tier allowed to claim
    pub minimum_trust_level: TrustLevel,
    /// Whether one IP address may claim more than once
    pub allow_same_ip: bool,
    /// Highest user risk level allowed to claim (0-100)
    pub risk_level: u8,
    /// Creator of the project
    pub creator_id: UserId,
    /// Set once the last item is claimed
    pub is_completed: bool,
    /// Moderation status
    pub status: ProjectStatus,
    /// Number of user reports received
    pub report_count: u16,
    /// Excluded from public listings
    pub hide_from_explore: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Whether `now` falls inside the claim window.
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now <= self.end_time
    }

    /// Whether a user passes the trust and risk gates (used for visibility).
    #[must_use]
    pub fn admits(&self, user: &User) -> bool {
        user.trust_level >= self.minimum_trust_level
            && user.risk_level() <= i16::from(self.risk_level)
    }
}

/// One distributable unit belonging to a project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item identifier
    pub id: ItemId,
    /// Owning project
    pub project_id: ProjectId,
    /// Opaque payload handed to the claimant
    pub content: String,
    /// Claimant, once claimed
    pub receiver_id: Option<UserId>,
    /// Claim time, once claimed
    pub received_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Whether the item has already been handed out.
    #[must_use]
    pub const fn is_claimed(&self) -> bool {
        self.receiver_id.is_some()
    }
}

/// Pointer cached in the inventory store, mirroring one unclaimed item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEntry {
    /// First-come: item id in the project's FIFO list.
    Queued(ItemId),
    /// Lottery: item reserved for one winner.
    Assigned {
        /// Winner's forum username
        winner: String,
        /// Item reserved for the winner
        item_id: ItemId,
    },
}

impl InventoryEntry {
    /// Entry shape matching a project's distribution mode.
    #[must_use]
    pub fn for_mode(mode: DistributionMode, item_id: ItemId, claimant: &str) -> Self {
        match mode {
            DistributionMode::FirstCome => Self::Queued(item_id),
            DistributionMode::Lottery => Self::Assigned {
                winner: claimant.to_string(),
                item_id,
            },
        }
    }

    /// The item this entry points at.
    #[must_use]
    pub const fn item_id(&self) -> ItemId {
        match self {
            Self::Queued(item_id) | Self::Assigned { item_id, .. } => *item_id,
        }
    }
}

/// Durable write performed by a successful claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimRecord {
    /// Project being claimed from
    pub project_id: ProjectId,
    /// Item being assigned
    pub item_id: ItemId,
    /// Claimant
    pub receiver_id: UserId,
    /// Claim time
    pub received_at: DateTime<Utc>,
    /// Mark the project completed in the same transaction
    pub complete_project: bool,
}

/// Result of a successful claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimedItem {
    /// Project claimed from
    pub project_id: ProjectId,
    /// Item assigned
    pub item_id: ItemId,
    /// Payload handed to the claimant
    pub content: String,
    /// Claim time
    pub received_at: DateTime<Utc>,
    /// Whether this claim took the last unit
    pub completed_project: bool,
}

/// Project as shown to a specific viewer.
#[derive(Clone, Debug, Serialize)]
pub struct ProjectDetail {
    /// The project
    #[serde(flatten)]
    pub project: Project,
    /// Creator's username
    pub creator_username: String,
    /// Creator's nickname (falls back to username)
    pub creator_nickname: String,
    /// Tags attached to the project
    pub tags: Vec<String>,
    /// Remaining inventory
    pub available_items_count: u64,
    /// Whether the viewer already claimed an item
    pub is_received: bool,
    /// Content the viewer claimed, if any
    pub received_content: Option<String>,
}

/// One row of a user's claim history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedRecord {
    /// Project claimed from
    pub project_id: ProjectId,
    /// Project name
    pub project_name: String,
    /// Creator's username
    pub project_creator: String,
    /// Creator's nickname (falls back to username)
    pub project_creator_nickname: String,
    /// Claimed content
    pub content: String,
    /// Claim time
    pub received_at: Option<DateTime<Utc>>,
}

/// Project row in the explore and "mine" listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProjectListing {
    /// The project
    #[serde(flatten)]
    pub project: Project,
    /// Tags attached to the project, sorted
    pub tags: Vec<String>,
}

/// One claimant of a project, as shown to its creator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverRecord {
    /// Claimant's username
    pub username: String,
    /// Claimant's nickname, may be empty
    pub nickname: String,
    /// Content handed out
    pub content: String,
    /// Claim time
    pub received_at: Option<DateTime<Utc>>,
}

/// Claims made by one user on one UTC day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DailyClaims {
    /// Day, rendered `YYYY-MM-DD`
    pub date: NaiveDate,
    /// Short label, `MM/DD`
    pub label: String,
    /// Items claimed that day
    pub count: u64,
}

/// Visibility gates applied to the explore listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExploreFilter {
    /// Projects this user already claimed from are left out
    pub viewer_id: UserId,
    /// Viewer's trust tier
    pub trust_level: TrustLevel,
    /// Viewer's risk level (`100 - score`)
    pub risk_level: i16,
    /// Projects that ended before this instant are left out
    pub now: DateTime<Utc>,
    /// Keep projects carrying any of these tags (all when empty)
    pub tags: Vec<String>,
}

impl ExploreFilter {
    /// Whether `project` is listed for the viewer, ignoring tags and the
    /// viewer's own claims.
    #[must_use]
    pub fn lists(&self, project: &Project) -> bool {
        project.status == ProjectStatus::Normal
            && !project.is_completed
            && !project.hide_from_explore
            && project.end_time > self.now
            && project.minimum_trust_level <= self.trust_level
            && i16::from(project.risk_level) >= self.risk_level
    }
}

/// Outcome of recording a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReportOutcome {
    /// Report count after this report
    pub report_count: u16,
    /// Whether the project is now hidden
    pub hidden: bool,
}

/// 1-based pagination request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Page number, starting at 1
    pub current: u32,
    /// Page size (1-100)
    pub size: u32,
}

impl Page {
    /// Largest page size accepted.
    pub const MAX_SIZE: u32 = 100;

    /// Row offset of the first element on this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.current.saturating_sub(1)) * u64::from(self.size)
    }

    /// Whether the page request is within bounds.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.current >= 1 && self.size >= 1 && self.size <= Self::MAX_SIZE
    }
}

/// A page of results with the total row count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Paged<T> {
    /// Total matching rows
    pub total: u64,
    /// Rows on this page
    pub results: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_level_round_trips_through_u8() {
        for level in TrustLevel::ALL {
            assert_eq!(TrustLevel::try_from(level.as_u8()), Ok(level));
        }
        assert!(TrustLevel::try_from(5).is_err());
    }

    #[test]
    fn trust_levels_are_ordered() {
        assert!(TrustLevel::NewUser < TrustLevel::BasicUser);
        assert!(TrustLevel::ActiveUser < TrustLevel::Leader);
    }

    #[test]
    fn score_is_clamped() {
        assert_eq!(User::clamp_score(250), MAX_USER_SCORE);
        assert_eq!(User::clamp_score(-1000), MIN_USER_SCORE);
        assert_eq!(User::clamp_score(42), 42);
    }

    #[test]
    fn risk_level_spans_zero_to_two_hundred() {
        let mut user = User {
            id: UserId(1),
            username: "alice".into(),
            nickname: String::new(),
            trust_level: TrustLevel::User,
            score: MAX_USER_SCORE,
            is_active: true,
        };
        assert_eq!(user.risk_level(), 0);
        user.score = MIN_USER_SCORE;
        assert_eq!(user.risk_level(), 200);
        assert_eq!(user.display_name(), "alice");
    }

    #[test]
    fn page_offset() {
        let page = Page { current: 3, size: 20 };
        assert_eq!(page.offset(), 40);
        assert!(page.is_valid());
        assert!(!Page { current: 0, size: 20 }.is_valid());
        assert!(!Page { current: 1, size: 101 }.is_valid());
    }

    #[test]
    fn explore_filter_applies_every_gate() {
        let now = Utc::now();
        let project = Project {
            id: ProjectId::new(),
            name: "codes".into(),
            description: String::new(),
            distribution_mode: DistributionMode::FirstCome,
            total_items: 1,
            start_time: now - chrono::Duration::hours(1),
            end_time: now + chrono::Duration::hours(1),
            minimum_trust_level: TrustLevel::User,
            allow_same_ip: false,
            risk_level: 50,
            creator_id: UserId(1),
            is_completed: false,
            status: ProjectStatus::Normal,
            report_count: 0,
            hide_from_explore: false,
            created_at: now,
            updated_at: now,
        };
        let filter = ExploreFilter {
            viewer_id: UserId(2),
            trust_level: TrustLevel::User,
            risk_level: 50,
            now,
            tags: Vec::new(),
        };
        assert!(filter.lists(&project));

        assert!(!filter.lists(&Project { is_completed: true, ..project.clone() }));
        assert!(!filter.lists(&Project { hide_from_explore: true, ..project.clone() }));
        assert!(!filter.lists(&Project { status: ProjectStatus::Hidden, ..project.clone() }));
        assert!(!filter.lists(&Project { end_time: now, ..project.clone() }));
        assert!(!filter.lists(&Project { risk_level: 49, ..project.clone() }));
        assert!(!filter.lists(&Project {
            minimum_trust_level: TrustLevel::ActiveUser,
            ..project
        }));
    }

    #[test]
    fn inventory_entry_follows_mode() {
        assert_eq!(
            InventoryEntry::for_mode(DistributionMode::FirstCome, ItemId(7), "bob"),
            InventoryEntry::Queued(ItemId(7))
        );
        let entry = InventoryEntry::for_mode(DistributionMode::Lottery, ItemId(7), "bob");
        assert_eq!(entry.item_id(), ItemId(7));
        assert!(matches!(entry, InventoryEntry::Assigned { ref winner, .. } if winner == "bob"));
    }

    #[test]
    fn mode_and_status_database_codes() {
        assert_eq!(DistributionMode::from_i16(DistributionMode::Lottery.as_i16()), Some(DistributionMode::Lottery));
        assert_eq!(ProjectStatus::from_i16(ProjectStatus::Hidden.as_i16()), Some(ProjectStatus::Hidden));
        assert_eq!(ProjectStatus::from_i16(9), None);
    }
}
