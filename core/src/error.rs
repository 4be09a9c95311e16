//! Error types for claims, lottery resolution and project management.

use crate::types::TrustLevel;
use thiserror::Error;

/// Result alias for provider (store) operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a storage provider (Redis, Postgres, in-memory mock).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable or the operation failed
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored data could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failure talking to the forum API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForumError {
    /// Transport failure or timeout
    #[error("Forum request failed: {0}")]
    RequestFailed(String),

    /// Non-success HTTP status
    #[error("Forum returned status {0}")]
    Status(u16),

    /// Response body did not match the expected shape
    #[error("Failed to parse forum response: {0}")]
    Parse(String),
}

/// Why a lottery thread could not be turned into winner allocations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LotteryError {
    /// Topic lacks the lottery tag or is still open
    #[error("Topic is not a finished lottery: {0}")]
    NotEligible(String),

    /// The result post names a different author than the project creator
    #[error("Lottery author does not match the project creator")]
    AuthorMismatch,

    /// Number of winners differs from the number of prizes
    #[error("Lottery has {winners} winners but {prizes} prizes")]
    CountMismatch {
        /// Mentions found in the result post
        winners: usize,
        /// Prizes supplied by the creator
        prizes: usize,
    },

    /// Result post is missing a required section
    #[error("Malformed lottery post: {0}")]
    Malformed(String),

    /// Forum could not be reached
    #[error(transparent)]
    Forum(#[from] ForumError),
}

/// Reasons a claim is rejected or fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// Claim window has not opened
    #[error("Project has not started yet")]
    TooEarly,

    /// Claim window has closed
    #[error("Project has ended")]
    TooLate,

    /// User's trust tier is below the project's minimum
    #[error("Trust level {required} or above is required")]
    TrustLevelNotMet {
        /// Minimum tier the project accepts
        required: TrustLevel,
    },

    /// User's risk level exceeds the project threshold
    #[error("Risk level too high to claim from this project")]
    RiskTooHigh,

    /// Another claim already came from this IP address
    #[error("This IP address has already claimed from this project")]
    DuplicateIp,

    /// Inventory is empty (or the project is completed)
    #[error("No items left")]
    NoStock,

    /// Project or item missing
    #[error("Not found")]
    NotFound,

    /// User already holds an item from this project
    #[error("Already claimed from this project")]
    AlreadyClaimed,

    /// The assignment could not be recorded; the item was returned to stock
    #[error("Failed to record claim: {0}")]
    PersistenceFailure(String),

    /// Inventory or marker store is unreachable
    #[error("Inventory store unavailable: {0}")]
    StoreUnavailable(String),

    /// Topic is not a finished lottery
    #[error("Topic is not a finished lottery: {0}")]
    LotteryNotEligible(String),

    /// Lottery post author is not the creator
    #[error("Lottery author does not match the project creator")]
    LotteryAuthorMismatch,

    /// Winner count differs from prize count
    #[error("Lottery has {winners} winners but {prizes} prizes")]
    LotteryCountMismatch {
        /// Mentions found in the result post
        winners: usize,
        /// Prizes supplied by the creator
        prizes: usize,
    },

    /// Lottery post could not be parsed
    #[error("Malformed lottery post: {0}")]
    LotteryMalformed(String),

    /// Forum could not be reached
    #[error("Forum unavailable: {0}")]
    ForumUnavailable(String),
}

impl ClaimError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TooEarly => "TOO_EARLY",
            Self::TooLate => "TOO_LATE",
            Self::TrustLevelNotMet { .. } => "TRUST_LEVEL_NOT_MET",
            Self::RiskTooHigh => "RISK_TOO_HIGH",
            Self::DuplicateIp => "DUPLICATE_IP",
            Self::NoStock => "NO_STOCK",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyClaimed => "ALREADY_CLAIMED",
            Self::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::LotteryNotEligible(_) => "LOTTERY_NOT_ELIGIBLE",
            Self::LotteryAuthorMismatch => "LOTTERY_AUTHOR_MISMATCH",
            Self::LotteryCountMismatch { .. } => "LOTTERY_COUNT_MISMATCH",
            Self::LotteryMalformed(_) => "LOTTERY_MALFORMED",
            Self::ForumUnavailable(_) => "FORUM_UNAVAILABLE",
        }
    }

    /// Rejected by a rule of the eligibility chain (no inventory touched).
    #[must_use]
    pub const fn is_eligibility_failure(&self) -> bool {
        matches!(
            self,
            Self::TooEarly
                | Self::TooLate
                | Self::TrustLevelNotMet { .. }
                | Self::RiskTooHigh
                | Self::DuplicateIp
                | Self::NoStock
        )
    }

    /// Transient infrastructure failure; the same request may succeed later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PersistenceFailure(_) | Self::StoreUnavailable(_) | Self::ForumUnavailable(_)
        )
    }

    /// Lottery resolution failure.
    #[must_use]
    pub const fn is_lottery_failure(&self) -> bool {
        matches!(
            self,
            Self::LotteryNotEligible(_)
                | Self::LotteryAuthorMismatch
                | Self::LotteryCountMismatch { .. }
                | Self::LotteryMalformed(_)
                | Self::ForumUnavailable(_)
        )
    }
}

impl From<StoreError> for ClaimError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl From<LotteryError> for ClaimError {
    fn from(err: LotteryError) -> Self {
        match err {
            LotteryError::NotEligible(reason) => Self::LotteryNotEligible(reason),
            LotteryError::AuthorMismatch => Self::LotteryAuthorMismatch,
            LotteryError::CountMismatch { winners, prizes } => {
                Self::LotteryCountMismatch { winners, prizes }
            }
            LotteryError::Malformed(reason) => Self::LotteryMalformed(reason),
            LotteryError::Forum(e) => Self::ForumUnavailable(e.to_string()),
        }
    }
}

/// Project management failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectError {
    /// Project does not exist or is not visible to the caller
    #[error("Project not found")]
    NotFound,

    /// Caller is not the project creator
    #[error("Only the project creator may do this")]
    Forbidden,

    /// Deletion is blocked because an item has been claimed
    #[error("Project already has claimed items")]
    AlreadyClaimed,

    /// Caller already reported this project
    #[error("Project already reported")]
    AlreadyReported,

    /// Request failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Creation rate limit exceeded
    #[error("Too many projects created, retry in {retry_after} seconds")]
    RateLimited {
        /// Window length in seconds
        retry_after: u64,
    },

    /// Lottery resolution failed
    #[error(transparent)]
    Lottery(ClaimError),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ProjectError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::AlreadyClaimed => "ALREADY_CLAIMED",
            Self::AlreadyReported => "ALREADY_REPORTED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Lottery(inner) => inner.code(),
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<StoreError> for ProjectError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<LotteryError> for ProjectError {
    fn from(err: LotteryError) -> Self {
        Self::Lottery(err.into())
    }
}
