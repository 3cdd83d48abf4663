//! Error taxonomy for the enrollment engine.
//!
//! Three layers:
//!
//! - [`ValidationError`]: malformed input, detected before any storage access
//! - [`StoreError`]: what a storage backend reports; [`StoreError::Conflict`] is
//!   the only transient kind and is retried by the Seat Ledger
//! - [`EnrollmentError`]: what callers of the engine see

use crate::types::{ActivityId, UserId};
use chrono::NaiveTime;
use thiserror::Error;

/// Malformed input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Title is empty or whitespace.
    #[error("Title must not be empty")]
    EmptyTitle,

    /// A text field exceeds its maximum length.
    #[error("Field '{field}' exceeds {max} characters")]
    TooLong {
        /// Offending field.
        field: &'static str,
        /// Maximum allowed characters.
        max: usize,
    },

    /// Capacity must be at least one seat.
    #[error("Capacity must be greater than zero")]
    NonPositiveCapacity,

    /// Schedule ends before it starts.
    #[error("Schedule ends at {ends_at} before it starts at {starts_at}")]
    InvertedSchedule {
        /// Start time.
        starts_at: NaiveTime,
        /// End time.
        ends_at: NaiveTime,
    },

    /// Day name not recognized.
    #[error("Unknown weekday: {0}")]
    UnknownWeekday(String),

    /// Time of day not in `HH:MM` form.
    #[error("Invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),
}

/// Errors reported by storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transient contention: lock wait timeout, serialization failure, deadlock,
    /// or a lost insert race. Safe to retry.
    #[error("Storage conflict: {0}")]
    Conflict(String),

    /// Non-transient backend failure (connection, query, I/O).
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Stored data could not be decoded into domain types.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Errors returned by engine operations.
///
/// Every variant other than [`TemporaryFailure`](Self::TemporaryFailure) and
/// [`Storage`](Self::Storage) is a deterministic rejection that left all records
/// unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentError {
    /// No seat left for the activity.
    #[error("No seats left in activity {activity_id} (capacity {capacity})")]
    SeatsExhausted {
        /// Activity that is full.
        activity_id: ActivityId,
        /// Its capacity at decision time.
        capacity: u32,
    },

    /// The user already holds an active enrollment.
    #[error("User {user_id} is already enrolled in activity {activity_id}")]
    AlreadyEnrolled {
        /// User.
        user_id: UserId,
        /// Activity.
        activity_id: ActivityId,
    },

    /// Withdraw on an absent or inactive enrollment.
    #[error("User {user_id} is not enrolled in activity {activity_id}")]
    NotEnrolled {
        /// User.
        user_id: UserId,
        /// Activity.
        activity_id: ActivityId,
    },

    /// The activity does not exist.
    #[error("Activity not found: {0}")]
    ActivityNotFound(ActivityId),

    /// The user directory does not know the user.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Capacity decrease would put active enrollments over capacity.
    #[error("Cannot set capacity to {requested}: {active} enrollments are active")]
    CapacityBelowActiveEnrollments {
        /// Requested capacity.
        requested: u32,
        /// Active enrollments at decision time.
        active: u32,
    },

    /// Storage contention persisted through every retry.
    #[error("Temporarily unavailable after {attempts} attempts, retry later")]
    TemporaryFailure {
        /// Attempts made, including the first.
        attempts: usize,
    },

    /// Malformed input.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The user directory could not be consulted.
    #[error("User directory unavailable: {0}")]
    Directory(String),

    /// Non-transient storage failure.
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl EnrollmentError {
    /// Whether the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TemporaryFailure { .. })
    }

    /// Map a store error that was not retried (or whose retries are spent).
    #[must_use]
    pub fn from_store(error: StoreError, attempts: usize) -> Self {
        match error {
            StoreError::Conflict(_) => Self::TemporaryFailure { attempts },
            StoreError::Backend(msg) | StoreError::Corrupt(msg) => Self::Storage(msg),
        }
    }
}

impl From<StoreError> for EnrollmentError {
    fn from(error: StoreError) -> Self {
        Self::from_store(error, 1)
    }
}
