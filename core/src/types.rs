//! Domain types for the enrollment engine.
//!
//! Activities carry a capacity plus descriptive metadata; enrollments are keyed by
//! `(user, activity)` and toggle between active and inactive.

use crate::error::ValidationError;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length of an activity title.
pub const MAX_TITLE_LEN: usize = 50;
/// Maximum length of an activity description.
pub const MAX_DESCRIPTION_LEN: usize = 255;
/// Maximum length of a photo URL.
pub const MAX_PHOTO_URL_LEN: usize = 511;
/// Maximum length of an instructor name.
pub const MAX_INSTRUCTOR_LEN: usize = 50;
/// Maximum length of a category name.
pub const MAX_CATEGORY_LEN: usize = 40;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an activity
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActivityId(Uuid);

impl ActivityId {
    /// Creates a new random `ActivityId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `ActivityId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ActivityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user, issued by the identity collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// Day of the week an activity runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    /// Monday
    Monday,
    /// Tuesday
    Tuesday,
    /// Wednesday
    Wednesday,
    /// Thursday
    Thursday,
    /// Friday
    Friday,
    /// Saturday
    Saturday,
    /// Sunday
    Sunday,
}

impl Weekday {
    /// All days, Monday first.
    pub const ALL: [Self; 7] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
        Self::Sunday,
    ];

    /// Convert to the lowercase storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weekday {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|day| day.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownWeekday(s.to_string()))
    }
}

/// Weekly time slot of an activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Day of the week
    pub day: Weekday,
    /// Start time of day
    pub starts_at: NaiveTime,
    /// End time of day
    pub ends_at: NaiveTime,
}

impl Schedule {
    /// Create a schedule, rejecting slots that end before they start.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvertedSchedule`] when `ends_at < starts_at`.
    pub fn new(
        day: Weekday,
        starts_at: NaiveTime,
        ends_at: NaiveTime,
    ) -> Result<Self, ValidationError> {
        let schedule = Self {
            day,
            starts_at,
            ends_at,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Parse a schedule from a day name and two `HH:MM` times.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an unknown day, a malformed time, or an
    /// inverted slot.
    pub fn parse(day: &str, starts_at: &str, ends_at: &str) -> Result<Self, ValidationError> {
        let parse_time = |raw: &str| {
            NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .map_err(|_| ValidationError::InvalidTime(raw.to_string()))
        };
        Self::new(day.parse()?, parse_time(starts_at)?, parse_time(ends_at)?)
    }

    /// Check that the slot does not end before it starts.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvertedSchedule`] when `ends_at < starts_at`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ends_at < self.starts_at {
            return Err(ValidationError::InvertedSchedule {
                starts_at: self.starts_at,
                ends_at: self.ends_at,
            });
        }
        Ok(())
    }

    /// Whether the slot is running at the given time of day (bounds inclusive).
    #[must_use]
    pub fn is_running_at(&self, time: NaiveTime) -> bool {
        self.starts_at <= time && time <= self.ends_at
    }
}

// ============================================================================
// Activity
// ============================================================================

/// Descriptive metadata of an activity. None of it affects seat accounting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDetails {
    /// Short title
    pub title: String,
    /// Free-form description
    pub description: String,
    /// Weekly time slot
    pub schedule: Schedule,
    /// Picture shown in listings
    pub photo_url: String,
    /// Person running the activity
    pub instructor: String,
    /// Category used by search
    pub category: String,
}

impl ActivityDetails {
    /// Validate every descriptive field.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        check_len("title", &self.title, MAX_TITLE_LEN)?;
        check_len("description", &self.description, MAX_DESCRIPTION_LEN)?;
        check_len("photo_url", &self.photo_url, MAX_PHOTO_URL_LEN)?;
        check_len("instructor", &self.instructor, MAX_INSTRUCTOR_LEN)?;
        check_len("category", &self.category, MAX_CATEGORY_LEN)?;
        self.schedule.validate()
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Validate a requested capacity.
///
/// # Errors
///
/// Returns [`ValidationError::NonPositiveCapacity`] for zero.
pub const fn validate_capacity(capacity: u32) -> Result<(), ValidationError> {
    if capacity == 0 {
        return Err(ValidationError::NonPositiveCapacity);
    }
    Ok(())
}

/// Input for creating an activity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewActivity {
    /// Initial number of seats
    pub capacity: u32,
    /// Descriptive metadata
    #[serde(flatten)]
    pub details: ActivityDetails,
}

impl NewActivity {
    /// Validate capacity and details.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_capacity(self.capacity)?;
        self.details.validate()
    }
}

/// A schedulable activity with a finite number of seats.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Immutable identifier
    pub id: ActivityId,
    /// Maximum number of simultaneous active enrollments
    pub capacity: u32,
    /// Descriptive metadata
    #[serde(flatten)]
    pub details: ActivityDetails,
    /// When the activity was created
    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// Build a fresh activity record from validated input.
    #[must_use]
    pub fn from_new(id: ActivityId, new: NewActivity, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            capacity: new.capacity,
            details: new.details,
            created_at,
        }
    }
}

/// Read model: an activity plus its (possibly stale) active enrollment count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityListing {
    /// The activity
    pub activity: Activity,
    /// Active enrollments at read time
    pub active_enrollments: u32,
}

impl ActivityListing {
    /// Seats left for display purposes. Never use this for admission.
    #[must_use]
    pub const fn remaining_seats(&self) -> u32 {
        self.activity.capacity.saturating_sub(self.active_enrollments)
    }
}

/// Search criteria for activities. Every present criterion must match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFilter {
    /// Exact id
    pub id: Option<ActivityId>,
    /// Case-insensitive title substring
    pub title: Option<String>,
    /// Case-insensitive category substring
    pub category: Option<String>,
    /// Day of the week
    pub day: Option<Weekday>,
    /// Time of day the activity must be running at
    pub at: Option<NaiveTime>,
}

impl ActivityFilter {
    /// A filter matching every activity.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one id.
    #[must_use]
    pub const fn with_id(mut self, id: ActivityId) -> Self {
        self.id = Some(id);
        self
    }

    /// Restrict to titles containing `title`.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Restrict to categories containing `category`.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Restrict to one day of the week.
    #[must_use]
    pub const fn with_day(mut self, day: Weekday) -> Self {
        self.day = Some(day);
        self
    }

    /// Restrict to activities running at `time`.
    #[must_use]
    pub const fn running_at(mut self, time: NaiveTime) -> Self {
        self.at = Some(time);
        self
    }

    /// Whether `activity` satisfies every criterion.
    #[must_use]
    pub fn matches(&self, activity: &Activity) -> bool {
        let contains = |haystack: &str, needle: &str| {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        };

        self.id.is_none_or(|id| id == activity.id)
            && self
                .title
                .as_deref()
                .is_none_or(|t| contains(&activity.details.title, t))
            && self
                .category
                .as_deref()
                .is_none_or(|c| contains(&activity.details.category, c))
            && self.day.is_none_or(|d| d == activity.details.schedule.day)
            && self
                .at
                .is_none_or(|t| activity.details.schedule.is_running_at(t))
    }
}

/// Sort listings the way search results are presented: day, start time, title.
pub fn sort_listings(listings: &mut [ActivityListing]) {
    listings.sort_by(|a, b| {
        let (a, b) = (&a.activity.details, &b.activity.details);
        (a.schedule.day, a.schedule.starts_at, &a.title).cmp(&(
            b.schedule.day,
            b.schedule.starts_at,
            &b.title,
        ))
    });
}

// ============================================================================
// Enrollment
// ============================================================================

/// A user's enrollment in an activity, unique per `(user_id, activity_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    /// Enrolled user
    pub user_id: UserId,
    /// Activity enrolled in
    pub activity_id: ActivityId,
    /// Whether the enrollment currently holds a seat
    pub is_active: bool,
    /// First successful enrollment
    pub created_at: DateTime<Utc>,
    /// Last active/inactive transition
    pub last_transition_at: DateTime<Utc>,
}

impl Enrollment {
    /// A brand-new active enrollment.
    #[must_use]
    pub const fn new_active(user_id: UserId, activity_id: ActivityId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            activity_id,
            is_active: true,
            created_at: now,
            last_transition_at: now,
        }
    }

    /// The same record flipped to active.
    #[must_use]
    pub const fn reactivated(mut self, now: DateTime<Utc>) -> Self {
        self.is_active = true;
        self.last_transition_at = now;
        self
    }

    /// The same record flipped to inactive.
    #[must_use]
    pub const fn deactivated(mut self, now: DateTime<Utc>) -> Self {
        self.is_active = false;
        self.last_transition_at = now;
        self
    }
}
