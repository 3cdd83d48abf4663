//! # Enrollment Testing
//!
//! In-memory storage and test doubles for the enrollment engine.
//!
//! This crate provides:
//! - [`InMemoryStore`]: a complete [`Storage`](enrollment_core::Storage)
//!   implementation with per-activity async locks
//! - [`ContendedStore`]: a wrapper that injects lock conflicts
//! - Mock implementations of the environment collaborators
//! - Builders for sample activities
//!
//! ## Example
//!
//! ```ignore
//! use enrollment_testing::{InMemoryStore, RecordingEventSink, test_clock};
//! use enrollment_runtime::{EnrollmentEngine, EnrollmentEnvironment, RetryPolicy};
//!
//! #[tokio::test]
//! async fn test_enroll() {
//!     let events = Arc::new(RecordingEventSink::new());
//!     let env = EnrollmentEnvironment::new(Arc::new(test_clock()), events.clone(), Arc::new(AllowAllUsers));
//!     let engine = EnrollmentEngine::new(Arc::new(InMemoryStore::new()), env, RetryPolicy::default());
//!
//!     let activity = engine.activities.create_activity(new_activity).await.unwrap();
//!     engine.enrollments.enroll(UserId::new(), activity.id).await.unwrap();
//!     assert_eq!(events.events().len(), 2);
//! }
//! ```

use chrono::{DateTime, Utc};
use enrollment_core::environment::Clock;

mod faults;
mod memory_store;

pub use faults::ContendedStore;
pub use memory_store::{DEFAULT_LOCK_TIMEOUT, InMemoryStore};

/// Mock implementations of environment collaborators.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use enrollment_core::{
        DirectoryError, EnrollmentEvent, EventSink, SinkError, UserDirectory, UserId,
    };
    use std::collections::HashSet;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use enrollment_testing::mocks::FixedClock;
    /// use enrollment_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }

    /// Event sink that keeps every published event in memory.
    #[derive(Debug, Default)]
    pub struct RecordingEventSink {
        events: Mutex<Vec<EnrollmentEvent>>,
    }

    impl RecordingEventSink {
        /// Create an empty sink
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Events published so far, in order.
        #[must_use]
        pub fn events(&self) -> Vec<EnrollmentEvent> {
            self.events
                .lock()
                .map(|events| events.clone())
                .unwrap_or_default()
        }
    }

    impl EventSink for RecordingEventSink {
        fn publish(
            &self,
            event: EnrollmentEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
            let result = self
                .events
                .lock()
                .map(|mut events| events.push(event))
                .map_err(|e| SinkError::Delivery(e.to_string()));
            Box::pin(std::future::ready(result))
        }
    }

    /// Event sink whose deliveries always fail.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FailingEventSink;

    impl EventSink for FailingEventSink {
        fn publish(
            &self,
            _event: EnrollmentEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
            Box::pin(std::future::ready(Err(SinkError::Delivery(
                "downstream unavailable".to_string(),
            ))))
        }
    }

    /// Event sink whose deliveries never complete.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct StalledEventSink;

    impl EventSink for StalledEventSink {
        fn publish(
            &self,
            _event: EnrollmentEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
            Box::pin(std::future::pending())
        }
    }

    /// User directory that knows everyone except the listed users.
    #[derive(Debug, Clone, Default)]
    pub struct DenyListDirectory {
        unknown: HashSet<UserId>,
    }

    impl DenyListDirectory {
        /// Treat `unknown` as users that do not exist.
        #[must_use]
        pub fn new(unknown: impl IntoIterator<Item = UserId>) -> Self {
            Self {
                unknown: unknown.into_iter().collect(),
            }
        }
    }

    impl UserDirectory for DenyListDirectory {
        fn user_exists(
            &self,
            user_id: UserId,
        ) -> Pin<Box<dyn Future<Output = Result<bool, DirectoryError>> + Send + '_>> {
            Box::pin(std::future::ready(Ok(!self.unknown.contains(&user_id))))
        }
    }

    /// User directory that cannot be reached.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UnreachableDirectory;

    impl UserDirectory for UnreachableDirectory {
        fn user_exists(
            &self,
            _user_id: UserId,
        ) -> Pin<Box<dyn Future<Output = Result<bool, DirectoryError>> + Send + '_>> {
            Box::pin(std::future::ready(Err(DirectoryError(
                "identity service timed out".to_string(),
            ))))
        }
    }
}

/// Builders for sample activities.
pub mod fixtures {
    use enrollment_core::{Activity, ActivityDetails, ActivityId, NewActivity, Schedule, Weekday};

    use super::mocks::test_clock;
    use super::Clock;

    /// Descriptive fields for a sample activity.
    ///
    /// `starts_at` and `ends_at` are `HH:MM`. Malformed or inverted times fall
    /// back to a zero-length slot at midnight.
    #[must_use]
    pub fn sample_details(title: &str, day: Weekday, starts_at: &str, ends_at: &str) -> ActivityDetails {
        let schedule = Schedule::parse(day.as_str(), starts_at, ends_at).unwrap_or(Schedule {
            day,
            starts_at: chrono::NaiveTime::MIN,
            ends_at: chrono::NaiveTime::MIN,
        });
        ActivityDetails {
            title: title.to_string(),
            description: format!("{title} session"),
            schedule,
            photo_url: String::new(),
            instructor: "Alex".to_string(),
            category: "General".to_string(),
        }
    }

    /// Creation input for a sample activity with 10 seats.
    #[must_use]
    pub fn sample_new_activity(title: &str, day: Weekday, starts_at: &str, ends_at: &str) -> NewActivity {
        NewActivity {
            capacity: 10,
            details: sample_details(title, day, starts_at, ends_at),
        }
    }

    /// A stored-ready activity with the given capacity.
    #[must_use]
    pub fn activity_with_capacity(capacity: u32) -> Activity {
        let mut new = sample_new_activity("Morning Yoga", Weekday::Monday, "08:00", "09:00");
        new.capacity = capacity;
        Activity::from_new(ActivityId::new(), new, test_clock().now())
    }
}

// Re-export commonly used items
pub use fixtures::{activity_with_capacity, sample_details, sample_new_activity};
pub use mocks::{
    DenyListDirectory, FailingEventSink, FixedClock, RecordingEventSink, StalledEventSink,
    UnreachableDirectory, test_clock,
};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use enrollment_core::{EventSink, UserDirectory, UserId, Weekday};

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
        assert_eq!(time1.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn sample_activity_is_valid() {
        let new = sample_new_activity("Chess", Weekday::Sunday, "10:00", "12:00");
        assert!(new.validate().is_ok());
        assert_eq!(activity_with_capacity(3).capacity, 3);
    }

    #[tokio::test]
    async fn deny_list_directory_rejects_listed_users() {
        let stranger = UserId::new();
        let directory = DenyListDirectory::new([stranger]);
        assert!(!directory.user_exists(stranger).await.unwrap());
        assert!(directory.user_exists(UserId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn failing_sink_reports_delivery_error() {
        let sink = FailingEventSink;
        let result = sink
            .publish(enrollment_core::EnrollmentEvent::ActivityCreated {
                activity_id: enrollment_core::ActivityId::new(),
                capacity: 1,
                at: test_clock().now(),
            })
            .await;
        assert!(result.is_err());
    }
}
