//! # Enrollment Core
//!
//! Core types and traits for the capacity-constrained enrollment engine.
//!
//! This crate defines everything the engine reasons about without performing
//! any I/O itself:
//!
//! - **Types**: activities, enrollments, schedules and search filters
//! - **Errors**: the domain error taxonomy returned to callers
//! - **Store traits**: the Activity Store, the Enrollment Store and the
//!   per-activity seat scope through which every seat-affecting write flows
//! - **Events**: fire-and-forget notifications handed to an [`event::EventSink`]
//! - **Environment**: injected collaborators (clock, user directory)
//!
//! ## The Invariant
//!
//! For every activity `A`:
//!
//! ```text
//! count(enrollments where activity_id = A.id and is_active) <= A.capacity
//! ```
//!
//! Storage backends uphold it by serializing all seat-affecting writes for one
//! activity through a [`store::SeatScope`]. The admission rule itself lives in
//! the Seat Ledger (`enrollment-runtime`).
//!
//! ## Implementations
//!
//! - `InMemoryStore` (in `enrollment-testing`): per-activity async mutexes
//! - `PostgresStore` (in `enrollment-postgres`): `SELECT ... FOR UPDATE` on the
//!   activity row inside a transaction

// Re-export commonly used types
pub use chrono::{DateTime, NaiveTime, Utc};

pub mod directory;
pub mod error;
pub mod event;
pub mod store;
pub mod types;

pub use directory::{AllowAllUsers, DirectoryError, UserDirectory};
pub use error::{EnrollmentError, StoreError, ValidationError};
pub use event::{EnrollmentEvent, EventSink, SinkError, TracingEventSink};
pub use store::{ActivityStore, EnrollmentStore, SeatScope, SeatStore, Storage, StoreFuture};
pub use types::{
    Activity, ActivityDetails, ActivityFilter, ActivityId, ActivityListing, Enrollment,
    NewActivity, Schedule, UserId, Weekday,
};

/// Environment module - Dependency injection traits
///
/// All time-dependent behavior goes through [`Clock`](environment::Clock) so
/// tests can pin timestamps.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use enrollment_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
