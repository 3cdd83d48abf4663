//! Storage traits: Activity Store, Enrollment Store and the per-activity seat scope.
//!
//! # Design
//!
//! Reads and writes are split by their consistency needs:
//!
//! - [`ActivityStore`] and [`EnrollmentStore`] serve reads that may be slightly
//!   stale (listings, seat counts for display) and descriptive edits that never
//!   touch seat accounting. Reads must never block on a held seat scope.
//! - [`SeatStore`] opens a [`SeatScope`]: an exclusive unit of work for ONE
//!   activity. Every write that can change the active-enrollment count or the
//!   capacity (admit, release, resize, cascade delete) happens inside a scope.
//!
//! Scopes for different activities never wait on each other.
//!
//! # Atomicity
//!
//! Writes made through a scope become visible only on [`SeatScope::commit`].
//! Dropping a scope (for example because the request future was cancelled)
//! discards them and releases the lock.
//!
//! # Dyn Compatibility
//!
//! These traits use explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
//! so the engine can hold an `Arc<dyn Storage>` chosen at startup.

use crate::error::StoreError;
use crate::types::{Activity, ActivityDetails, ActivityFilter, ActivityId, ActivityListing, Enrollment, UserId};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by storage operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Activity records and their descriptive fields.
pub trait ActivityStore: Send + Sync {
    /// Persist a new activity.
    ///
    /// # Errors
    ///
    /// - `Conflict`: an activity with the same id already exists
    /// - `Backend`: the write failed
    fn insert_activity(&self, activity: Activity) -> StoreFuture<'_, ()>;

    /// Load an activity by id. `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// `Backend` or `Corrupt` on read failure.
    fn get_activity(&self, id: ActivityId) -> StoreFuture<'_, Option<ActivityListing>>;

    /// List activities matching `filter`, each with a best-effort active count.
    ///
    /// # Errors
    ///
    /// `Backend` or `Corrupt` on read failure.
    fn list_activities(&self, filter: ActivityFilter) -> StoreFuture<'_, Vec<ActivityListing>>;

    /// Replace the descriptive fields of an activity. Capacity is untouched.
    ///
    /// Returns the updated activity, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// `Backend` on write failure.
    fn update_details(
        &self,
        id: ActivityId,
        details: ActivityDetails,
    ) -> StoreFuture<'_, Option<Activity>>;
}

/// Enrollment records, read side.
pub trait EnrollmentStore: Send + Sync {
    /// Load the enrollment for `(user, activity)`, active or not.
    ///
    /// # Errors
    ///
    /// `Backend` on read failure.
    fn find_enrollment(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> StoreFuture<'_, Option<Enrollment>>;

    /// Every enrollment of a user, oldest first.
    ///
    /// # Errors
    ///
    /// `Backend` on read failure.
    fn list_enrollments(&self, user_id: UserId) -> StoreFuture<'_, Vec<Enrollment>>;

    /// Active enrollments of an activity. Possibly stale; display only.
    ///
    /// # Errors
    ///
    /// `Backend` on read failure.
    fn count_active(&self, activity_id: ActivityId) -> StoreFuture<'_, u32>;
}

/// Opens per-activity exclusive scopes.
pub trait SeatStore: Send + Sync {
    /// Acquire the exclusive scope for one activity.
    ///
    /// Waits while another scope for the same activity is open, up to the
    /// backend's lock timeout. Returns `None` if the activity does not exist
    /// (checked after the lock is held).
    ///
    /// # Errors
    ///
    /// - `Conflict`: lock wait timed out or the backend detected contention
    /// - `Backend`: connection or query failure
    fn lock_activity(&self, id: ActivityId) -> StoreFuture<'_, Option<Box<dyn SeatScope>>>;
}

/// Exclusive unit of work for one activity.
///
/// The activity and its active-enrollment count are loaded when the scope is
/// opened and stay authoritative for its whole lifetime, because every other
/// writer of those values must hold the same scope.
pub trait SeatScope: Send {
    /// The activity as loaded under the lock, including staged capacity changes.
    fn activity(&self) -> &Activity;

    /// Active enrollments, including staged changes.
    fn active_count(&self) -> u32;

    /// Load the enrollment of `user_id` in this activity, including staged changes.
    ///
    /// # Errors
    ///
    /// `Backend` on read failure.
    fn enrollment(&mut self, user_id: UserId) -> StoreFuture<'_, Option<Enrollment>>;

    /// Stage an insert-or-update of an enrollment of this activity.
    ///
    /// # Errors
    ///
    /// - `Conflict`: a concurrent insert for the same key won the race
    /// - `Backend`: write failure
    fn save_enrollment(&mut self, enrollment: Enrollment) -> StoreFuture<'_, ()>;

    /// Stage a capacity change.
    ///
    /// # Errors
    ///
    /// `Backend` on write failure.
    fn set_capacity(&mut self, capacity: u32) -> StoreFuture<'_, ()>;

    /// Stage deletion of the activity and all its enrollments.
    ///
    /// Returns how many enrollment records will be removed.
    ///
    /// # Errors
    ///
    /// `Backend` on write failure.
    fn delete_activity(&mut self) -> StoreFuture<'_, u32>;

    /// Apply every staged write atomically and release the lock.
    ///
    /// # Errors
    ///
    /// - `Conflict`: the backend aborted the unit of work (serialization failure)
    /// - `Backend`: commit failed; nothing was applied
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()>;
}

/// The full storage handle the engine is constructed with.
pub trait Storage: ActivityStore + EnrollmentStore + SeatStore {}

impl<T> Storage for T where T: ActivityStore + EnrollmentStore + SeatStore {}
