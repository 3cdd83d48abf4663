//! Fault injection for storage contention.

use enrollment_core::{
    Activity, ActivityDetails, ActivityFilter, ActivityId, ActivityListing, ActivityStore,
    Enrollment, EnrollmentStore, SeatScope, SeatStore, StoreError, StoreFuture, UserId,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wraps a store and makes the first `conflicts` calls to `lock_activity`
/// fail with [`StoreError::Conflict`], as a contended backend would.
///
/// Every other call is forwarded unchanged.
#[derive(Debug)]
pub struct ContendedStore<S> {
    inner: S,
    remaining_conflicts: AtomicUsize,
    lock_attempts: AtomicUsize,
}

impl<S> ContendedStore<S> {
    /// Fail the first `conflicts` scope acquisitions.
    #[must_use]
    pub const fn new(inner: S, conflicts: usize) -> Self {
        Self {
            inner,
            remaining_conflicts: AtomicUsize::new(conflicts),
            lock_attempts: AtomicUsize::new(0),
        }
    }

    /// How many times `lock_activity` has been called.
    #[must_use]
    pub fn lock_attempts(&self) -> usize {
        self.lock_attempts.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    fn take_conflict(&self) -> bool {
        self.remaining_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<S: ActivityStore> ActivityStore for ContendedStore<S> {
    fn insert_activity(&self, activity: Activity) -> StoreFuture<'_, ()> {
        self.inner.insert_activity(activity)
    }

    fn get_activity(&self, id: ActivityId) -> StoreFuture<'_, Option<ActivityListing>> {
        self.inner.get_activity(id)
    }

    fn list_activities(&self, filter: ActivityFilter) -> StoreFuture<'_, Vec<ActivityListing>> {
        self.inner.list_activities(filter)
    }

    fn update_details(
        &self,
        id: ActivityId,
        details: ActivityDetails,
    ) -> StoreFuture<'_, Option<Activity>> {
        self.inner.update_details(id, details)
    }
}

impl<S: EnrollmentStore> EnrollmentStore for ContendedStore<S> {
    fn find_enrollment(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> StoreFuture<'_, Option<Enrollment>> {
        self.inner.find_enrollment(user_id, activity_id)
    }

    fn list_enrollments(&self, user_id: UserId) -> StoreFuture<'_, Vec<Enrollment>> {
        self.inner.list_enrollments(user_id)
    }

    fn count_active(&self, activity_id: ActivityId) -> StoreFuture<'_, u32> {
        self.inner.count_active(activity_id)
    }
}

impl<S: SeatStore> SeatStore for ContendedStore<S> {
    fn lock_activity(&self, id: ActivityId) -> StoreFuture<'_, Option<Box<dyn SeatScope>>> {
        self.lock_attempts.fetch_add(1, Ordering::SeqCst);
        if self.take_conflict() {
            return Box::pin(std::future::ready(Err(StoreError::Conflict(format!(
                "injected conflict on activity {id}"
            )))));
        }
        self.inner.lock_activity(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{InMemoryStore, activity_with_capacity};

    #[tokio::test]
    async fn conflicts_are_injected_then_calls_pass_through() {
        let store = ContendedStore::new(InMemoryStore::new(), 2);
        let activity = activity_with_capacity(1);
        store.insert_activity(activity.clone()).await.unwrap();

        assert!(store.lock_activity(activity.id).await.is_err());
        assert!(store.lock_activity(activity.id).await.is_err());
        assert!(store.lock_activity(activity.id).await.unwrap().is_some());
        assert_eq!(store.lock_attempts(), 3);
    }
}
