//! The Seat Ledger: the single authority for capacity decisions.
//!
//! Every write that can change the active-enrollment count or the capacity of
//! an activity goes through here. Each operation opens the activity's
//! [`SeatScope`], decides against the count and capacity loaded under that
//! scope, stages its writes and commits them before the scope is released.
//! Two admissions for the same activity therefore never decide on the same
//! count, and admissions for different activities never wait on each other.
//!
//! # Retries
//!
//! An attempt yields `Result<Result<T, EnrollmentError>, StoreError>`. The outer
//! error is storage trouble; [`StoreError::Conflict`] is retried with backoff.
//! The inner error is a domain verdict and is returned as-is. When retries run
//! out the caller sees [`EnrollmentError::TemporaryFailure`].
//!
//! # Example
//!
//! ```rust,ignore
//! let ledger = SeatLedger::new(store, Arc::new(SystemClock), RetryPolicy::default());
//! let admission = ledger.try_admit(activity_id, user_id).await?;
//! assert!(admission.enrollment.is_active);
//! ```

use crate::metrics::LedgerMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use enrollment_core::environment::Clock;
use enrollment_core::types::validate_capacity;
use enrollment_core::{
    Activity, ActivityId, ActivityStore, Enrollment, EnrollmentError, SeatScope, SeatStore,
    Storage, StoreError, UserId,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one ledger attempt: storage trouble outside, domain verdict inside.
type Attempt<T> = Result<Result<T, EnrollmentError>, StoreError>;

/// A granted seat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admission {
    /// The enrollment as committed
    pub enrollment: Enrollment,
    /// Whether an inactive record was flipped back to active
    pub reactivated: bool,
}

/// A committed capacity change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resize {
    /// The activity with its new capacity
    pub activity: Activity,
    /// Capacity before the change
    pub previous: u32,
}

/// Serializes seat-affecting writes per activity and enforces
/// `active enrollments <= capacity`.
#[derive(Clone)]
pub struct SeatLedger {
    store: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl SeatLedger {
    /// Creates a new `SeatLedger` over an explicit store handle.
    #[must_use]
    pub const fn new(store: Arc<dyn Storage>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            retry,
        }
    }

    /// The store handle this ledger writes through.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    /// The retry policy applied to every operation.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Grant `user_id` a seat in `activity_id`.
    ///
    /// Creates a fresh active enrollment, or flips the user's inactive one back
    /// to active. Both consume a seat.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::ActivityNotFound`]: no such activity
    /// - [`EnrollmentError::AlreadyEnrolled`]: the user already holds a seat
    /// - [`EnrollmentError::SeatsExhausted`]: active enrollments have reached capacity
    /// - [`EnrollmentError::TemporaryFailure`]: contention outlasted every retry
    /// - [`EnrollmentError::Storage`]: non-transient backend failure
    #[tracing::instrument(skip(self), fields(activity_id = %activity_id, user_id = %user_id))]
    pub async fn try_admit(
        &self,
        activity_id: ActivityId,
        user_id: UserId,
    ) -> Result<Admission, EnrollmentError> {
        let started = Instant::now();
        let result = self
            .run("admit", || self.admit_once(activity_id, user_id))
            .await;
        LedgerMetrics::record_admission(&result, started.elapsed());

        match &result {
            Ok(admission) => tracing::debug!(
                reactivated = admission.reactivated,
                "Seat granted"
            ),
            Err(error) => tracing::debug!(error = %error, "Admission rejected"),
        }
        result
    }

    /// Give back the seat held by `user_id` in `activity_id`.
    ///
    /// Returns the now inactive enrollment.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::ActivityNotFound`]: no such activity
    /// - [`EnrollmentError::NotEnrolled`]: no active enrollment to release
    /// - [`EnrollmentError::TemporaryFailure`] / [`EnrollmentError::Storage`]
    #[tracing::instrument(skip(self), fields(activity_id = %activity_id, user_id = %user_id))]
    pub async fn release(
        &self,
        activity_id: ActivityId,
        user_id: UserId,
    ) -> Result<Enrollment, EnrollmentError> {
        let result = self
            .run("release", || self.release_once(activity_id, user_id))
            .await;
        LedgerMetrics::record_withdrawal(&result);
        result
    }

    /// Set the capacity of `activity_id`.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::Validation`]: `new_capacity` is zero
    /// - [`EnrollmentError::ActivityNotFound`]: no such activity
    /// - [`EnrollmentError::CapacityBelowActiveEnrollments`]: more seats are
    ///   taken than `new_capacity` allows; capacity is left unchanged
    /// - [`EnrollmentError::TemporaryFailure`] / [`EnrollmentError::Storage`]
    #[tracing::instrument(skip(self), fields(activity_id = %activity_id))]
    pub async fn resize(
        &self,
        activity_id: ActivityId,
        new_capacity: u32,
    ) -> Result<Resize, EnrollmentError> {
        let result = match validate_capacity(new_capacity) {
            Ok(()) => {
                self.run("resize", || self.resize_once(activity_id, new_capacity))
                    .await
            }
            Err(invalid) => Err(invalid.into()),
        };
        LedgerMetrics::record_capacity_change(&result);

        if let Ok(resize) = &result {
            tracing::info!(
                previous = resize.previous,
                current = resize.activity.capacity,
                "Capacity changed"
            );
        }
        result
    }

    /// Delete `activity_id` together with every enrollment in it.
    ///
    /// Returns how many enrollment records were removed.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::ActivityNotFound`]: no such activity
    /// - [`EnrollmentError::TemporaryFailure`] / [`EnrollmentError::Storage`]
    #[tracing::instrument(skip(self), fields(activity_id = %activity_id))]
    pub async fn void_activity(&self, activity_id: ActivityId) -> Result<u32, EnrollmentError> {
        let removed = self.run("void", || self.void_once(activity_id)).await?;
        LedgerMetrics::record_activity_deleted();
        tracing::info!(removed_enrollments = removed, "Activity deleted");
        Ok(removed)
    }

    /// Seats left, read without the seat scope.
    ///
    /// The value may be stale by the time it is returned. It is for display
    /// only; admission always re-checks under the scope.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::ActivityNotFound`]: no such activity
    /// - [`EnrollmentError::Storage`]: read failure
    pub async fn remaining_seats(&self, activity_id: ActivityId) -> Result<u32, EnrollmentError> {
        self.store
            .get_activity(activity_id)
            .await?
            .map(|listing| listing.remaining_seats())
            .ok_or(EnrollmentError::ActivityNotFound(activity_id))
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, attempt: F) -> Result<T, EnrollmentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        retry_with_predicate(
            self.retry.clone(),
            operation,
            attempt,
            StoreError::is_transient,
        )
        .await
        .unwrap_or_else(|error| Err(EnrollmentError::from_store(error, self.retry.max_attempts())))
    }

    async fn open(&self, activity_id: ActivityId) -> Result<Option<Box<dyn SeatScope>>, StoreError> {
        self.store.lock_activity(activity_id).await
    }

    async fn admit_once(&self, activity_id: ActivityId, user_id: UserId) -> Attempt<Admission> {
        let Some(mut scope) = self.open(activity_id).await? else {
            return Ok(Err(EnrollmentError::ActivityNotFound(activity_id)));
        };

        let existing = scope.enrollment(user_id).await?;
        if existing.as_ref().is_some_and(|e| e.is_active) {
            return Ok(Err(EnrollmentError::AlreadyEnrolled {
                user_id,
                activity_id,
            }));
        }

        let capacity = scope.activity().capacity;
        if scope.active_count() >= capacity {
            return Ok(Err(EnrollmentError::SeatsExhausted {
                activity_id,
                capacity,
            }));
        }

        let now = self.clock.now();
        let reactivated = existing.is_some();
        let enrollment = match existing {
            Some(inactive) => inactive.reactivated(now),
            None => Enrollment::new_active(user_id, activity_id, now),
        };

        scope.save_enrollment(enrollment.clone()).await?;
        scope.commit().await?;

        Ok(Ok(Admission {
            enrollment,
            reactivated,
        }))
    }

    async fn release_once(&self, activity_id: ActivityId, user_id: UserId) -> Attempt<Enrollment> {
        let Some(mut scope) = self.open(activity_id).await? else {
            return Ok(Err(EnrollmentError::ActivityNotFound(activity_id)));
        };

        let Some(active) = scope.enrollment(user_id).await?.filter(|e| e.is_active) else {
            return Ok(Err(EnrollmentError::NotEnrolled {
                user_id,
                activity_id,
            }));
        };

        let inactive = active.deactivated(self.clock.now());
        scope.save_enrollment(inactive.clone()).await?;
        scope.commit().await?;

        Ok(Ok(inactive))
    }

    async fn resize_once(&self, activity_id: ActivityId, new_capacity: u32) -> Attempt<Resize> {
        let Some(mut scope) = self.open(activity_id).await? else {
            return Ok(Err(EnrollmentError::ActivityNotFound(activity_id)));
        };

        let active = scope.active_count();
        if new_capacity < active {
            return Ok(Err(EnrollmentError::CapacityBelowActiveEnrollments {
                requested: new_capacity,
                active,
            }));
        }

        let previous = scope.activity().capacity;
        scope.set_capacity(new_capacity).await?;
        let activity = scope.activity().clone();
        scope.commit().await?;

        Ok(Ok(Resize { activity, previous }))
    }

    async fn void_once(&self, activity_id: ActivityId) -> Attempt<u32> {
        let Some(mut scope) = self.open(activity_id).await? else {
            return Ok(Err(EnrollmentError::ActivityNotFound(activity_id)));
        };

        let removed = scope.delete_activity().await?;
        scope.commit().await?;

        Ok(Ok(removed))
    }
}

impl std::fmt::Debug for SeatLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeatLedger")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use enrollment_core::EnrollmentStore;
    use enrollment_testing::{InMemoryStore, activity_with_capacity, test_clock};

    async fn ledger_with(capacity: u32) -> (SeatLedger, Arc<InMemoryStore>, ActivityId) {
        let store = Arc::new(InMemoryStore::new());
        let activity = activity_with_capacity(capacity);
        let id = activity.id;
        store.insert_activity(activity).await.unwrap();
        let ledger = SeatLedger::new(store.clone(), Arc::new(test_clock()), RetryPolicy::no_retries());
        (ledger, store, id)
    }

    #[tokio::test]
    async fn admits_until_full() {
        let (ledger, _store, id) = ledger_with(1).await;

        let first = ledger.try_admit(id, UserId::new()).await.unwrap();
        assert!(first.enrollment.is_active);
        assert!(!first.reactivated);

        let second = ledger.try_admit(id, UserId::new()).await;
        assert_eq!(
            second,
            Err(EnrollmentError::SeatsExhausted {
                activity_id: id,
                capacity: 1
            })
        );
    }

    #[tokio::test]
    async fn duplicate_admission_is_rejected_without_consuming_a_seat() {
        let (ledger, store, id) = ledger_with(3).await;
        let user = UserId::new();

        ledger.try_admit(id, user).await.unwrap();
        let again = ledger.try_admit(id, user).await;

        assert!(matches!(again, Err(EnrollmentError::AlreadyEnrolled { .. })));
        assert_eq!(store.count_active(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn release_then_readmit_reactivates_the_same_record() {
        let (ledger, store, id) = ledger_with(1).await;
        let user = UserId::new();

        let admitted = ledger.try_admit(id, user).await.unwrap();
        let released = ledger.release(id, user).await.unwrap();
        assert!(!released.is_active);

        let again = ledger.try_admit(id, user).await.unwrap();
        assert!(again.reactivated);
        assert_eq!(again.enrollment.created_at, admitted.enrollment.created_at);
        assert_eq!(store.count_active(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn release_without_active_enrollment_is_rejected() {
        let (ledger, _store, id) = ledger_with(1).await;
        let user = UserId::new();
        assert!(matches!(
            ledger.release(id, user).await,
            Err(EnrollmentError::NotEnrolled { .. })
        ));
    }

    #[tokio::test]
    async fn resize_below_active_count_is_rejected() {
        let (ledger, store, id) = ledger_with(3).await;
        for _ in 0..2 {
            ledger.try_admit(id, UserId::new()).await.unwrap();
        }

        assert_eq!(
            ledger.resize(id, 1).await,
            Err(EnrollmentError::CapacityBelowActiveEnrollments {
                requested: 1,
                active: 2
            })
        );
        let listing = store.get_activity(id).await.unwrap().unwrap();
        assert_eq!(listing.activity.capacity, 3);

        let resized = ledger.resize(id, 2).await.unwrap();
        assert_eq!(resized.previous, 3);
        assert_eq!(resized.activity.capacity, 2);
    }

    #[tokio::test]
    async fn resize_to_zero_is_a_validation_error() {
        let (ledger, _store, id) = ledger_with(3).await;
        assert!(matches!(
            ledger.resize(id, 0).await,
            Err(EnrollmentError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn operations_on_missing_activity_report_not_found() {
        let (ledger, _store, _id) = ledger_with(1).await;
        let missing = ActivityId::new();
        let user = UserId::new();

        let expected = EnrollmentError::ActivityNotFound(missing);
        assert_eq!(ledger.try_admit(missing, user).await.unwrap_err(), expected);
        assert_eq!(ledger.release(missing, user).await.unwrap_err(), expected);
        assert_eq!(ledger.resize(missing, 4).await.unwrap_err(), expected);
        assert_eq!(ledger.void_activity(missing).await.unwrap_err(), expected);
        assert_eq!(ledger.remaining_seats(missing).await.unwrap_err(), expected);
    }

    #[tokio::test]
    async fn remaining_seats_tracks_admissions() {
        let (ledger, _store, id) = ledger_with(4).await;
        ledger.try_admit(id, UserId::new()).await.unwrap();
        assert_eq!(ledger.remaining_seats(id).await.unwrap(), 3);
    }
}
