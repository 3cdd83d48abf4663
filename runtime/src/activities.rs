//! Activity Service: activity lifecycle, search and capacity edits.

use crate::environment::EnrollmentEnvironment;
use crate::ledger::SeatLedger;
use enrollment_core::types::sort_listings;
use enrollment_core::{
    Activity, ActivityDetails, ActivityFilter, ActivityId, ActivityListing, ActivityStore,
    EnrollmentError, EnrollmentEvent, NewActivity,
};

/// Administrative and read operations on activities.
///
/// Capacity edits and deletion go through the [`SeatLedger`] so they are
/// serialized with admissions. Descriptive edits and reads use the
/// non-locking store paths.
#[derive(Clone, Debug)]
pub struct ActivityService {
    ledger: SeatLedger,
    env: EnrollmentEnvironment,
}

impl ActivityService {
    /// Creates a new `ActivityService`
    #[must_use]
    pub const fn new(ledger: SeatLedger, env: EnrollmentEnvironment) -> Self {
        Self { ledger, env }
    }

    /// Validate and persist a new activity.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::Validation`]: a field is malformed
    /// - [`EnrollmentError::Storage`]: the write failed
    #[tracing::instrument(skip(self, new), fields(title = %new.details.title, capacity = new.capacity))]
    pub async fn create_activity(&self, new: NewActivity) -> Result<Activity, EnrollmentError> {
        new.validate()?;

        let activity = Activity::from_new(ActivityId::new(), new, self.env.clock.now());
        self.ledger
            .store()
            .insert_activity(activity.clone())
            .await?;

        tracing::info!(activity_id = %activity.id, "Activity created");
        self.env
            .notify(EnrollmentEvent::ActivityCreated {
                activity_id: activity.id,
                capacity: activity.capacity,
                at: activity.created_at,
            })
            .await;

        Ok(activity)
    }

    /// Load one activity with its current seat usage.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::ActivityNotFound`]: no such activity
    /// - [`EnrollmentError::Storage`]: read failure
    pub async fn get_activity(&self, id: ActivityId) -> Result<ActivityListing, EnrollmentError> {
        self.ledger
            .store()
            .get_activity(id)
            .await?
            .ok_or(EnrollmentError::ActivityNotFound(id))
    }

    /// Activities matching `filter`, ordered by day, start time and title.
    ///
    /// # Errors
    ///
    /// [`EnrollmentError::Storage`] on read failure.
    pub async fn search_activities(
        &self,
        filter: ActivityFilter,
    ) -> Result<Vec<ActivityListing>, EnrollmentError> {
        let mut listings = self.ledger.store().list_activities(filter).await?;
        sort_listings(&mut listings);
        Ok(listings)
    }

    /// Replace the descriptive fields of an activity.
    ///
    /// Capacity and enrollments are untouched.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::Validation`]: a field is malformed
    /// - [`EnrollmentError::ActivityNotFound`]: no such activity
    /// - [`EnrollmentError::Storage`]: the write failed
    #[tracing::instrument(skip(self, details), fields(activity_id = %id))]
    pub async fn update_details(
        &self,
        id: ActivityId,
        details: ActivityDetails,
    ) -> Result<Activity, EnrollmentError> {
        details.validate()?;
        self.ledger
            .store()
            .update_details(id, details)
            .await?
            .ok_or(EnrollmentError::ActivityNotFound(id))
    }

    /// Change the capacity of an activity.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::Validation`]: `new_capacity` is zero
    /// - [`EnrollmentError::ActivityNotFound`]: no such activity
    /// - [`EnrollmentError::CapacityBelowActiveEnrollments`]: too many seats taken
    /// - [`EnrollmentError::TemporaryFailure`] / [`EnrollmentError::Storage`]
    pub async fn update_capacity(
        &self,
        id: ActivityId,
        new_capacity: u32,
    ) -> Result<Activity, EnrollmentError> {
        let resize = self.ledger.resize(id, new_capacity).await?;

        self.env
            .notify(EnrollmentEvent::CapacityChanged {
                activity_id: id,
                previous: resize.previous,
                current: resize.activity.capacity,
                at: self.env.clock.now(),
            })
            .await;

        Ok(resize.activity)
    }

    /// Delete an activity and every enrollment in it.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::ActivityNotFound`]: no such activity
    /// - [`EnrollmentError::TemporaryFailure`] / [`EnrollmentError::Storage`]
    pub async fn delete_activity(&self, id: ActivityId) -> Result<(), EnrollmentError> {
        let removed_enrollments = self.ledger.void_activity(id).await?;

        self.env
            .notify(EnrollmentEvent::ActivityDeleted {
                activity_id: id,
                removed_enrollments,
                at: self.env.clock.now(),
            })
            .await;

        Ok(())
    }

    /// Seats left for display. Possibly stale.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::ActivityNotFound`]: no such activity
    /// - [`EnrollmentError::Storage`]: read failure
    pub async fn remaining_seats(&self, id: ActivityId) -> Result<u32, EnrollmentError> {
        self.ledger.remaining_seats(id).await
    }
}
