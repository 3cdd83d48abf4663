//! Enrollment Service: enroll, withdraw and list a user's enrollments.

use crate::environment::EnrollmentEnvironment;
use crate::ledger::SeatLedger;
use enrollment_core::{
    ActivityId, Enrollment, EnrollmentError, EnrollmentEvent, EnrollmentStore, UserId,
};

/// User-facing enrollment operations.
///
/// Seat-affecting writes are delegated to the [`SeatLedger`]; events go out
/// only after the ledger has committed.
#[derive(Clone, Debug)]
pub struct EnrollmentService {
    ledger: SeatLedger,
    env: EnrollmentEnvironment,
}

impl EnrollmentService {
    /// Creates a new `EnrollmentService`
    #[must_use]
    pub const fn new(ledger: SeatLedger, env: EnrollmentEnvironment) -> Self {
        Self { ledger, env }
    }

    /// Enroll `user_id` in `activity_id`.
    ///
    /// An inactive enrollment from an earlier withdrawal is reactivated and
    /// consumes a seat like a fresh one.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::UserNotFound`]: the directory does not know the user
    /// - [`EnrollmentError::Directory`]: the directory could not be consulted
    /// - [`EnrollmentError::ActivityNotFound`], [`EnrollmentError::AlreadyEnrolled`],
    ///   [`EnrollmentError::SeatsExhausted`]: rejected by the Seat Ledger
    /// - [`EnrollmentError::TemporaryFailure`] / [`EnrollmentError::Storage`]
    #[tracing::instrument(skip(self), fields(user_id = %user_id, activity_id = %activity_id))]
    pub async fn enroll(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<Enrollment, EnrollmentError> {
        let known = self
            .env
            .users
            .user_exists(user_id)
            .await
            .map_err(|e| EnrollmentError::Directory(e.0))?;
        if !known {
            return Err(EnrollmentError::UserNotFound(user_id));
        }

        let admission = self.ledger.try_admit(activity_id, user_id).await?;

        self.env
            .notify(EnrollmentEvent::Enrolled {
                user_id,
                activity_id,
                reactivated: admission.reactivated,
                at: admission.enrollment.last_transition_at,
            })
            .await;

        Ok(admission.enrollment)
    }

    /// Withdraw `user_id` from `activity_id`, freeing the seat.
    ///
    /// The record is kept as inactive so a later enroll reactivates it.
    ///
    /// # Errors
    ///
    /// - [`EnrollmentError::ActivityNotFound`]: no such activity
    /// - [`EnrollmentError::NotEnrolled`]: no active enrollment
    /// - [`EnrollmentError::TemporaryFailure`] / [`EnrollmentError::Storage`]
    #[tracing::instrument(skip(self), fields(user_id = %user_id, activity_id = %activity_id))]
    pub async fn withdraw(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<(), EnrollmentError> {
        let released = self.ledger.release(activity_id, user_id).await?;

        self.env
            .notify(EnrollmentEvent::Withdrawn {
                user_id,
                activity_id,
                at: released.last_transition_at,
            })
            .await;

        Ok(())
    }

    /// Every enrollment of `user_id`, active and inactive, oldest first.
    ///
    /// # Errors
    ///
    /// [`EnrollmentError::Storage`] on read failure.
    pub async fn list_enrollments(&self, user_id: UserId) -> Result<Vec<Enrollment>, EnrollmentError> {
        let mut enrollments = self.ledger.store().list_enrollments(user_id).await?;
        enrollments.sort_by_key(|e| e.created_at);
        Ok(enrollments)
    }
}
