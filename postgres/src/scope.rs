//! Seat scope backed by a transaction holding the activity row lock.

use enrollment_core::{Activity, Enrollment, SeatScope, StoreError, StoreFuture, UserId};
use sqlx::{Postgres, Transaction};

use crate::error::classify;
use crate::rows::{self, ENROLLMENT_COLUMNS};

/// Open transaction that has locked one `activities` row `FOR UPDATE`.
///
/// Every other scope for the same activity waits on that row lock until this
/// transaction commits or rolls back. Dropping the scope rolls back.
pub(crate) struct PgSeatScope {
    tx: Transaction<'static, Postgres>,
    activity: Activity,
    active: u32,
    deleted: bool,
}

impl PgSeatScope {
    pub(crate) const fn new(tx: Transaction<'static, Postgres>, activity: Activity, active: u32) -> Self {
        Self {
            tx,
            activity,
            active,
            deleted: false,
        }
    }

    async fn load(&mut self, user_id: UserId) -> Result<Option<Enrollment>, StoreError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = $1 AND activity_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(self.activity.id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)?;
        row.as_ref().map(rows::enrollment).transpose()
    }

    async fn upsert(&mut self, enrollment: Enrollment) -> Result<(), StoreError> {
        if enrollment.activity_id != self.activity.id {
            return Err(StoreError::Backend(format!(
                "enrollment for activity {} saved in scope of {}",
                enrollment.activity_id, self.activity.id
            )));
        }
        if self.deleted {
            return Err(StoreError::Backend(format!(
                "activity {} is staged for deletion",
                self.activity.id
            )));
        }

        let was_active = self
            .load(enrollment.user_id)
            .await?
            .is_some_and(|e| e.is_active);

        sqlx::query(
            r"
            INSERT INTO enrollments (user_id, activity_id, is_active, created_at, last_transition_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, activity_id) DO UPDATE
            SET is_active = EXCLUDED.is_active,
                last_transition_at = EXCLUDED.last_transition_at
            ",
        )
        .bind(enrollment.user_id.as_uuid())
        .bind(enrollment.activity_id.as_uuid())
        .bind(enrollment.is_active)
        .bind(enrollment.created_at)
        .bind(enrollment.last_transition_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        match (was_active, enrollment.is_active) {
            (false, true) => self.active += 1,
            (true, false) => self.active = self.active.saturating_sub(1),
            _ => {}
        }
        Ok(())
    }

    async fn update_capacity(&mut self, capacity: u32) -> Result<(), StoreError> {
        sqlx::query("UPDATE activities SET capacity = $2 WHERE id = $1")
            .bind(self.activity.id.as_uuid())
            .bind(rows::capacity_column(capacity)?)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        self.activity.capacity = capacity;
        Ok(())
    }

    async fn remove(&mut self) -> Result<u32, StoreError> {
        let enrollments = sqlx::query("DELETE FROM enrollments WHERE activity_id = $1")
            .bind(self.activity.id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;

        sqlx::query("DELETE FROM activities WHERE id = $1")
            .bind(self.activity.id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;

        self.deleted = true;
        self.active = 0;
        rows::count(enrollments.rows_affected())
    }
}

impl SeatScope for PgSeatScope {
    fn activity(&self) -> &Activity {
        &self.activity
    }

    fn active_count(&self) -> u32 {
        self.active
    }

    fn enrollment(&mut self, user_id: UserId) -> StoreFuture<'_, Option<Enrollment>> {
        Box::pin(self.load(user_id))
    }

    fn save_enrollment(&mut self, enrollment: Enrollment) -> StoreFuture<'_, ()> {
        Box::pin(self.upsert(enrollment))
    }

    fn set_capacity(&mut self, capacity: u32) -> StoreFuture<'_, ()> {
        Box::pin(self.update_capacity(capacity))
    }

    fn delete_activity(&mut self) -> StoreFuture<'_, u32> {
        Box::pin(self.remove())
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        let activity_id = self.activity.id;
        let tx = self.tx;
        Box::pin(async move {
            tx.commit().await.map_err(classify)?;
            tracing::trace!(%activity_id, "Seat scope committed");
            Ok(())
        })
    }
}
