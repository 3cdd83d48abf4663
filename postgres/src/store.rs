//! [`PostgresStore`]: the three storage traits over a `PgPool`.

use std::time::Duration;

use enrollment_core::{
    Activity, ActivityDetails, ActivityFilter, ActivityId, ActivityListing, ActivityStore,
    Enrollment, EnrollmentStore, SeatScope, SeatStore, StoreError, StoreFuture, UserId,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};

use crate::error::classify;
use crate::rows::{self, ACTIVE_COUNT_COLUMN, ACTIVITY_COLUMNS, ENROLLMENT_COLUMNS};
use crate::scope::PgSeatScope;

/// Default bound on how long a scope waits for another scope's row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Pool settings for [`PostgresStore::connect`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum open connections
    pub max_connections: u32,
    /// Connections kept open when idle
    pub min_connections: u32,
    /// How long to wait for a free connection
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// `PostgreSQL` storage backend.
///
/// Seat scopes are transactions that lock the activity row with
/// `SELECT ... FOR UPDATE`; the lock wait is bounded with the transaction-local
/// `lock_timeout` setting. Plain reads never lock.
///
/// # Example
///
/// ```ignore
/// let store = PostgresStore::connect("postgres://localhost/enrollment", &PoolSettings::default()).await?;
/// store.migrate().await?;
/// let engine = EnrollmentEngine::new(Arc::new(store), EnrollmentEnvironment::production(), RetryPolicy::default());
/// ```
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Open a pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the database is unreachable.
    pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// Override the lock wait bound.
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Create or upgrade the `activities` and `enrollments` tables.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close every connection. Pending scopes roll back.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn open_scope(&self, id: ActivityId) -> Result<Option<Box<dyn SeatScope>>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(lock_timeout_setting(self.lock_timeout))
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activities a WHERE a.id = $1 FOR UPDATE");
        let Some(row) = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?
        else {
            return Ok(None);
        };
        let activity = rows::activity(&row)?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM enrollments WHERE activity_id = $1 AND is_active",
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        tracing::trace!(activity_id = %id, active, "Activity row locked");
        let scope: Box<dyn SeatScope> =
            Box::new(PgSeatScope::new(tx, activity, rows::count(active)?));
        Ok(Some(scope))
    }

    async fn insert(&self, activity: Activity) -> Result<(), StoreError> {
        let details = &activity.details;
        sqlx::query(
            r"
            INSERT INTO activities
                (id, title, description, day, starts_at, ends_at, photo_url, instructor, category, capacity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(activity.id.as_uuid())
        .bind(&details.title)
        .bind(&details.description)
        .bind(details.schedule.day.as_str())
        .bind(details.schedule.starts_at)
        .bind(details.schedule.ends_at)
        .bind(&details.photo_url)
        .bind(&details.instructor)
        .bind(&details.category)
        .bind(rows::capacity_column(activity.capacity)?)
        .bind(activity.created_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn list(&self, filter: ActivityFilter) -> Result<Vec<ActivityListing>, StoreError> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ACTIVITY_COLUMNS}, {ACTIVE_COUNT_COLUMN} FROM activities a WHERE TRUE"
        ));
        if let Some(id) = filter.id {
            query.push(" AND a.id = ").push_bind(*id.as_uuid());
        }
        if let Some(title) = &filter.title {
            query
                .push(" AND a.title ILIKE ")
                .push_bind(rows::contains_pattern(title));
        }
        if let Some(category) = &filter.category {
            query
                .push(" AND a.category ILIKE ")
                .push_bind(rows::contains_pattern(category));
        }
        if let Some(day) = filter.day {
            query.push(" AND a.day = ").push_bind(day.as_str());
        }
        if let Some(at) = filter.at {
            query
                .push(" AND a.starts_at <= ")
                .push_bind(at)
                .push(" AND a.ends_at >= ")
                .push_bind(at);
        }
        query.push(" ORDER BY a.created_at, a.id");

        let found = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        found.iter().map(rows::listing).collect()
    }

    async fn replace_details(
        &self,
        id: ActivityId,
        details: ActivityDetails,
    ) -> Result<Option<Activity>, StoreError> {
        let sql = format!(
            r"
            UPDATE activities a
            SET title = $2, description = $3, day = $4, starts_at = $5, ends_at = $6,
                photo_url = $7, instructor = $8, category = $9
            WHERE a.id = $1
            RETURNING {ACTIVITY_COLUMNS}
            "
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(&details.title)
            .bind(&details.description)
            .bind(details.schedule.day.as_str())
            .bind(details.schedule.starts_at)
            .bind(details.schedule.ends_at)
            .bind(&details.photo_url)
            .bind(&details.instructor)
            .bind(&details.category)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        row.as_ref().map(rows::activity).transpose()
    }

    async fn find(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<Option<Enrollment>, StoreError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = $1 AND activity_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(activity_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        row.as_ref().map(rows::enrollment).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Enrollment>, StoreError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = $1 \
             ORDER BY created_at, activity_id"
        );
        let found = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        found.iter().map(rows::enrollment).collect()
    }

    async fn active_count(&self, activity_id: ActivityId) -> Result<u32, StoreError> {
        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM enrollments WHERE activity_id = $1 AND is_active",
        )
        .bind(activity_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        rows::count(active)
    }
}

/// Value for the `lock_timeout` setting. Zero would mean "wait forever".
fn lock_timeout_setting(timeout: Duration) -> String {
    format!("{}ms", timeout.as_millis().max(1))
}

impl ActivityStore for PostgresStore {
    fn insert_activity(&self, activity: Activity) -> StoreFuture<'_, ()> {
        Box::pin(self.insert(activity))
    }

    fn get_activity(&self, id: ActivityId) -> StoreFuture<'_, Option<ActivityListing>> {
        Box::pin(async move {
            let mut found = self.list(ActivityFilter::all().with_id(id)).await?;
            Ok(found.pop())
        })
    }

    fn list_activities(&self, filter: ActivityFilter) -> StoreFuture<'_, Vec<ActivityListing>> {
        Box::pin(self.list(filter))
    }

    fn update_details(
        &self,
        id: ActivityId,
        details: ActivityDetails,
    ) -> StoreFuture<'_, Option<Activity>> {
        Box::pin(self.replace_details(id, details))
    }
}

impl EnrollmentStore for PostgresStore {
    fn find_enrollment(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> StoreFuture<'_, Option<Enrollment>> {
        Box::pin(self.find(user_id, activity_id))
    }

    fn list_enrollments(&self, user_id: UserId) -> StoreFuture<'_, Vec<Enrollment>> {
        Box::pin(self.list_for_user(user_id))
    }

    fn count_active(&self, activity_id: ActivityId) -> StoreFuture<'_, u32> {
        Box::pin(self.active_count(activity_id))
    }
}

impl SeatStore for PostgresStore {
    fn lock_activity(&self, id: ActivityId) -> StoreFuture<'_, Option<Box<dyn SeatScope>>> {
        Box::pin(self.open_scope(id))
    }
}
