//! In-memory storage backend.
//!
//! Records live in plain maps behind a `std::sync::RwLock` that is only held
//! for the duration of a synchronous read or a commit, never across an await.
//! Seat scopes are serialized per activity by a `tokio::sync::Mutex` that is
//! held for the whole scope, so reads never wait on an open scope and scopes
//! for different activities never wait on each other.

use enrollment_core::{
    Activity, ActivityDetails, ActivityFilter, ActivityId, ActivityListing, ActivityStore,
    Enrollment, EnrollmentStore, SeatScope, SeatStore, StoreError, StoreFuture, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{Mutex as ScopeLock, OwnedMutexGuard};

/// How long `lock_activity` waits for a busy activity before reporting a conflict.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Tables {
    activities: HashMap<ActivityId, Activity>,
    enrollments: HashMap<(UserId, ActivityId), Enrollment>,
}

impl Tables {
    fn active_count(&self, activity_id: ActivityId) -> u32 {
        let count = self
            .enrollments
            .values()
            .filter(|e| e.activity_id == activity_id && e.is_active)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn listing(&self, activity: &Activity) -> ActivityListing {
        ActivityListing {
            activity: activity.clone(),
            active_enrollments: self.active_count(activity.id),
        }
    }
}

/// Thread-safe in-memory [`Storage`](enrollment_core::Storage).
///
/// Cloning shares the underlying data.
///
/// # Example
///
/// ```
/// use enrollment_testing::{InMemoryStore, activity_with_capacity};
/// use enrollment_core::{ActivityStore, SeatScope, SeatStore};
///
/// # async fn example() -> Result<(), enrollment_core::StoreError> {
/// let store = InMemoryStore::new();
/// let activity = activity_with_capacity(2);
/// store.insert_activity(activity.clone()).await?;
///
/// let scope = store.lock_activity(activity.id).await?;
/// assert_eq!(scope.map(|s| s.active_count()), Some(0));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    scope_locks: LockTable,
    lock_timeout: Duration,
}

type LockTable = Arc<Mutex<HashMap<ActivityId, Arc<ScopeLock<()>>>>>;

/// Claim on an activity's entry in the lock table.
///
/// Dropping it removes the entry once no other scope holds or awaits the
/// lock, so the table only tracks activities with scopes in flight.
#[derive(Debug)]
struct LockLease {
    locks: LockTable,
    id: ActivityId,
}

impl Drop for LockLease {
    fn drop(&mut self) {
        // Clones are handed out under this mutex, so a count of one means the
        // table holds the last reference.
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

impl InMemoryStore {
    /// Create an empty store with [`DEFAULT_LOCK_TIMEOUT`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create an empty store whose scope waits give up after `lock_timeout`.
    #[must_use]
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            scope_locks: Arc::new(Mutex::new(HashMap::new())),
            lock_timeout,
        }
    }

    /// Number of stored activities.
    #[must_use]
    pub fn activity_count(&self) -> usize {
        self.read().map(|t| t.activities.len()).unwrap_or_default()
    }

    /// Number of stored enrollment records, active or not.
    #[must_use]
    pub fn enrollment_count(&self) -> usize {
        self.read().map(|t| t.enrollments.len()).unwrap_or_default()
    }

    /// Number of activities with a seat scope open or waiting.
    #[must_use]
    pub fn scope_lock_count(&self) -> usize {
        self.scope_locks.lock().map(|l| l.len()).unwrap_or_default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("in-memory tables poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        write_tables(&self.tables)
    }

    fn scope_lock(&self, id: ActivityId) -> Result<Arc<ScopeLock<()>>, StoreError> {
        let mut locks = self
            .scope_locks
            .lock()
            .map_err(|_| StoreError::Backend("scope lock table poisoned".to_string()))?;
        Ok(Arc::clone(locks.entry(id).or_default()))
    }

    fn contains_activity(&self, id: ActivityId) -> Result<bool, StoreError> {
        Ok(self.read()?.activities.contains_key(&id))
    }

    fn snapshot(&self, id: ActivityId) -> Result<Option<(Activity, u32)>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .activities
            .get(&id)
            .map(|activity| (activity.clone(), tables.active_count(id))))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn write_tables(tables: &RwLock<Tables>) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
    tables
        .write()
        .map_err(|_| StoreError::Backend("in-memory tables poisoned".to_string()))
}

impl ActivityStore for InMemoryStore {
    fn insert_activity(&self, activity: Activity) -> StoreFuture<'_, ()> {
        let result = self.write().and_then(|mut tables| {
            if tables.activities.contains_key(&activity.id) {
                return Err(StoreError::Conflict(format!(
                    "activity {} already exists",
                    activity.id
                )));
            }
            tables.activities.insert(activity.id, activity);
            Ok(())
        });
        Box::pin(std::future::ready(result))
    }

    fn get_activity(&self, id: ActivityId) -> StoreFuture<'_, Option<ActivityListing>> {
        let result = self
            .read()
            .map(|tables| tables.activities.get(&id).map(|a| tables.listing(a)));
        Box::pin(std::future::ready(result))
    }

    fn list_activities(&self, filter: ActivityFilter) -> StoreFuture<'_, Vec<ActivityListing>> {
        let result = self.read().map(|tables| {
            tables
                .activities
                .values()
                .filter(|a| filter.matches(a))
                .map(|a| tables.listing(a))
                .collect()
        });
        Box::pin(std::future::ready(result))
    }

    fn update_details(
        &self,
        id: ActivityId,
        details: ActivityDetails,
    ) -> StoreFuture<'_, Option<Activity>> {
        let result = self.write().map(|mut tables| {
            tables.activities.get_mut(&id).map(|activity| {
                activity.details = details;
                activity.clone()
            })
        });
        Box::pin(std::future::ready(result))
    }
}

impl EnrollmentStore for InMemoryStore {
    fn find_enrollment(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> StoreFuture<'_, Option<Enrollment>> {
        let result = self
            .read()
            .map(|tables| tables.enrollments.get(&(user_id, activity_id)).cloned());
        Box::pin(std::future::ready(result))
    }

    fn list_enrollments(&self, user_id: UserId) -> StoreFuture<'_, Vec<Enrollment>> {
        let result = self.read().map(|tables| {
            let mut enrollments: Vec<Enrollment> = tables
                .enrollments
                .values()
                .filter(|e| e.user_id == user_id)
                .cloned()
                .collect();
            enrollments.sort_by_key(|e| (e.created_at, e.activity_id));
            enrollments
        });
        Box::pin(std::future::ready(result))
    }

    fn count_active(&self, activity_id: ActivityId) -> StoreFuture<'_, u32> {
        let result = self.read().map(|tables| tables.active_count(activity_id));
        Box::pin(std::future::ready(result))
    }
}

impl SeatStore for InMemoryStore {
    fn lock_activity(&self, id: ActivityId) -> StoreFuture<'_, Option<Box<dyn SeatScope>>> {
        Box::pin(async move {
            if !self.contains_activity(id)? {
                return Ok(None);
            }

            // Declared before the lock so it is dropped after it on every path.
            let lease = LockLease {
                locks: Arc::clone(&self.scope_locks),
                id,
            };
            let lock = self.scope_lock(id)?;
            let waited = tokio::time::timeout(self.lock_timeout, lock.lock_owned()).await;
            let guard = waited.map_err(|_| {
                tracing::debug!(activity_id = %id, "Seat scope wait timed out");
                StoreError::Conflict(format!("lock wait timed out for activity {id}"))
            })?;

            let Some((activity, active_count)) = self.snapshot(id)? else {
                return Ok(None);
            };

            Ok(Some(Box::new(MemoryScope {
                tables: Arc::clone(&self.tables),
                _guard: guard,
                _lease: lease,
                activity,
                active_count,
                staged: HashMap::new(),
                capacity_changed: false,
                deleted: false,
            }) as Box<dyn SeatScope>))
        })
    }
}

/// Open seat scope over an [`InMemoryStore`].
///
/// Writes are staged here and applied to the shared tables on commit.
/// Dropping the scope discards them and releases the activity lock.
struct MemoryScope {
    tables: Arc<RwLock<Tables>>,
    // Field order matters: the guard must release its lock before the lease prunes.
    _guard: OwnedMutexGuard<()>,
    _lease: LockLease,
    activity: Activity,
    active_count: u32,
    staged: HashMap<UserId, Enrollment>,
    capacity_changed: bool,
    deleted: bool,
}

impl MemoryScope {
    fn current(&self, user_id: UserId) -> Result<Option<Enrollment>, StoreError> {
        if self.deleted {
            return Ok(None);
        }
        if let Some(staged) = self.staged.get(&user_id) {
            return Ok(Some(staged.clone()));
        }
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Backend("in-memory tables poisoned".to_string()))?;
        Ok(tables
            .enrollments
            .get(&(user_id, self.activity.id))
            .cloned())
    }

    fn stage(&mut self, enrollment: Enrollment) -> Result<(), StoreError> {
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
            .current(enrollment.user_id)?
            .is_some_and(|e| e.is_active);
        match (was_active, enrollment.is_active) {
            (false, true) => self.active_count += 1,
            (true, false) => self.active_count = self.active_count.saturating_sub(1),
            _ => {}
        }
        self.staged.insert(enrollment.user_id, enrollment);
        Ok(())
    }

    fn stage_delete(&mut self) -> Result<u32, StoreError> {
        let id = self.activity.id;
        let stored = {
            let tables = self
                .tables
                .read()
                .map_err(|_| StoreError::Backend("in-memory tables poisoned".to_string()))?;
            tables
                .enrollments
                .keys()
                .filter(|(user_id, activity_id)| {
                    *activity_id == id && !self.staged.contains_key(user_id)
                })
                .count()
        };
        let removed = u32::try_from(stored + self.staged.len()).unwrap_or(u32::MAX);

        self.deleted = true;
        self.staged.clear();
        self.active_count = 0;
        Ok(removed)
    }

    fn apply(self) -> Result<(), StoreError> {
        let id = self.activity.id;
        let mut tables = write_tables(&self.tables)?;

        if self.deleted {
            tables.activities.remove(&id);
            tables.enrollments.retain(|(_, activity_id), _| *activity_id != id);
            return Ok(());
        }

        if self.capacity_changed {
            // Only capacity: descriptive edits may have landed while the scope was open.
            if let Some(stored) = tables.activities.get_mut(&id) {
                stored.capacity = self.activity.capacity;
            }
        }
        for (user_id, enrollment) in self.staged {
            tables.enrollments.insert((user_id, id), enrollment);
        }
        Ok(())
    }
}

impl SeatScope for MemoryScope {
    fn activity(&self) -> &Activity {
        &self.activity
    }

    fn active_count(&self) -> u32 {
        self.active_count
    }

    fn enrollment(&mut self, user_id: UserId) -> StoreFuture<'_, Option<Enrollment>> {
        Box::pin(std::future::ready(self.current(user_id)))
    }

    fn save_enrollment(&mut self, enrollment: Enrollment) -> StoreFuture<'_, ()> {
        Box::pin(std::future::ready(self.stage(enrollment)))
    }

    fn set_capacity(&mut self, capacity: u32) -> StoreFuture<'_, ()> {
        self.activity.capacity = capacity;
        self.capacity_changed = true;
        Box::pin(std::future::ready(Ok(())))
    }

    fn delete_activity(&mut self) -> StoreFuture<'_, u32> {
        Box::pin(std::future::ready(self.stage_delete()))
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(std::future::ready(self.apply()))
    }
}
