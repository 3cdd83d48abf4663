//! Row decoding and column lists shared by the queries.

use chrono::{DateTime, NaiveTime, Utc};
use enrollment_core::{
    Activity, ActivityDetails, ActivityId, ActivityListing, Enrollment, Schedule, StoreError,
    UserId, Weekday,
};
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::error::classify;

/// Activity columns, aliased on `a`.
pub(crate) const ACTIVITY_COLUMNS: &str = "a.id, a.title, a.description, a.day, a.starts_at, \
     a.ends_at, a.photo_url, a.instructor, a.category, a.capacity, a.created_at";

/// Best-effort active count of the activity aliased `a`.
pub(crate) const ACTIVE_COUNT_COLUMN: &str = "(SELECT COUNT(*) FROM enrollments e \
     WHERE e.activity_id = a.id AND e.is_active) AS active_enrollments";

/// Enrollment columns.
pub(crate) const ENROLLMENT_COLUMNS: &str =
    "user_id, activity_id, is_active, created_at, last_transition_at";

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(classify)
}

pub(crate) fn activity(row: &PgRow) -> Result<Activity, StoreError> {
    let id: Uuid = get(row, "id")?;
    let day: String = get(row, "day")?;
    let day: Weekday = day
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("activity {id}: {e}")))?;
    let starts_at: NaiveTime = get(row, "starts_at")?;
    let ends_at: NaiveTime = get(row, "ends_at")?;
    let capacity: i32 = get(row, "capacity")?;
    let capacity = u32::try_from(capacity)
        .map_err(|_| StoreError::Corrupt(format!("activity {id}: negative capacity {capacity}")))?;

    Ok(Activity {
        id: ActivityId::from_uuid(id),
        capacity,
        details: ActivityDetails {
            title: get(row, "title")?,
            description: get(row, "description")?,
            schedule: Schedule {
                day,
                starts_at,
                ends_at,
            },
            photo_url: get(row, "photo_url")?,
            instructor: get(row, "instructor")?,
            category: get(row, "category")?,
        },
        created_at: get(row, "created_at")?,
    })
}

pub(crate) fn listing(row: &PgRow) -> Result<ActivityListing, StoreError> {
    let active: i64 = get(row, "active_enrollments")?;
    Ok(ActivityListing {
        activity: activity(row)?,
        active_enrollments: count(active)?,
    })
}

pub(crate) fn enrollment(row: &PgRow) -> Result<Enrollment, StoreError> {
    let user_id: Uuid = get(row, "user_id")?;
    let activity_id: Uuid = get(row, "activity_id")?;
    let created_at: DateTime<Utc> = get(row, "created_at")?;
    let last_transition_at: DateTime<Utc> = get(row, "last_transition_at")?;
    Ok(Enrollment {
        user_id: UserId::from_uuid(user_id),
        activity_id: ActivityId::from_uuid(activity_id),
        is_active: get(row, "is_active")?,
        created_at,
        last_transition_at,
    })
}

/// Convert a `COUNT(*)` or `rows_affected` value.
pub(crate) fn count<N>(value: N) -> Result<u32, StoreError>
where
    N: Copy + std::fmt::Display,
    u32: TryFrom<N>,
{
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("count {value} out of range")))
}

/// Capacity as stored in the `INTEGER` column.
pub(crate) fn capacity_column(capacity: u32) -> Result<i32, StoreError> {
    i32::try_from(capacity)
        .map_err(|_| StoreError::Backend(format!("capacity {capacity} exceeds the column range")))
}

/// `ILIKE` pattern matching `needle` anywhere, with wildcards escaped.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
