//! End-to-end enrollment scenarios over the in-memory store.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use enrollment_core::environment::Clock;
use enrollment_core::{
    ActivityFilter, ActivityId, ActivityStore, AllowAllUsers, EnrollmentError, EnrollmentEvent,
    EnrollmentStore, EventSink, SeatScope, SeatStore, Storage, UserDirectory, UserId, Weekday,
};
use enrollment_runtime::{EnrollmentEngine, EnrollmentEnvironment, RetryPolicy};
use enrollment_testing::{
    ContendedStore, FailingEventSink, InMemoryStore, RecordingEventSink, StalledEventSink,
    UnreachableDirectory, sample_new_activity, test_clock,
};
use std::sync::Arc;
use std::time::Duration;

fn fast_retries(max_retries: usize) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build()
}

fn engine(
    store: Arc<dyn Storage>,
    events: Arc<dyn EventSink>,
    users: Arc<dyn UserDirectory>,
    retry: RetryPolicy,
) -> EnrollmentEngine {
    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    EnrollmentEngine::new(store, EnrollmentEnvironment::new(clock, events, users), retry)
}

fn memory_engine() -> (EnrollmentEngine, Arc<InMemoryStore>, Arc<RecordingEventSink>) {
    let store = Arc::new(InMemoryStore::new());
    let events = Arc::new(RecordingEventSink::new());
    let engine = engine(
        store.clone(),
        events.clone(),
        Arc::new(AllowAllUsers),
        fast_retries(3),
    );
    (engine, store, events)
}

async fn create(engine: &EnrollmentEngine, capacity: u32) -> ActivityId {
    let mut new = sample_new_activity("Morning Yoga", Weekday::Monday, "08:00", "09:00");
    new.capacity = capacity;
    engine.activities.create_activity(new).await.unwrap().id
}

#[tokio::test]
async fn test_capacity_two_walkthrough() {
    let (engine, store, events) = memory_engine();
    let activity = create(&engine, 2).await;
    let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());

    engine.enrollments.enroll(a, activity).await.unwrap();
    engine.enrollments.enroll(b, activity).await.unwrap();
    assert_eq!(
        engine.enrollments.enroll(c, activity).await,
        Err(EnrollmentError::SeatsExhausted {
            activity_id: activity,
            capacity: 2
        })
    );

    engine.enrollments.withdraw(a, activity).await.unwrap();
    let c_enrollment = engine.enrollments.enroll(c, activity).await.unwrap();
    assert!(c_enrollment.is_active);

    assert!(!store.find_enrollment(a, activity).await.unwrap().unwrap().is_active);
    assert!(store.find_enrollment(b, activity).await.unwrap().unwrap().is_active);
    assert_eq!(store.count_active(activity).await.unwrap(), 2);
    assert_eq!(engine.activities.remaining_seats(activity).await.unwrap(), 0);

    let kinds: Vec<&str> = events.events().iter().map(EnrollmentEvent::event_type).collect();
    assert_eq!(
        kinds,
        [
            "ActivityCreated.v1",
            "Enrolled.v1",
            "Enrolled.v1",
            "Withdrawn.v1",
            "Enrolled.v1"
        ]
    );
}

#[tokio::test]
async fn test_duplicate_enroll_leaves_count_unchanged() {
    let (engine, store, _events) = memory_engine();
    let activity = create(&engine, 3).await;
    let user = UserId::new();

    engine.enrollments.enroll(user, activity).await.unwrap();
    assert_eq!(
        engine.enrollments.enroll(user, activity).await,
        Err(EnrollmentError::AlreadyEnrolled {
            user_id: user,
            activity_id: activity
        })
    );
    assert_eq!(store.count_active(activity).await.unwrap(), 1);
}

#[tokio::test]
async fn test_reactivation_consumes_a_seat() {
    let (engine, _store, events) = memory_engine();
    let activity = create(&engine, 1).await;
    let (a, b) = (UserId::new(), UserId::new());

    engine.enrollments.enroll(a, activity).await.unwrap();
    engine.enrollments.withdraw(a, activity).await.unwrap();
    engine.enrollments.enroll(b, activity).await.unwrap();

    assert!(matches!(
        engine.enrollments.enroll(a, activity).await,
        Err(EnrollmentError::SeatsExhausted { .. })
    ));

    engine.enrollments.withdraw(b, activity).await.unwrap();
    engine.enrollments.enroll(a, activity).await.unwrap();
    assert!(matches!(
        events.events().last(),
        Some(EnrollmentEvent::Enrolled {
            reactivated: true,
            ..
        })
    ));

    let records = engine.enrollments.list_enrollments(a).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_active);
}

#[tokio::test]
async fn test_capacity_floor() {
    let (engine, _store, _events) = memory_engine();
    let activity = create(&engine, 5).await;
    for _ in 0..3 {
        engine.enrollments.enroll(UserId::new(), activity).await.unwrap();
    }

    assert_eq!(
        engine.activities.update_capacity(activity, 2).await,
        Err(EnrollmentError::CapacityBelowActiveEnrollments {
            requested: 2,
            active: 3
        })
    );
    let listing = engine.activities.get_activity(activity).await.unwrap();
    assert_eq!(listing.activity.capacity, 5);

    let shrunk = engine.activities.update_capacity(activity, 3).await.unwrap();
    assert_eq!(shrunk.capacity, 3);
    assert!(matches!(
        engine.enrollments.enroll(UserId::new(), activity).await,
        Err(EnrollmentError::SeatsExhausted { capacity: 3, .. })
    ));

    assert!(matches!(
        engine.activities.update_capacity(activity, 0).await,
        Err(EnrollmentError::Validation(_))
    ));
}

#[tokio::test]
async fn test_cascade_delete() {
    let (engine, store, _events) = memory_engine();
    let activity = create(&engine, 5).await;
    let users: Vec<UserId> = (0..3).map(|_| UserId::new()).collect();
    for user in &users {
        engine.enrollments.enroll(*user, activity).await.unwrap();
    }

    engine.activities.delete_activity(activity).await.unwrap();

    assert_eq!(
        engine.activities.get_activity(activity).await,
        Err(EnrollmentError::ActivityNotFound(activity))
    );
    for user in &users {
        assert!(engine.enrollments.list_enrollments(*user).await.unwrap().is_empty());
    }
    assert_eq!(store.enrollment_count(), 0);
    assert_eq!(
        engine.enrollments.withdraw(users[0], activity).await,
        Err(EnrollmentError::ActivityNotFound(activity))
    );
    assert_eq!(
        engine.enrollments.enroll(users[0], activity).await,
        Err(EnrollmentError::ActivityNotFound(activity))
    );
    assert_eq!(
        engine.activities.delete_activity(activity).await,
        Err(EnrollmentError::ActivityNotFound(activity))
    );
}

#[tokio::test]
async fn test_conflicts_are_retried() {
    let inner = InMemoryStore::new();
    let new_activity = sample_new_activity("Climbing", Weekday::Thursday, "17:00", "19:00");
    let activity = enrollment_core::Activity::from_new(ActivityId::new(), new_activity, test_clock().now());
    let id = activity.id;
    inner.insert_activity(activity).await.unwrap();

    let store = Arc::new(ContendedStore::new(inner, 2));
    let engine = engine(
        store.clone(),
        Arc::new(RecordingEventSink::new()),
        Arc::new(AllowAllUsers),
        fast_retries(5),
    );

    engine.enrollments.enroll(UserId::new(), id).await.unwrap();
    assert_eq!(store.lock_attempts(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_report_temporary_failure() {
    let inner = InMemoryStore::new();
    let new_activity = sample_new_activity("Climbing", Weekday::Thursday, "17:00", "19:00");
    let activity = enrollment_core::Activity::from_new(ActivityId::new(), new_activity, test_clock().now());
    let id = activity.id;
    inner.insert_activity(activity).await.unwrap();

    let store = Arc::new(ContendedStore::new(inner, 100));
    let engine = engine(
        store.clone(),
        Arc::new(RecordingEventSink::new()),
        Arc::new(AllowAllUsers),
        fast_retries(2),
    );

    let result = engine.enrollments.enroll(UserId::new(), id).await;
    assert_eq!(result, Err(EnrollmentError::TemporaryFailure { attempts: 3 }));
    assert!(result.unwrap_err().is_retryable());
    assert_eq!(store.lock_attempts(), 3);
    assert_eq!(store.inner().count_active(id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_lock_wait_timeout_is_temporary_failure() {
    let store = Arc::new(InMemoryStore::with_lock_timeout(Duration::from_millis(20)));
    let engine = engine(
        store.clone(),
        Arc::new(RecordingEventSink::new()),
        Arc::new(AllowAllUsers),
        fast_retries(1),
    );
    let activity = create(&engine, 2).await;

    let held = store.lock_activity(activity).await.unwrap().unwrap();
    let result = engine.enrollments.enroll(UserId::new(), activity).await;
    assert_eq!(result, Err(EnrollmentError::TemporaryFailure { attempts: 2 }));

    drop(held);
    engine.enrollments.enroll(UserId::new(), activity).await.unwrap();
}

#[tokio::test]
async fn test_cancelled_enroll_leaves_no_trace() {
    let (engine, store, events) = memory_engine();
    let activity = create(&engine, 1).await;
    let user = UserId::new();

    let held = store.lock_activity(activity).await.unwrap().unwrap();
    let cancelled = tokio::time::timeout(
        Duration::from_millis(30),
        engine.enrollments.enroll(user, activity),
    )
    .await;
    assert!(cancelled.is_err());
    drop(held);

    assert!(store.find_enrollment(user, activity).await.unwrap().is_none());
    assert_eq!(store.count_active(activity).await.unwrap(), 0);
    assert_eq!(events.events().len(), 1); // ActivityCreated only

    engine.enrollments.enroll(user, activity).await.unwrap();
}

#[tokio::test]
async fn test_uncommitted_scope_is_rolled_back() {
    let (engine, store, _events) = memory_engine();
    let activity = create(&engine, 1).await;

    {
        let mut scope = store.lock_activity(activity).await.unwrap().unwrap();
        scope.set_capacity(50).await.unwrap();
        assert_eq!(scope.delete_activity().await.unwrap(), 0);
    }

    let listing = engine.activities.get_activity(activity).await.unwrap();
    assert_eq!(listing.activity.capacity, 1);
}

#[tokio::test]
async fn test_event_sink_failure_does_not_fail_operations() {
    let store = Arc::new(InMemoryStore::new());
    let engine = engine(
        store.clone(),
        Arc::new(FailingEventSink),
        Arc::new(AllowAllUsers),
        fast_retries(1),
    );
    let activity = create(&engine, 1).await;
    let user = UserId::new();

    engine.enrollments.enroll(user, activity).await.unwrap();
    engine.enrollments.withdraw(user, activity).await.unwrap();
    engine.activities.update_capacity(activity, 4).await.unwrap();
    engine.activities.delete_activity(activity).await.unwrap();
    assert_eq!(store.activity_count(), 0);
}

#[tokio::test]
async fn test_stalled_event_sink_does_not_hold_up_operations() {
    let store = Arc::new(InMemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    let environment = EnrollmentEnvironment::new(
        clock,
        Arc::new(StalledEventSink),
        Arc::new(AllowAllUsers),
    )
    .with_delivery_timeout(Duration::from_millis(50));
    let engine = EnrollmentEngine::new(store.clone(), environment, fast_retries(1));
    let user = UserId::new();

    let run = async {
        let activity = create(&engine, 1).await;
        engine.enrollments.enroll(user, activity).await.unwrap();
        activity
    };
    let activity = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("enroll should return despite the stalled sink");

    assert_eq!(store.count_active(activity).await.unwrap(), 1);
    assert!(store.lock_activity(activity).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unreachable_directory_blocks_enroll() {
    let store = Arc::new(InMemoryStore::new());
    let engine = engine(
        store.clone(),
        Arc::new(RecordingEventSink::new()),
        Arc::new(UnreachableDirectory),
        fast_retries(1),
    );
    let activity = create(&engine, 1).await;

    assert!(matches!(
        engine.enrollments.enroll(UserId::new(), activity).await,
        Err(EnrollmentError::Directory(_))
    ));
    assert_eq!(store.enrollment_count(), 0);
}

#[tokio::test]
async fn test_search_and_details() {
    let (engine, _store, _events) = memory_engine();
    let yoga = create(&engine, 2).await;
    engine
        .activities
        .create_activity(sample_new_activity("Judo", Weekday::Monday, "18:00", "19:30"))
        .await
        .unwrap();
    engine.enrollments.enroll(UserId::new(), yoga).await.unwrap();

    let running = engine
        .activities
        .search_activities(
            ActivityFilter::all().running_at(enrollment_core::NaiveTime::from_hms_opt(8, 30, 0).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].activity.id, yoga);
    assert_eq!(running[0].remaining_seats(), 1);

    let mut details = running[0].activity.details.clone();
    details.category = "Mindfulness".to_string();
    engine.activities.update_details(yoga, details).await.unwrap();

    let found = engine
        .activities
        .search_activities(ActivityFilter::all().with_category("mind"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].activity.capacity, 2);
    assert_eq!(found[0].active_enrollments, 1);
}
