//! Domain events and the fire-and-forget event sink.
//!
//! Events are emitted AFTER the storage change they describe has committed.
//! Delivery is best-effort: a failing sink is logged and counted by the caller,
//! never turned into an operation failure, and never rolls anything back.
//!
//! # Example
//!
//! ```
//! use enrollment_core::event::{EnrollmentEvent, EventSink, TracingEventSink};
//! use enrollment_core::types::{ActivityId, UserId};
//! use chrono::Utc;
//!
//! # async fn example() {
//! let sink = TracingEventSink;
//! let event = EnrollmentEvent::Withdrawn {
//!     user_id: UserId::new(),
//!     activity_id: ActivityId::new(),
//!     at: Utc::now(),
//! };
//! assert_eq!(event.event_type(), "Withdrawn.v1");
//! sink.publish(event).await.ok();
//! # }
//! ```

use crate::types::{ActivityId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Notifications about committed changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnrollmentEvent {
    /// A user took a seat.
    Enrolled {
        /// User.
        user_id: UserId,
        /// Activity.
        activity_id: ActivityId,
        /// Whether an inactive record was flipped back to active.
        reactivated: bool,
        /// Commit time.
        at: DateTime<Utc>,
    },

    /// A user gave a seat back.
    Withdrawn {
        /// User.
        user_id: UserId,
        /// Activity.
        activity_id: ActivityId,
        /// Commit time.
        at: DateTime<Utc>,
    },

    /// Capacity was edited.
    CapacityChanged {
        /// Activity.
        activity_id: ActivityId,
        /// Capacity before the change.
        previous: u32,
        /// Capacity after the change.
        current: u32,
        /// Commit time.
        at: DateTime<Utc>,
    },

    /// An activity was created.
    ActivityCreated {
        /// Activity.
        activity_id: ActivityId,
        /// Initial capacity.
        capacity: u32,
        /// Commit time.
        at: DateTime<Utc>,
    },

    /// An activity and all its enrollments were removed.
    ActivityDeleted {
        /// Activity.
        activity_id: ActivityId,
        /// Enrollment records removed with it.
        removed_enrollments: u32,
        /// Commit time.
        at: DateTime<Utc>,
    },
}

impl EnrollmentEvent {
    /// Stable, versioned event type identifier.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Enrolled { .. } => "Enrolled.v1",
            Self::Withdrawn { .. } => "Withdrawn.v1",
            Self::CapacityChanged { .. } => "CapacityChanged.v1",
            Self::ActivityCreated { .. } => "ActivityCreated.v1",
            Self::ActivityDeleted { .. } => "ActivityDeleted.v1",
        }
    }

    /// Activity the event is about.
    #[must_use]
    pub const fn activity_id(&self) -> ActivityId {
        match self {
            Self::Enrolled { activity_id, .. }
            | Self::Withdrawn { activity_id, .. }
            | Self::CapacityChanged { activity_id, .. }
            | Self::ActivityCreated { activity_id, .. }
            | Self::ActivityDeleted { activity_id, .. } => *activity_id,
        }
    }
}

/// Event delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Event could not be encoded.
    #[error("Failed to encode event: {0}")]
    Encoding(String),

    /// Downstream collaborator rejected or did not receive the event.
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Receiver of fire-and-forget notifications.
///
/// The engine calls `publish` after the storage change has committed and
/// waits a bounded time for it. A delivery that fails or outlasts that bound
/// is logged and counted, and the operation still succeeds.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when delivery fails. Callers log it and move on.
    fn publish(
        &self,
        event: EnrollmentEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;
}

/// Default sink: writes every event to the tracing log as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(
        &self,
        event: EnrollmentEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async move {
            let payload =
                serde_json::to_string(&event).map_err(|e| SinkError::Encoding(e.to_string()))?;
            tracing::info!(
                event_type = event.event_type(),
                activity_id = %event.activity_id(),
                payload = %payload,
                "Domain event"
            );
            Ok(())
        })
    }
}
