//! Injected collaborators for the enrollment services.

use crate::metrics::record_event_delivery_failure;
use enrollment_core::environment::{Clock, SystemClock};
use enrollment_core::{AllowAllUsers, EnrollmentEvent, EventSink, TracingEventSink, UserDirectory};
use std::sync::Arc;
use std::time::Duration;

/// How long [`EnrollmentEnvironment::notify`] waits on the event sink.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything the services depend on besides storage.
///
/// Production wiring uses [`EnrollmentEnvironment::production`]; tests swap in
/// a fixed clock, a recording sink and a scripted user directory.
#[derive(Clone)]
pub struct EnrollmentEnvironment {
    /// Time source for record timestamps and events
    pub clock: Arc<dyn Clock>,
    /// Receiver of post-commit notifications
    pub events: Arc<dyn EventSink>,
    /// Identity collaborator
    pub users: Arc<dyn UserDirectory>,
    /// Upper bound on a single event delivery
    pub delivery_timeout: Duration,
}

impl EnrollmentEnvironment {
    /// Creates a new `EnrollmentEnvironment`
    #[must_use]
    pub const fn new(
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            clock,
            events,
            users,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    /// Give up on event delivery after `timeout`.
    #[must_use]
    pub const fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// System clock, tracing event sink, every user known.
    #[must_use]
    pub fn production() -> Self {
        Self::new(
            Arc::new(SystemClock),
            Arc::new(TracingEventSink),
            Arc::new(AllowAllUsers),
        )
    }

    /// Publish an event after its change has committed.
    ///
    /// Waits at most `delivery_timeout`. Failures and timeouts are logged and
    /// counted. They never reach the caller.
    pub async fn notify(&self, event: EnrollmentEvent) {
        let event_type = event.event_type();
        let activity_id = event.activity_id();
        match tokio::time::timeout(self.delivery_timeout, self.events.publish(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!(
                    event_type,
                    activity_id = %activity_id,
                    error = %error,
                    "Event delivery failed"
                );
                record_event_delivery_failure(event_type);
            }
            Err(_) => {
                tracing::warn!(
                    event_type,
                    activity_id = %activity_id,
                    timeout_ms = u64::try_from(self.delivery_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Event delivery timed out"
                );
                record_event_delivery_failure(event_type);
            }
        }
    }
}

impl std::fmt::Debug for EnrollmentEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentEnvironment").finish_non_exhaustive()
    }
}
