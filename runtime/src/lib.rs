//! # Enrollment Runtime
//!
//! Runtime for the capacity-constrained enrollment engine.
//!
//! This crate holds the Seat Ledger and the two services built on it. All I/O
//! goes through the store handle and the collaborators in
//! [`EnrollmentEnvironment`]; both are chosen by the caller at startup.
//!
//! ## Core Components
//!
//! - **Seat Ledger**: the only writer of seat-affecting state; serializes
//!   admissions, withdrawals, capacity edits and deletes per activity
//! - **Enrollment Service**: enroll, withdraw, list a user's enrollments
//! - **Activity Service**: create, read, search, edit and delete activities
//! - **Retry**: bounded exponential backoff for storage conflicts
//! - **Metrics**: Prometheus counters and histograms
//!
//! ## Example
//!
//! ```ignore
//! use enrollment_runtime::{EnrollmentEngine, EnrollmentEnvironment, RetryPolicy};
//!
//! let engine = EnrollmentEngine::new(
//!     store,
//!     EnrollmentEnvironment::production(),
//!     RetryPolicy::default(),
//! );
//!
//! let yoga = engine.activities.create_activity(new_activity).await?;
//! engine.enrollments.enroll(user_id, yoga.id).await?;
//! ```

use enrollment_core::Storage;
use std::sync::Arc;

/// Activity lifecycle, search and capacity edits
pub mod activities;

/// Enroll, withdraw and list enrollments
pub mod enrollments;

/// Injected collaborators
pub mod environment;

/// Per-activity serialized capacity decisions
pub mod ledger;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

pub use activities::ActivityService;
pub use enrollments::EnrollmentService;
pub use environment::{DEFAULT_DELIVERY_TIMEOUT, EnrollmentEnvironment};
pub use ledger::{Admission, Resize, SeatLedger};
pub use retry::RetryPolicy;

/// Both services wired over one ledger.
#[derive(Clone, Debug)]
pub struct EnrollmentEngine {
    /// Enrollment operations
    pub enrollments: EnrollmentService,
    /// Activity operations
    pub activities: ActivityService,
    ledger: SeatLedger,
}

impl EnrollmentEngine {
    /// Wire the services over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Storage>, env: EnrollmentEnvironment, retry: RetryPolicy) -> Self {
        let ledger = SeatLedger::new(store, Arc::clone(&env.clock), retry);
        Self {
            enrollments: EnrollmentService::new(ledger.clone(), env.clone()),
            activities: ActivityService::new(ledger.clone(), env),
            ledger,
        }
    }

    /// The shared Seat Ledger.
    #[must_use]
    pub const fn ledger(&self) -> &SeatLedger {
        &self.ledger
    }
}
