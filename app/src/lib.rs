//! # Enrollment App
//!
//! Application wiring for the enrollment engine: environment configuration,
//! store bootstrap and tracing setup. The `enrollment-demo` binary uses it to
//! run a short enrollment scenario against the configured backend.

pub mod bootstrap;
pub mod config;

pub use bootstrap::Resources;
pub use config::{Config, StoreBackend};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Calling this twice is a
/// no-op.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
