//! Enrollment engine demo.
//!
//! Runs the two-seat walkthrough against the configured store: two users fill
//! a class, a third is turned away, one withdraws and the third gets the seat.

use anyhow::Context;
use enrollment_core::{ActivityDetails, EnrollmentError, NewActivity, Schedule, UserId};
use enrollment_app::{Config, Resources, init_tracing};
use enrollment_runtime::EnrollmentEnvironment;
use enrollment_runtime::metrics::MetricsServer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    init_tracing(&config.server.log_filter);
    info!(backend = %config.store.backend, "Starting enrollment demo");

    let mut metrics = config
        .metrics_addr()
        .context("invalid metrics address")?
        .map(MetricsServer::new);
    if let Some(server) = metrics.as_mut() {
        server.start().context("failed to start metrics server")?;
    }

    let resources = Resources::from_config(&config)
        .await
        .context("failed to open store")?;
    let engine = resources.engine(EnrollmentEnvironment::production());

    let class = engine
        .activities
        .create_activity(NewActivity {
            capacity: 2,
            details: ActivityDetails {
                title: "Intro to Pottery".to_string(),
                description: "Wheel throwing for beginners".to_string(),
                schedule: Schedule::parse("tuesday", "18:00", "20:00")?,
                photo_url: String::new(),
                instructor: "Robin".to_string(),
                category: "Arts".to_string(),
            },
        })
        .await?;
    info!(activity_id = %class.id, capacity = class.capacity, "Activity created");

    let (ana, ben, cat) = (UserId::new(), UserId::new(), UserId::new());
    engine.enrollments.enroll(ana, class.id).await?;
    engine.enrollments.enroll(ben, class.id).await?;

    match engine.enrollments.enroll(cat, class.id).await {
        Err(EnrollmentError::SeatsExhausted { capacity, .. }) => {
            info!(capacity, "Third user turned away, class is full");
        }
        other => warn!(?other, "Expected the class to be full"),
    }

    engine.enrollments.withdraw(ana, class.id).await?;
    engine.enrollments.enroll(cat, class.id).await?;

    let listing = engine.activities.get_activity(class.id).await?;
    info!(
        active = listing.active_enrollments,
        remaining = listing.remaining_seats(),
        "Walkthrough complete"
    );

    if let Some(rendered) = metrics.as_ref().and_then(MetricsServer::render) {
        info!(bytes = rendered.len(), "Metrics rendered");
    }

    resources.shutdown().await;
    Ok(())
}
