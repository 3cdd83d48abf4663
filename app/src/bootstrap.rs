//! Store lifecycle: open the configured backend at startup, close it at shutdown.
//!
//! ```rust,ignore
//! let config = Config::from_env();
//! let resources = Resources::from_config(&config).await?;
//! let engine = resources.engine(EnrollmentEnvironment::production());
//! // ...
//! resources.shutdown().await;
//! ```

use crate::config::{Config, StoreBackend};
use enrollment_core::{StoreError, Storage};
use enrollment_postgres::PostgresStore;
use enrollment_runtime::{EnrollmentEngine, EnrollmentEnvironment};
use enrollment_testing::InMemoryStore;
use std::sync::Arc;
use tracing::info;

/// Infrastructure owned by the application.
#[derive(Clone)]
pub struct Resources {
    /// Application configuration
    pub config: Arc<Config>,
    /// The store handle every service shares
    pub store: Arc<dyn Storage>,
    /// Set when the backend is `PostgreSQL`, for shutdown
    postgres: Option<PostgresStore>,
}

impl Resources {
    /// Open the configured store.
    ///
    /// For `PostgreSQL` this connects the pool and, unless disabled, runs migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the database is unreachable or a
    /// migration fails.
    pub async fn from_config(config: &Config) -> Result<Self, StoreError> {
        let (store, postgres): (Arc<dyn Storage>, Option<PostgresStore>) =
            match config.store.backend {
                StoreBackend::Memory => {
                    info!("Using in-memory store");
                    (
                        Arc::new(InMemoryStore::with_lock_timeout(config.lock_timeout())),
                        None,
                    )
                }
                StoreBackend::Postgres => {
                    info!("Connecting to enrollment database...");
                    let pg = PostgresStore::connect(&config.postgres.url, &config.pool_settings())
                        .await?
                        .with_lock_timeout(config.lock_timeout());
                    info!("Enrollment database connected");

                    if config.postgres.run_migrations {
                        info!("Running migrations...");
                        pg.migrate().await?;
                        info!("Migrations complete");
                    }
                    (Arc::new(pg.clone()), Some(pg))
                }
            };

        Ok(Self {
            config: Arc::new(config.clone()),
            store,
            postgres,
        })
    }

    /// Wire the services over the store with the configured retry policy.
    #[must_use]
    pub fn engine(&self, env: EnrollmentEnvironment) -> EnrollmentEngine {
        EnrollmentEngine::new(Arc::clone(&self.store), env, self.config.retry_policy())
    }

    /// Release the store. Closes the `PostgreSQL` pool if there is one.
    pub async fn shutdown(self) {
        if let Some(pg) = self.postgres {
            info!("Closing database pool...");
            pg.close().await;
        }
        info!("Store shut down");
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("backend", &self.config.store.backend)
            .finish_non_exhaustive()
    }
}
