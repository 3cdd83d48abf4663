//! `PostgreSQL` storage backend for the enrollment engine.
//!
//! [`PostgresStore`] implements the Activity Store, the Enrollment Store and
//! the seat scope over a sqlx `PgPool`:
//!
//! - A seat scope is a transaction that locks the activity row with
//!   `SELECT ... FOR UPDATE`, then counts active enrollments. Scopes for the
//!   same activity queue on that row lock; scopes for different activities
//!   never touch the same row.
//! - Lock waits are bounded by a transaction-local `lock_timeout`. Expiry
//!   (SQLSTATE `55P03`) surfaces as [`StoreError::Conflict`](enrollment_core::StoreError::Conflict)
//!   and is retried by the Seat Ledger.
//! - Reads run outside any transaction and never wait on a scope.
//!
//! # Example
//!
//! ```ignore
//! use enrollment_postgres::{PoolSettings, PostgresStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresStore::connect("postgres://localhost/enrollment", &PoolSettings::default()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod rows;
mod scope;
mod store;

pub use error::{CONFLICTS_TOTAL, is_transient_sqlstate};
pub use store::{DEFAULT_LOCK_TIMEOUT, PoolSettings, PostgresStore};
