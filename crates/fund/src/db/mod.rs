//! Database access for the replacement fund (`PostgreSQL`).
//!
//! # Schema: `fund`
//!
//! ## Tables
//!
//! - `fund_item` - Stock positions with available/reserved/actual counters
//! - `movement` - Append-only audit log (one row per successful operation)
//!
//! Catalog names are joined from `catalog.cartridge_type` and
//! `catalog.printer_model`, which belong to the catalog import.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/fund/migrations/` and run via:
//! ```bash
//! cargo run -p tonerdesk-cli -- migrate
//! ```

pub mod fund;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use fund::PgFundStore;

use crate::config::DatabaseConfig;

/// SQLSTATE codes that signal lock or scheduling contention rather than a
/// broken request: `serialization_failure`, `deadlock_detected`,
/// `lock_not_available`.
const CONTENTION_SQLSTATES: &[&str] = &["40001", "40P01", "55P03"];

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// The store is locked or busy; the operation may succeed if retried.
    #[error("store busy: {0}")]
    Busy(String),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate fund item, reused idempotency key).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Whether retrying the same transaction may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        let classified = match &err {
            sqlx::Error::PoolTimedOut => {
                Some(Self::Busy("connection pool exhausted".to_string()))
            }
            sqlx::Error::Database(db_err)
                if db_err
                    .code()
                    .is_some_and(|code| CONTENTION_SQLSTATES.contains(&&*code)) =>
            {
                Some(Self::Busy(db_err.message().to_string()))
            }
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Some(Self::Conflict(db_err.message().to_string()))
            }
            _ => None,
        };
        classified.unwrap_or(Self::Database(err))
    }
}

/// Create a `PostgreSQL` connection pool from the database configuration.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(config.url.expose_secret())
        .await
}

/// Run the embedded fund migrations.
///
/// # Errors
///
/// Returns `sqlx::migrate::MigrateError` if a migration fails or the
/// applied history does not match the embedded files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Format a duration as a `PostgreSQL` interval setting (milliseconds).
fn as_pg_millis(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}
