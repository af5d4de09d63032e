//! Integration tests for the Tonerdesk replacement fund.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory store tests
//! cargo test -p tonerdesk-integration-tests
//!
//! # PostgreSQL tests (migrations are applied automatically)
//! FUND_TEST_DATABASE_URL=postgres://localhost/tonerdesk_test \
//!     cargo test -p tonerdesk-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `fund_ledger` - Operation semantics, audit trail and reconciliation
//! - `fund_concurrency` - Concurrent postings, retry and timeouts
//! - `fund_postgres` - The same guarantees against a real database
//!
//! The in-memory store serialises every write behind one mutex, so the
//! concurrency tests in `fund_concurrency` cannot observe a lost row lock.
//! The `FOR UPDATE` path in the `PostgreSQL` store is checked only by
//! `fund_postgres::test_pg_concurrent_issues_admit_one`, which needs
//! `--ignored` and `FUND_TEST_DATABASE_URL`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::time::Duration;

use tonerdesk_core::{CartridgeTypeId, CatalogRef, FundScope, UserId};
use tonerdesk_fund::models::{FundItem, NewFundItem};
use tonerdesk_fund::retry::RetryPolicy;
use tonerdesk_fund::services::ExecutionPolicy;
use tonerdesk_fund::{FundConfig, FundServices, FundStore, MemoryFundStore, db};

/// Actor used by the tests.
pub const OPERATOR: UserId = UserId::new(7);

/// Execution policy with millisecond backoff so retry tests stay fast.
#[must_use]
pub const fn fast_policy(max_attempts: u32, attempt_timeout: Duration) -> ExecutionPolicy {
    ExecutionPolicy {
        retry: RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        },
        attempt_timeout,
    }
}

/// Fund services over a fresh in-memory store.
#[must_use]
pub fn memory_fund() -> FundServices<MemoryFundStore> {
    FundServices::new(
        MemoryFundStore::new(),
        fast_policy(3, Duration::from_secs(5)),
        100,
    )
}

/// Provision a global cartridge position with `available` opening stock.
///
/// # Panics
///
/// Panics if provisioning fails.
pub async fn provision_cartridge<S: FundStore>(
    fund: &FundServices<S>,
    cartridge: CartridgeTypeId,
    available: i32,
) -> FundItem {
    fund.provision(
        NewFundItem {
            catalog_ref: CatalogRef::Cartridge(cartridge),
            scope: FundScope::Global,
        },
        available,
        OPERATOR,
    )
    .await
    .expect("Failed to provision fund item")
}

/// Fund services over the database named by `FUND_TEST_DATABASE_URL`, with
/// migrations applied.
///
/// # Panics
///
/// Panics if the variable is unset or the database is unreachable.
pub async fn postgres_fund() -> FundServices<db::PgFundStore> {
    let url = std::env::var("FUND_TEST_DATABASE_URL")
        .expect("FUND_TEST_DATABASE_URL must be set for PostgreSQL tests");
    let config = FundConfig::from_source(|key| match key {
        "FUND_DATABASE_URL" => Some(url.clone()),
        "FUND_RETRY_BACKOFF_MS" => Some("10".to_string()),
        "FUND_LOCK_TIMEOUT_MS" => Some("2000".to_string()),
        _ => None,
    })
    .expect("Invalid test configuration");

    let fund = FundServices::connect(&config)
        .await
        .expect("Failed to connect to test database");
    db::migrate(fund.store().pool())
        .await
        .expect("Failed to run migrations");
    fund
}

/// Insert a catalog cartridge type with a unique name and return its id.
///
/// # Panics
///
/// Panics if the insert fails.
pub async fn insert_cartridge_type(fund: &FundServices<db::PgFundStore>) -> CartridgeTypeId {
    let name = format!("Test cartridge {}", uuid::Uuid::new_v4());
    let id: i32 = sqlx::query_scalar("INSERT INTO catalog.cartridge_type (name) VALUES ($1) RETURNING id")
        .bind(&name)
        .fetch_one(fund.store().pool())
        .await
        .expect("Failed to insert cartridge type");
    CartridgeTypeId::new(id)
}
