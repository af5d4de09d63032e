//! Business logic services for the replacement fund.
//!
//! # Services
//!
//! - `ledger` - Issue, return, write-off and receive
//! - `inventory` - Physical counts and book corrections
//! - `query` - Listings, movement log and audit-trail verification

pub mod inventory;
pub mod ledger;
pub mod query;

use std::time::Duration;

use uuid::Uuid;

use tonerdesk_core::FundItemId;

pub use inventory::{InventoryCount, InventoryReconciler, plan_inventory};
pub use ledger::{LedgerEngine, OperationRequest, plan_operation};
pub use query::QueryService;

use crate::config::FundConfig;
use crate::error::FundError;
use crate::db::RepositoryError;
use crate::models::{FundItem, NewFundItem, OpeningStock, Posted, Posting};
use crate::retry::RetryPolicy;
use crate::store::FundStore;

/// Retry and timeout limits applied to every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Retry on a busy store.
    pub retry: RetryPolicy,
    /// Limit for one attempt, lock wait included.
    pub attempt_timeout: Duration,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl ExecutionPolicy {
    /// Policy from the loaded configuration.
    #[must_use]
    pub const fn from_config(config: &FundConfig) -> Self {
        Self {
            retry: config.retry,
            attempt_timeout: config.operation_timeout,
        }
    }

    /// Post through `store` with retry on busy and a timeout per attempt.
    ///
    /// A timed-out attempt is dropped, which rolls its transaction back.
    pub(crate) async fn post<S, D>(
        &self,
        store: &S,
        operation: &str,
        fund_item_id: FundItemId,
        idempotency_key: Option<Uuid>,
        decide: &D,
    ) -> Result<Posted, FundError>
    where
        S: FundStore,
        D: Fn(&FundItem, chrono::DateTime<chrono::Utc>) -> Result<Posting, FundError> + Sync,
    {
        let timeout = self.attempt_timeout;
        self.retry
            .run(operation, move || async move {
                tokio::time::timeout(timeout, store.post(fund_item_id, idempotency_key, decide))
                    .await
                    .map_err(|_| FundError::Timeout(timeout))?
            })
            .await
    }

    /// Create a fund item, with its opening stock, under the same retry and
    /// timeout rules as a posting.
    pub(crate) async fn create<S: FundStore>(
        &self,
        store: &S,
        new: NewFundItem,
        opening: Option<&OpeningStock>,
    ) -> Result<FundItem, FundError> {
        let timeout = self.attempt_timeout;
        self.retry
            .run("provision", move || async move {
                tokio::time::timeout(timeout, store.create_item(new, opening))
                    .await
                    .map_err(|_| FundError::Timeout(timeout))?
                    .map_err(|err| match err {
                        RepositoryError::Conflict(msg) => FundError::Conflict(msg),
                        other => FundError::Storage(other),
                    })
            })
            .await
    }
}
