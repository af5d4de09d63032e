//! Fund services shared across a process.

use std::sync::Arc;

use tonerdesk_core::UserId;

use crate::config::FundConfig;
use crate::db::{self, PgFundStore};
use crate::error::FundError;
use crate::models::{FundItem, NewFundItem, OpeningStock};
use crate::services::{ExecutionPolicy, InventoryReconciler, LedgerEngine, QueryService};
use crate::store::FundStore;

/// Ledger, reconciler and query service over one store.
///
/// Built once at process start and cloned into whatever needs it.
pub struct FundServices<S> {
    inner: Arc<FundServicesInner<S>>,
}

struct FundServicesInner<S> {
    store: Arc<S>,
    policy: ExecutionPolicy,
    ledger: LedgerEngine<S>,
    reconciler: InventoryReconciler<S>,
    query: QueryService<S>,
}

impl<S> Clone for FundServices<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: FundStore> FundServices<S> {
    /// Build services over `store`.
    #[must_use]
    pub fn new(store: S, policy: ExecutionPolicy, movements_default_limit: u32) -> Self {
        let store = Arc::new(store);
        Self {
            inner: Arc::new(FundServicesInner {
                ledger: LedgerEngine::new(Arc::clone(&store), policy),
                reconciler: InventoryReconciler::new(Arc::clone(&store), policy),
                query: QueryService::new(Arc::clone(&store), movements_default_limit),
                store,
                policy,
            }),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Issue, return, write-off and receive.
    #[must_use]
    pub fn ledger(&self) -> &LedgerEngine<S> {
        &self.inner.ledger
    }

    /// Physical counts.
    #[must_use]
    pub fn reconciler(&self) -> &InventoryReconciler<S> {
        &self.inner.reconciler
    }

    /// Listings and audit checks.
    #[must_use]
    pub fn query(&self) -> &QueryService<S> {
        &self.inner.query
    }

    /// Create a fund item and receive its opening stock.
    ///
    /// The item and its opening `RECEIVE` movement are written together, so
    /// the audit trail replays from zero and a failed attempt leaves nothing
    /// behind to conflict with a retry.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a negative opening quantity
    /// - `Conflict` if the catalog entry already has a position in this scope
    /// - `StorageContention` or `Timeout` if the store stays busy
    pub async fn provision(
        &self,
        new: NewFundItem,
        opening_quantity: i32,
        actor: UserId,
    ) -> Result<FundItem, FundError> {
        if opening_quantity < 0 {
            return Err(FundError::InvalidArgument(format!(
                "opening quantity must not be negative, got {opening_quantity}"
            )));
        }

        let opening = (opening_quantity > 0).then(|| OpeningStock {
            quantity: opening_quantity,
            actor,
            comment: Some("Opening stock".to_string()),
        });
        let item = self
            .inner
            .policy
            .create(self.store(), new, opening.as_ref())
            .await?;
        tracing::info!(
            fund_item_id = %item.id,
            catalog_ref = %item.catalog_ref,
            scope = %item.scope,
            opening_quantity,
            "Fund item provisioned"
        );
        Ok(item)
    }
}

impl FundServices<PgFundStore> {
    /// Connect to `PostgreSQL` and build services from `config`.
    ///
    /// Migrations are not run here; use the `migrate` CLI command.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if the pool cannot be created.
    pub async fn connect(config: &FundConfig) -> Result<Self, sqlx::Error> {
        let pool = db::create_pool(&config.database).await?;
        tracing::info!(
            max_connections = config.database.max_connections,
            "Database pool created"
        );
        Ok(Self::new(
            PgFundStore::new(pool, &config.database),
            ExecutionPolicy::from_config(config),
            config.movements_default_limit,
        ))
    }
}
