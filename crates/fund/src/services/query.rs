//! Read side: fund listings, the movement log and audit-trail checks.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use tonerdesk_core::FundItemId;

use crate::config::MAX_MOVEMENTS_LIMIT;
use crate::error::FundError;
use crate::models::{
    AuditReport, Counters, FundItem, FundItemFilter, FundItemView, ItemHistory, Movement,
    MovementFilter,
};
use crate::store::FundStore;

/// Read-only queries over a [`FundStore`]. Never takes locks.
#[derive(Debug)]
pub struct QueryService<S> {
    store: Arc<S>,
    movements_default_limit: u32,
}

impl<S: FundStore> QueryService<S> {
    /// Create a query service; `movements_default_limit` applies when a
    /// movement filter carries no limit.
    #[must_use]
    pub const fn new(store: Arc<S>, movements_default_limit: u32) -> Self {
        Self {
            store,
            movements_default_limit,
        }
    }

    /// Fetch one fund item.
    ///
    /// # Errors
    ///
    /// Returns `FundError::NotFound` if the item does not exist.
    pub async fn get_fund_item(&self, id: FundItemId) -> Result<FundItem, FundError> {
        self.store
            .fetch_item(id)
            .await?
            .ok_or(FundError::NotFound(id))
    }

    /// List fund items with catalog names and discrepancies, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `FundError::Storage` if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn get_fund_items(&self, filter: &FundItemFilter) -> Result<Vec<FundItemView>, FundError> {
        let items = self.store.list_items(filter).await?;
        debug!(count = items.len(), "Listed fund items");
        Ok(items)
    }

    /// Read the movement log, newest first.
    ///
    /// # Errors
    ///
    /// Returns `FundError::InvalidArgument` if the limit is outside
    /// `1..=1000`, or `FundError::Storage` if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn get_movements(&self, filter: &MovementFilter) -> Result<Vec<Movement>, FundError> {
        let limit = filter.limit.unwrap_or(self.movements_default_limit);
        if !(1..=MAX_MOVEMENTS_LIMIT).contains(&limit) {
            return Err(FundError::InvalidArgument(format!(
                "limit must be between 1 and {MAX_MOVEMENTS_LIMIT}, got {limit}"
            )));
        }
        let movements = self.store.list_movements(filter, limit).await?;
        debug!(count = movements.len(), limit, "Listed movements");
        Ok(movements)
    }

    /// Replay a fund item's history from `opening` and compare the result
    /// with the stored counters.
    ///
    /// The item and its movements are read from one snapshot, so postings
    /// that land during the check never show up as a mismatch.
    ///
    /// # Errors
    ///
    /// Returns `FundError::NotFound` if the item does not exist.
    #[instrument(skip(self, opening))]
    pub async fn verify_audit_trail(
        &self,
        fund_item_id: FundItemId,
        opening: Counters,
    ) -> Result<AuditReport, FundError> {
        let ItemHistory { item, movements } = self
            .store
            .item_history(fund_item_id)
            .await?
            .ok_or(FundError::NotFound(fund_item_id))?;

        let report = AuditReport {
            fund_item_id,
            movements: movements.len(),
            opening,
            replayed: opening.replay(&movements),
            recorded: item.counters(),
        };

        if report.is_consistent() {
            debug!(movements = report.movements, "Audit trail consistent");
        } else {
            warn!(
                movements = report.movements,
                replayed_available = report.replayed.available,
                replayed_reserved = report.replayed.reserved,
                recorded_available = report.recorded.available,
                recorded_reserved = report.recorded.reserved,
                "Audit trail does not reproduce stored counters"
            );
        }
        Ok(report)
    }
}
