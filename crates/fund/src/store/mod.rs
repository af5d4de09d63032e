//! Storage abstraction for fund items and their movement log.
//!
//! Services are generic over [`FundStore`]. Production uses
//! [`PgFundStore`](crate::db::PgFundStore); tests and embedded use
//! [`MemoryFundStore`].

pub mod memory;

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use tonerdesk_core::FundItemId;

pub use memory::MemoryFundStore;

use crate::db::RepositoryError;
use crate::error::FundError;
use crate::models::{
    FundItem, FundItemFilter, FundItemView, ItemHistory, Movement, MovementFilter, NewFundItem,
    OpeningStock, Posted, Posting,
};

/// Persistence of fund items and movements.
///
/// `post` is the only write path for counters: the store locks the item,
/// hands the locked state and the store clock to `decide`, and, when `decide`
/// returns a [`Posting`], writes the counters and appends the movement in one
/// transaction. Any error leaves the store unchanged.
pub trait FundStore: Send + Sync {
    /// Fetch a fund item by id without locking it.
    fn fetch_item(
        &self,
        id: FundItemId,
    ) -> impl Future<Output = Result<Option<FundItem>, RepositoryError>> + Send;

    /// Insert a fund item, with `opening` stock received in the same
    /// transaction, or with zero counters when `opening` is `None`.
    ///
    /// Returns [`RepositoryError::Conflict`] when the catalog entry already
    /// has a position in the same scope. On any error nothing is written.
    fn create_item(
        &self,
        new: NewFundItem,
        opening: Option<&OpeningStock>,
    ) -> impl Future<Output = Result<FundItem, RepositoryError>> + Send;

    /// Atomically lock, decide, update and log.
    ///
    /// With an `idempotency_key` that is already recorded on a movement of
    /// the same item, the earlier movement is returned with
    /// [`Posted::replayed`] set and `decide` is not called. A key recorded
    /// on another item is a [`FundError::Conflict`].
    fn post<D>(
        &self,
        fund_item_id: FundItemId,
        idempotency_key: Option<Uuid>,
        decide: &D,
    ) -> impl Future<Output = Result<Posted, FundError>> + Send
    where
        D: Fn(&FundItem, DateTime<Utc>) -> Result<Posting, FundError> + Sync;

    /// Items matching `filter`, with catalog names, ordered by id.
    fn list_items(
        &self,
        filter: &FundItemFilter,
    ) -> impl Future<Output = Result<Vec<FundItemView>, RepositoryError>> + Send;

    /// Movements matching `filter`, newest first, at most `limit`.
    fn list_movements(
        &self,
        filter: &MovementFilter,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Movement>, RepositoryError>> + Send;

    /// One item and every movement of it, oldest first, read from a single
    /// snapshot so the counters match the log. `None` if the item does not
    /// exist.
    fn item_history(
        &self,
        fund_item_id: FundItemId,
    ) -> impl Future<Output = Result<Option<ItemHistory>, RepositoryError>> + Send;
}
