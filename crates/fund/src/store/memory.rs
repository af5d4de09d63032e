//! In-process fund store.
//!
//! Runs the same lock-decide-write sequence as the `PostgreSQL` store, under a
//! mutex. Used by tests and by embedders that do not need persistence. Busy
//! errors and latency can be injected to exercise retry and timeout paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use tonerdesk_core::{CartridgeTypeId, CatalogRef, FundItemId, MovementId, PrinterModelId};

use super::FundStore;
use crate::db::RepositoryError;
use crate::error::FundError;
use crate::models::{
    FundItem, FundItemFilter, FundItemView, ItemHistory, Movement, MovementDraft, MovementFilter,
    NewFundItem, OpeningStock, Posted, Posting,
};

#[derive(Debug, Default)]
struct Inner {
    items: BTreeMap<FundItemId, FundItem>,
    movements: Vec<Movement>,
    next_item_id: i32,
    next_movement_id: i64,
    cartridge_names: HashMap<CartridgeTypeId, String>,
    printer_names: HashMap<PrinterModelId, String>,
    busy_writes: u32,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Inner {
    /// Store clock; never goes backwards.
    fn now(&mut self) -> DateTime<Utc> {
        let now = self
            .last_timestamp
            .map_or_else(Utc::now, |last| Utc::now().max(last));
        self.last_timestamp = Some(now);
        now
    }

    fn item_name(&self, catalog_ref: CatalogRef) -> Option<String> {
        match catalog_ref {
            CatalogRef::Cartridge(id) => self.cartridge_names.get(&id).cloned(),
            CatalogRef::Printer(id) => self.printer_names.get(&id).cloned(),
        }
    }

    /// Consume one injected busy error, if any are pending.
    fn take_busy(&mut self) -> Result<(), RepositoryError> {
        if self.busy_writes > 0 {
            self.busy_writes -= 1;
            return Err(RepositoryError::Busy("database is locked".to_string()));
        }
        Ok(())
    }

    fn append_movement(
        &mut self,
        fund_item_id: FundItemId,
        draft: MovementDraft,
        idempotency_key: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Movement {
        self.next_movement_id += 1;
        let movement = Movement {
            id: MovementId::new(self.next_movement_id),
            fund_item_id,
            movement_type: draft.movement_type,
            ticket_id: draft.ticket_id,
            quantity: draft.quantity,
            quantity_before: draft.quantity_before,
            quantity_after: draft.quantity_after,
            comment: draft.comment,
            user_id: draft.user_id,
            idempotency_key,
            created_at: now,
        };
        self.movements.push(movement.clone());
        movement
    }

    fn create_item(
        &mut self,
        new: NewFundItem,
        opening: Option<&OpeningStock>,
    ) -> Result<FundItem, RepositoryError> {
        self.take_busy()?;
        if self
            .items
            .values()
            .any(|item| item.catalog_ref == new.catalog_ref && item.scope == new.scope)
        {
            return Err(RepositoryError::Conflict(format!(
                "fund item for {} in {} already exists",
                new.catalog_ref, new.scope
            )));
        }
        let quantity_available = opening.map_or(0, |o| o.quantity);
        if quantity_available < 0 {
            return Err(RepositoryError::Conflict(
                "fund_item_available_non_negative".to_string(),
            ));
        }

        self.next_item_id += 1;
        let now = self.now();
        let item = FundItem {
            id: FundItemId::new(self.next_item_id),
            catalog_ref: new.catalog_ref,
            scope: new.scope,
            quantity_available,
            quantity_reserved: 0,
            quantity_actual: None,
            last_inventory_date: None,
            created_at: now,
            updated_at: now,
        };
        self.items.insert(item.id, item.clone());
        if let Some(opening) = opening {
            self.append_movement(item.id, opening.movement(), None, now);
        }
        Ok(item)
    }

    fn replay(&self, fund_item_id: FundItemId, key: Uuid) -> Result<Option<Posted>, FundError> {
        let Some(movement) = self
            .movements
            .iter()
            .find(|m| m.idempotency_key == Some(key))
        else {
            return Ok(None);
        };
        if movement.fund_item_id != fund_item_id {
            return Err(FundError::Conflict(format!(
                "idempotency key {key} was used for fund item {}",
                movement.fund_item_id
            )));
        }
        let item = self
            .items
            .get(&fund_item_id)
            .cloned()
            .ok_or(FundError::NotFound(fund_item_id))?;
        Ok(Some(Posted {
            item,
            movement: movement.clone(),
            replayed: true,
        }))
    }

    fn post<D>(
        &mut self,
        fund_item_id: FundItemId,
        idempotency_key: Option<Uuid>,
        decide: &D,
    ) -> Result<Posted, FundError>
    where
        D: Fn(&FundItem, DateTime<Utc>) -> Result<Posting, FundError>,
    {
        self.take_busy()?;

        if let Some(key) = idempotency_key
            && let Some(posted) = self.replay(fund_item_id, key)?
        {
            return Ok(posted);
        }

        let now = self.now();
        let current = self
            .items
            .get(&fund_item_id)
            .ok_or(FundError::NotFound(fund_item_id))?;
        let Posting { update, movement } = decide(current, now)?;

        if update.quantity_available < 0 {
            return Err(RepositoryError::Conflict(
                "fund_item_available_non_negative".to_string(),
            )
            .into());
        }
        if update.quantity_reserved < 0 {
            return Err(RepositoryError::Conflict(
                "fund_item_reserved_non_negative".to_string(),
            )
            .into());
        }

        let item = self
            .items
            .get_mut(&fund_item_id)
            .ok_or(FundError::NotFound(fund_item_id))?;
        item.quantity_available = update.quantity_available;
        item.quantity_reserved = update.quantity_reserved;
        item.quantity_actual = update.quantity_actual;
        item.last_inventory_date = update.last_inventory_date;
        item.updated_at = now;
        let item = item.clone();

        let movement = self.append_movement(fund_item_id, movement, idempotency_key, now);
        Ok(Posted {
            item,
            movement,
            replayed: false,
        })
    }
}

/// Fund store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryFundStore {
    inner: Mutex<Inner>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryFundStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the display name of a cartridge type.
    pub fn register_cartridge_type(&self, id: CartridgeTypeId, name: impl Into<String>) {
        self.lock().cartridge_names.insert(id, name.into());
    }

    /// Register the display name of a printer model.
    pub fn register_printer_model(&self, id: PrinterModelId, model: impl Into<String>) {
        self.lock().printer_names.insert(id, model.into());
    }

    /// Make the next `count` writes (postings or item creations) fail with
    /// [`RepositoryError::Busy`] before touching any state.
    pub fn inject_busy(&self, count: u32) {
        self.lock().busy_writes = count;
    }

    /// Delay every posting by `latency` before it takes the lock.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Number of movements recorded so far.
    #[must_use]
    pub fn movement_count(&self) -> usize {
        self.lock().movements.len()
    }
}

impl FundStore for MemoryFundStore {
    async fn fetch_item(&self, id: FundItemId) -> Result<Option<FundItem>, RepositoryError> {
        Ok(self.lock().items.get(&id).cloned())
    }

    async fn create_item(
        &self,
        new: NewFundItem,
        opening: Option<&OpeningStock>,
    ) -> Result<FundItem, RepositoryError> {
        self.lock().create_item(new, opening)
    }

    async fn post<D>(
        &self,
        fund_item_id: FundItemId,
        idempotency_key: Option<Uuid>,
        decide: &D,
    ) -> Result<Posted, FundError>
    where
        D: Fn(&FundItem, DateTime<Utc>) -> Result<Posting, FundError> + Sync,
    {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.lock().post(fund_item_id, idempotency_key, decide)
    }

    async fn list_items(&self, filter: &FundItemFilter) -> Result<Vec<FundItemView>, RepositoryError> {
        let inner = self.lock();
        Ok(inner
            .items
            .values()
            .filter(|item| filter.matches(item))
            .map(|item| FundItemView::new(item.clone(), inner.item_name(item.catalog_ref)))
            .collect())
    }

    async fn list_movements(
        &self,
        filter: &MovementFilter,
        limit: u32,
    ) -> Result<Vec<Movement>, RepositoryError> {
        let inner = self.lock();
        let mut movements: Vec<Movement> = inner
            .movements
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        movements.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        movements.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(movements)
    }

    async fn item_history(&self, fund_item_id: FundItemId) -> Result<Option<ItemHistory>, RepositoryError> {
        let inner = self.lock();
        let Some(item) = inner.items.get(&fund_item_id).cloned() else {
            return Ok(None);
        };
        let mut movements: Vec<Movement> = inner
            .movements
            .iter()
            .filter(|m| m.fund_item_id == fund_item_id)
            .cloned()
            .collect();
        movements.sort_by_key(|m| (m.created_at, m.id));
        Ok(Some(ItemHistory { item, movements }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tonerdesk_core::{CompanyId, FundScope, MovementType, UserId};

    use super::*;
    use crate::models::ItemUpdate;

    fn receive(quantity: i32) -> impl Fn(&FundItem, DateTime<Utc>) -> Result<Posting, FundError> {
        move |item, _now| {
            Ok(Posting {
                update: ItemUpdate {
                    quantity_available: item.quantity_available + quantity,
                    ..ItemUpdate::unchanged(item)
                },
                movement: MovementDraft {
                    movement_type: MovementType::Receive,
                    ticket_id: None,
                    quantity,
                    quantity_before: None,
                    quantity_after: None,
                    comment: None,
                    user_id: UserId::new(1),
                },
            })
        }
    }

    fn cartridge(id: i32) -> NewFundItem {
        NewFundItem {
            catalog_ref: CatalogRef::Cartridge(CartridgeTypeId::new(id)),
            scope: FundScope::Global,
        }
    }

    #[tokio::test]
    async fn test_create_item_rejects_duplicate_scope() {
        let store = MemoryFundStore::new();
        store.create_item(cartridge(1), None).await.unwrap();

        let err = store.create_item(cartridge(1), None).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let private = NewFundItem {
            scope: FundScope::Company(CompanyId::new(4)),
            ..cartridge(1)
        };
        assert!(store.create_item(private, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_post_updates_item_and_appends_movement() {
        let store = MemoryFundStore::new();
        let item = store.create_item(cartridge(1), None).await.unwrap();

        let posted = store.post(item.id, None, &receive(5)).await.unwrap();
        assert_eq!(posted.item.quantity_available, 5);
        assert_eq!(posted.movement.fund_item_id, item.id);
        assert!(!posted.replayed);
        assert_eq!(store.movement_count(), 1);
    }

    #[tokio::test]
    async fn test_post_unknown_item() {
        let store = MemoryFundStore::new();
        let err = store
            .post(FundItemId::new(99), None, &receive(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FundError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_idempotency_key_replays() {
        let store = MemoryFundStore::new();
        let item = store.create_item(cartridge(1), None).await.unwrap();
        let key = Uuid::new_v4();

        let first = store.post(item.id, Some(key), &receive(5)).await.unwrap();
        let second = store.post(item.id, Some(key), &receive(5)).await.unwrap();
        assert!(second.replayed);
        assert_eq!(second.movement, first.movement);
        assert_eq!(second.item.quantity_available, 5);
        assert_eq!(store.movement_count(), 1);

        let other = store.create_item(cartridge(2), None).await.unwrap();
        let err = store.post(other.id, Some(key), &receive(5)).await.unwrap_err();
        assert!(matches!(err, FundError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_injected_busy_leaves_state_untouched() {
        let store = MemoryFundStore::new();
        let item = store.create_item(cartridge(1), None).await.unwrap();
        store.inject_busy(1);

        let err = store.post(item.id, None, &receive(5)).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.movement_count(), 0);

        assert!(store.post(item.id, None, &receive(5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_items_resolves_names() {
        let store = MemoryFundStore::new();
        store.register_cartridge_type(CartridgeTypeId::new(1), "HP 85A");
        store.create_item(cartridge(1), None).await.unwrap();
        store.create_item(cartridge(2), None).await.unwrap();

        let views = store.list_items(&FundItemFilter::default()).await.unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].item_name.as_deref(), Some("HP 85A"));
        assert_eq!(views[1].item_name, None);
    }

    #[tokio::test]
    async fn test_movement_ordering() {
        let store = MemoryFundStore::new();
        let item = store.create_item(cartridge(1), None).await.unwrap();
        for q in 1..=3 {
            store.post(item.id, None, &receive(q)).await.unwrap();
        }

        let newest = store
            .list_movements(&MovementFilter::default(), 2)
            .await
            .unwrap();
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].quantity, 3);
        assert_eq!(newest[1].quantity, 2);

        let history = store.item_history(item.id).await.unwrap().unwrap();
        let quantities: Vec<i32> = history.movements.iter().map(|m| m.quantity).collect();
        assert_eq!(quantities, [1, 2, 3]);
        assert_eq!(history.item.quantity_available, 6);
        assert!(store.item_history(FundItemId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_item_with_opening_stock() {
        let store = MemoryFundStore::new();
        let opening = OpeningStock {
            quantity: 10,
            actor: UserId::new(7),
            comment: Some("Opening stock".to_string()),
        };

        let item = store.create_item(cartridge(1), Some(&opening)).await.unwrap();
        assert_eq!(item.quantity_available, 10);

        let history = store.item_history(item.id).await.unwrap().unwrap();
        assert_eq!(history.movements.len(), 1);
        assert_eq!(history.movements[0].movement_type, MovementType::Receive);
        assert_eq!(history.movements[0].quantity, 10);
        assert_eq!(history.movements[0].user_id, UserId::new(7));
    }

    #[tokio::test]
    async fn test_busy_create_writes_nothing() {
        let store = MemoryFundStore::new();
        let opening = OpeningStock {
            quantity: 10,
            actor: UserId::new(7),
            comment: None,
        };
        store.inject_busy(1);

        let err = store.create_item(cartridge(1), Some(&opening)).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.list_items(&FundItemFilter::default()).await.unwrap().is_empty());
        assert_eq!(store.movement_count(), 0);

        let item = store.create_item(cartridge(1), Some(&opening)).await.unwrap();
        assert_eq!(item.quantity_available, 10);
    }
}
