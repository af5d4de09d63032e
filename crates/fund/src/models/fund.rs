//! Replacement-fund domain models: stock positions, movements and postings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tonerdesk_core::{
    CatalogRef, CompanyId, FundItemId, FundScope, ItemType, MovementId, MovementType, TicketId,
    UserId,
};

/// A stock position in the replacement fund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundItem {
    /// Unique fund item ID.
    pub id: FundItemId,
    /// Catalog entry this position stocks.
    pub catalog_ref: CatalogRef,
    /// Global fund or a company's private fund.
    pub scope: FundScope,
    /// Stock on hand, not committed to any ticket.
    pub quantity_available: i32,
    /// Stock issued out and not yet returned or written off.
    pub quantity_reserved: i32,
    /// Last physically counted quantity, if ever counted.
    pub quantity_actual: Option<i32>,
    /// When the last physical count was recorded.
    pub last_inventory_date: Option<DateTime<Utc>>,
    /// When the position was provisioned.
    pub created_at: DateTime<Utc>,
    /// When the counters last changed.
    pub updated_at: DateTime<Utc>,
}

impl FundItem {
    /// The item type implied by the catalog reference.
    #[must_use]
    pub const fn item_type(&self) -> ItemType {
        self.catalog_ref.item_type()
    }

    /// Current book counters.
    #[must_use]
    pub const fn counters(&self) -> Counters {
        Counters {
            available: self.quantity_available,
            reserved: self.quantity_reserved,
        }
    }

    /// Physical count minus book quantity; `None` when never counted.
    #[must_use]
    pub fn discrepancy(&self) -> Option<i32> {
        self.quantity_actual
            .map(|actual| actual - self.quantity_available)
    }

    /// True when a physical count exists and disagrees with the book quantity.
    #[must_use]
    pub fn has_discrepancy(&self) -> bool {
        self.discrepancy().is_some_and(|d| d != 0)
    }
}

/// A fund item prepared for display, with its catalog name resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundItemView {
    /// The item itself.
    #[serde(flatten)]
    pub item: FundItem,
    /// Cartridge type name or printer model; `None` if the catalog row is gone.
    pub item_name: Option<String>,
    /// Physical count minus book quantity; `None` when never counted.
    pub discrepancy: Option<i32>,
}

impl FundItemView {
    /// Build a view, deriving the discrepancy from the item.
    #[must_use]
    pub fn new(item: FundItem, item_name: Option<String>) -> Self {
        let discrepancy = item.discrepancy();
        Self {
            item,
            item_name,
            discrepancy,
        }
    }
}

/// An immutable audit record of one change to a fund item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Unique movement ID.
    pub id: MovementId,
    /// Fund item the movement belongs to.
    pub fund_item_id: FundItemId,
    /// What happened.
    pub movement_type: MovementType,
    /// Ticket that motivated the movement, if any.
    pub ticket_id: Option<TicketId>,
    /// Delta magnitude, or the counted quantity for `INVENTORY`.
    pub quantity: i32,
    /// Book quantity before a physical count (`INVENTORY` only).
    pub quantity_before: Option<i32>,
    /// Book quantity after a physical count (`INVENTORY` only).
    pub quantity_after: Option<i32>,
    /// Free-text comment.
    pub comment: Option<String>,
    /// Actor who performed the operation.
    pub user_id: UserId,
    /// Caller-supplied key that makes the operation safe to retry.
    pub idempotency_key: Option<Uuid>,
    /// When the movement was committed.
    pub created_at: DateTime<Utc>,
}

/// Available and reserved book counters of a fund item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counters {
    /// Stock on hand.
    pub available: i32,
    /// Stock issued out.
    pub reserved: i32,
}

impl Counters {
    /// Counters after `movement`, as a replay of the audit log would see them.
    #[must_use]
    pub const fn apply(self, movement: &Movement) -> Self {
        let q = movement.quantity;
        match movement.movement_type {
            MovementType::Issue => Self {
                available: self.available.saturating_sub(q),
                reserved: self.reserved.saturating_add(q),
            },
            MovementType::Return => Self {
                available: self.available.saturating_add(q),
                reserved: self.reserved.saturating_sub(q),
            },
            MovementType::WriteOff => Self {
                available: self.available.saturating_sub(q),
                reserved: self.reserved,
            },
            MovementType::Receive => Self {
                available: self.available.saturating_add(q),
                reserved: self.reserved,
            },
            MovementType::Inventory => match movement.quantity_after {
                Some(after) => Self {
                    available: after,
                    reserved: self.reserved,
                },
                None => self,
            },
        }
    }

    /// Fold a chronologically ordered history onto `self`.
    #[must_use]
    pub fn replay<'a>(self, history: impl IntoIterator<Item = &'a Movement>) -> Self {
        history.into_iter().fold(self, Self::apply)
    }
}

/// Input for provisioning a new fund item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFundItem {
    /// Catalog entry to stock.
    pub catalog_ref: CatalogRef,
    /// Fund the counters belong to.
    #[serde(default)]
    pub scope: FundScope,
}

/// Stock received in the same write that creates a fund item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningStock {
    /// Units received; must be positive.
    pub quantity: i32,
    /// Actor recorded on the movement.
    pub actor: UserId,
    /// Free-text comment.
    pub comment: Option<String>,
}

impl OpeningStock {
    /// The `RECEIVE` movement that records this stock.
    #[must_use]
    pub fn movement(&self) -> MovementDraft {
        MovementDraft {
            movement_type: MovementType::Receive,
            ticket_id: None,
            quantity: self.quantity,
            quantity_before: None,
            quantity_after: None,
            comment: self.comment.clone(),
            user_id: self.actor,
        }
    }
}

/// A fund item and its whole movement log, read from one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemHistory {
    /// The item as of the snapshot.
    pub item: FundItem,
    /// Its movements, oldest first.
    pub movements: Vec<Movement>,
}

/// Scope criterion for listing fund items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScopeFilter {
    /// Only the shared fund.
    #[default]
    Global,
    /// Only one company's private fund.
    Company(CompanyId),
    /// Every scope.
    All,
}

impl ScopeFilter {
    /// Whether an item in `scope` passes this filter.
    #[must_use]
    pub fn matches(self, scope: FundScope) -> bool {
        match self {
            Self::All => true,
            Self::Global => scope == FundScope::Global,
            Self::Company(id) => scope == FundScope::Company(id),
        }
    }
}

impl From<FundScope> for ScopeFilter {
    fn from(scope: FundScope) -> Self {
        match scope {
            FundScope::Global => Self::Global,
            FundScope::Company(id) => Self::Company(id),
        }
    }
}

/// Filter criteria for listing fund items.
#[derive(Debug, Clone, Copy, Default)]
pub struct FundItemFilter {
    /// Which fund(s) to list.
    pub scope: ScopeFilter,
    /// Filter by item type.
    pub item_type: Option<ItemType>,
    /// Only items whose physical count disagrees with the book quantity.
    pub discrepancies_only: bool,
}

impl FundItemFilter {
    /// Whether `item` passes this filter.
    #[must_use]
    pub fn matches(&self, item: &FundItem) -> bool {
        self.scope.matches(item.scope)
            && self.item_type.is_none_or(|t| t == item.item_type())
            && (!self.discrepancies_only || item.has_discrepancy())
    }
}

/// Filter criteria for reading the movement log.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovementFilter {
    /// Filter by fund item.
    pub fund_item_id: Option<FundItemId>,
    /// Filter by movement type.
    pub movement_type: Option<MovementType>,
    /// Maximum number of results (service default when `None`).
    pub limit: Option<u32>,
}

impl MovementFilter {
    /// Whether `movement` passes the item and type criteria.
    #[must_use]
    pub fn matches(&self, movement: &Movement) -> bool {
        self.fund_item_id.is_none_or(|id| id == movement.fund_item_id)
            && self
                .movement_type
                .is_none_or(|t| t == movement.movement_type)
    }
}

/// New counter values for a locked fund item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemUpdate {
    /// New available quantity.
    pub quantity_available: i32,
    /// New reserved quantity.
    pub quantity_reserved: i32,
    /// New physical count.
    pub quantity_actual: Option<i32>,
    /// New reconciliation timestamp.
    pub last_inventory_date: Option<DateTime<Utc>>,
}

impl ItemUpdate {
    /// An update that leaves `item` exactly as it is.
    #[must_use]
    pub const fn unchanged(item: &FundItem) -> Self {
        Self {
            quantity_available: item.quantity_available,
            quantity_reserved: item.quantity_reserved,
            quantity_actual: item.quantity_actual,
            last_inventory_date: item.last_inventory_date,
        }
    }
}

/// Movement row to append alongside an [`ItemUpdate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementDraft {
    /// What happened.
    pub movement_type: MovementType,
    /// Ticket that motivated the movement.
    pub ticket_id: Option<TicketId>,
    /// Delta magnitude, or the counted quantity for `INVENTORY`.
    pub quantity: i32,
    /// Book quantity before a physical count.
    pub quantity_before: Option<i32>,
    /// Book quantity after a physical count.
    pub quantity_after: Option<i32>,
    /// Free-text comment.
    pub comment: Option<String>,
    /// Actor performing the operation.
    pub user_id: UserId,
}

/// Everything one successful operation writes: new counters plus one movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    /// Counter changes for the fund item.
    pub update: ItemUpdate,
    /// Audit record to append.
    pub movement: MovementDraft,
}

/// Result of a committed (or replayed) posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Posted {
    /// Fund item after the operation.
    pub item: FundItem,
    /// The movement recorded for the operation.
    pub movement: Movement,
    /// True when an earlier posting with the same idempotency key was returned
    /// instead of applying the operation again.
    pub replayed: bool,
}

/// Outcome of replaying a fund item's audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Fund item that was checked.
    pub fund_item_id: FundItemId,
    /// Number of movements replayed.
    pub movements: usize,
    /// Counters the replay started from.
    pub opening: Counters,
    /// Counters the replay arrived at.
    pub replayed: Counters,
    /// Counters currently stored on the item.
    pub recorded: Counters,
}

impl AuditReport {
    /// True when replaying the log reproduces the stored counters.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.replayed == self.recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonerdesk_core::CartridgeTypeId;

    fn item(available: i32, actual: Option<i32>) -> FundItem {
        let now = Utc::now();
        FundItem {
            id: FundItemId::new(1),
            catalog_ref: CatalogRef::Cartridge(CartridgeTypeId::new(1)),
            scope: FundScope::Global,
            quantity_available: available,
            quantity_reserved: 0,
            quantity_actual: actual,
            last_inventory_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn movement(movement_type: MovementType, quantity: i32, after: Option<i32>) -> Movement {
        Movement {
            id: MovementId::new(1),
            fund_item_id: FundItemId::new(1),
            movement_type,
            ticket_id: None,
            quantity,
            quantity_before: None,
            quantity_after: after,
            comment: None,
            user_id: UserId::new(7),
            idempotency_key: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_discrepancy_absent_until_counted() {
        assert_eq!(item(20, None).discrepancy(), None);
        assert!(!item(20, None).has_discrepancy());
    }

    #[test]
    fn test_discrepancy_is_actual_minus_available() {
        assert_eq!(item(20, Some(18)).discrepancy(), Some(-2));
        assert!(item(20, Some(18)).has_discrepancy());
        assert_eq!(item(20, Some(20)).discrepancy(), Some(0));
        assert!(!item(20, Some(20)).has_discrepancy());
    }

    #[test]
    fn test_replay_counter_movements() {
        let history = [
            movement(MovementType::Receive, 10, None),
            movement(MovementType::Issue, 4, None),
            movement(MovementType::Return, 1, None),
            movement(MovementType::WriteOff, 2, None),
        ];

        let counters = Counters::default().replay(&history);
        assert_eq!(
            counters,
            Counters {
                available: 5,
                reserved: 3
            }
        );
    }

    #[test]
    fn test_replay_inventory_uses_quantity_after() {
        let start = Counters {
            available: 20,
            reserved: 1,
        };
        let corrected = start.apply(&movement(MovementType::Inventory, 18, Some(18)));
        assert_eq!(corrected.available, 18);
        assert_eq!(corrected.reserved, 1);

        let uncorrected = start.apply(&movement(MovementType::Inventory, 18, Some(20)));
        assert_eq!(uncorrected, start);
    }

    #[test]
    fn test_scope_filter_matching() {
        let company = CompanyId::new(3);
        assert!(ScopeFilter::Global.matches(FundScope::Global));
        assert!(!ScopeFilter::Global.matches(FundScope::Company(company)));
        assert!(ScopeFilter::Company(company).matches(FundScope::Company(company)));
        assert!(!ScopeFilter::Company(company).matches(FundScope::Global));
        assert!(ScopeFilter::All.matches(FundScope::Company(company)));
    }

    #[test]
    fn test_fund_item_filter_discrepancies_only() {
        let filter = FundItemFilter {
            discrepancies_only: true,
            ..FundItemFilter::default()
        };
        assert!(!filter.matches(&item(20, None)));
        assert!(!filter.matches(&item(20, Some(20))));
        assert!(filter.matches(&item(20, Some(18))));
    }

    #[test]
    fn test_fund_item_view_serializes_flat() {
        let view = FundItemView::new(item(20, Some(18)), Some("HP 85A".to_string()));
        let json = serde_json::to_value(&view).unwrap_or_default();
        assert_eq!(json["quantity_available"], 20);
        assert_eq!(json["discrepancy"], -2);
        assert_eq!(json["item_name"], "HP 85A");
    }
}
