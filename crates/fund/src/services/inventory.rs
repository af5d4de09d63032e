//! Inventory reconciliation: recording physical counts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use tonerdesk_core::{FundItemId, MovementType, UserId};

use super::ExecutionPolicy;
use crate::error::{FailureContext, FundError};
use crate::models::{FundItem, ItemUpdate, Movement, MovementDraft, Posted, Posting};
use crate::store::FundStore;

/// A physical count of one fund item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCount {
    /// Fund item that was counted.
    pub fund_item_id: FundItemId,
    /// Units found on the shelf.
    pub actual_quantity: i32,
    /// Who counted.
    pub actor: UserId,
    /// Free-text comment; a summary is generated when absent.
    #[serde(default)]
    pub comment: Option<String>,
    /// Also set the book quantity to the count.
    #[serde(default)]
    pub correct_accounting: bool,
    /// Makes the request safe to resend.
    #[serde(default)]
    pub idempotency_key: Option<Uuid>,
}

impl InventoryCount {
    /// A count that records the number without correcting the books.
    #[must_use]
    pub const fn new(fund_item_id: FundItemId, actual_quantity: i32, actor: UserId) -> Self {
        Self {
            fund_item_id,
            actual_quantity,
            actor,
            comment: None,
            correct_accounting: false,
            idempotency_key: None,
        }
    }

    /// Set the book quantity to the count.
    #[must_use]
    pub const fn correcting(mut self) -> Self {
        self.correct_accounting = true;
        self
    }

    /// Attach a comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Attach an idempotency key.
    #[must_use]
    pub const fn with_idempotency_key(mut self, key: Uuid) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}

/// Compute the posting for a physical count of the locked `item`.
///
/// `quantity_reserved` is never touched.
#[must_use]
pub fn plan_inventory(item: &FundItem, count: &InventoryCount, now: DateTime<Utc>) -> Posting {
    let before = item.quantity_available;
    let after = if count.correct_accounting {
        count.actual_quantity
    } else {
        before
    };
    let comment = count.comment.clone().unwrap_or_else(|| {
        format!(
            "Inventory count: physical {}, book {before}",
            count.actual_quantity
        )
    });

    Posting {
        update: ItemUpdate {
            quantity_available: after,
            quantity_actual: Some(count.actual_quantity),
            last_inventory_date: Some(now),
            ..ItemUpdate::unchanged(item)
        },
        movement: MovementDraft {
            movement_type: MovementType::Inventory,
            ticket_id: None,
            quantity: count.actual_quantity,
            quantity_before: Some(before),
            quantity_after: Some(after),
            comment: Some(comment),
            user_id: count.actor,
        },
    }
}

/// Whether `movement` is what posting `count` would have recorded.
///
/// A correcting count leaves the book at the counted quantity; any other
/// count leaves it where it was.
fn records_count(movement: &Movement, count: &InventoryCount) -> bool {
    let expected_after = if count.correct_accounting {
        Some(count.actual_quantity)
    } else {
        movement.quantity_before
    };
    movement.movement_type == MovementType::Inventory
        && movement.quantity == count.actual_quantity
        && movement.quantity_after == expected_after
}

/// Records physical counts against a [`FundStore`].
#[derive(Debug)]
pub struct InventoryReconciler<S> {
    store: Arc<S>,
    policy: ExecutionPolicy,
}

impl<S: FundStore> InventoryReconciler<S> {
    /// Create a reconciler over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>, policy: ExecutionPolicy) -> Self {
        Self { store, policy }
    }

    /// Record a physical count, optionally correcting the book quantity.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a negative count
    /// - `NotFound` if the fund item does not exist
    /// - `Conflict` if the idempotency key belongs to a different request
    /// - `StorageContention`, `Timeout` or `Storage` on store failures
    #[instrument(
        skip(self, count),
        fields(
            fund_item_id = %count.fund_item_id,
            actual_quantity = count.actual_quantity,
            correct_accounting = count.correct_accounting,
            actor = %count.actor,
        )
    )]
    pub async fn perform_inventory(&self, count: InventoryCount) -> Result<Posted, FundError> {
        let result = self.execute(&count).await;
        match &result {
            Ok(posted) => {
                let discrepancy = posted.item.discrepancy().unwrap_or_default();
                if discrepancy == 0 {
                    info!(
                        movement_id = %posted.movement.id,
                        available = posted.item.quantity_available,
                        replayed = posted.replayed,
                        "Inventory recorded"
                    );
                } else {
                    warn!(
                        movement_id = %posted.movement.id,
                        available = posted.item.quantity_available,
                        discrepancy,
                        replayed = posted.replayed,
                        "Inventory recorded with discrepancy"
                    );
                }
            }
            Err(err) => err.log_failure(&FailureContext {
                operation: MovementType::Inventory.as_str(),
                fund_item_id: count.fund_item_id,
                quantity: count.actual_quantity,
                actor: count.actor,
            }),
        }
        result
    }

    async fn execute(&self, count: &InventoryCount) -> Result<Posted, FundError> {
        if count.actual_quantity < 0 {
            return Err(FundError::InvalidArgument(format!(
                "actual quantity must not be negative, got {}",
                count.actual_quantity
            )));
        }

        let decide = |item: &FundItem, now: DateTime<Utc>| {
            Ok::<_, FundError>(plan_inventory(item, count, now))
        };
        let posted = self
            .policy
            .post(
                self.store.as_ref(),
                MovementType::Inventory.as_str(),
                count.fund_item_id,
                count.idempotency_key,
                &decide,
            )
            .await?;

        if posted.replayed && !records_count(&posted.movement, count) {
            return Err(FundError::Conflict(format!(
                "idempotency key was used for {} of {} (book {:?} -> {:?}) on fund item {}",
                posted.movement.movement_type,
                posted.movement.quantity,
                posted.movement.quantity_before,
                posted.movement.quantity_after,
                posted.item.id
            )));
        }
        Ok(posted)
    }
}
