//! Ledger engine for the four counter operations.
//!
//! Each call validates its arguments, then locks the fund item, checks the
//! precondition against the locked row, writes the counters and appends one
//! movement, all in a single store transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use tonerdesk_core::{FundItemId, LedgerOperation, TicketId, UserId};

use super::ExecutionPolicy;
use crate::error::{Counter, FailureContext, FundError};
use crate::models::{FundItem, ItemUpdate, MovementDraft, Posted, Posting};
use crate::store::FundStore;

/// Parameters of one ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Fund item to change.
    pub fund_item_id: FundItemId,
    /// What to do.
    pub operation: LedgerOperation,
    /// How many units; must be positive.
    pub quantity: i32,
    /// Who is doing it.
    pub actor: UserId,
    /// Ticket the operation belongs to.
    #[serde(default)]
    pub ticket_id: Option<TicketId>,
    /// Free-text comment.
    #[serde(default)]
    pub comment: Option<String>,
    /// Makes the request safe to resend.
    #[serde(default)]
    pub idempotency_key: Option<Uuid>,
}

impl OperationRequest {
    /// Create a request without ticket, comment or idempotency key.
    #[must_use]
    pub const fn new(
        fund_item_id: FundItemId,
        operation: LedgerOperation,
        quantity: i32,
        actor: UserId,
    ) -> Self {
        Self {
            fund_item_id,
            operation,
            quantity,
            actor,
            ticket_id: None,
            comment: None,
            idempotency_key: None,
        }
    }

    /// Attach a ticket.
    #[must_use]
    pub const fn with_ticket(mut self, ticket_id: TicketId) -> Self {
        self.ticket_id = Some(ticket_id);
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

    fn validate(&self) -> Result<(), FundError> {
        if self.quantity <= 0 {
            return Err(FundError::InvalidArgument(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        Ok(())
    }

    fn failure_context(&self) -> FailureContext<'static> {
        FailureContext {
            operation: self.operation.movement_type().as_str(),
            fund_item_id: self.fund_item_id,
            quantity: self.quantity,
            actor: self.actor,
        }
    }
}

/// Compute the posting for `request` against the locked `item`.
///
/// # Errors
///
/// Returns `FundError::PreconditionFailed` when the counter the operation
/// draws from is too low, and `FundError::InvalidArgument` when a counter
/// would overflow.
pub fn plan_operation(item: &FundItem, request: &OperationRequest) -> Result<Posting, FundError> {
    let q = request.quantity;
    let available = item.quantity_available;
    let reserved = item.quantity_reserved;

    let shortfall = |counter, on_hand| FundError::PreconditionFailed {
        fund_item_id: item.id,
        counter,
        requested: q,
        on_hand,
    };
    let overflow = |counter: Counter| {
        FundError::InvalidArgument(format!(
            "{counter} quantity of fund item {} would overflow",
            item.id
        ))
    };

    let (new_available, new_reserved) = match request.operation {
        LedgerOperation::Issue => {
            if available < q {
                return Err(shortfall(Counter::Available, available));
            }
            let reserved = reserved
                .checked_add(q)
                .ok_or_else(|| overflow(Counter::Reserved))?;
            (available - q, reserved)
        }
        LedgerOperation::Return => {
            if reserved < q {
                return Err(shortfall(Counter::Reserved, reserved));
            }
            let available = available
                .checked_add(q)
                .ok_or_else(|| overflow(Counter::Available))?;
            (available, reserved - q)
        }
        LedgerOperation::WriteOff => {
            if available < q {
                return Err(shortfall(Counter::Available, available));
            }
            (available - q, reserved)
        }
        LedgerOperation::Receive => {
            let available = available
                .checked_add(q)
                .ok_or_else(|| overflow(Counter::Available))?;
            (available, reserved)
        }
    };

    Ok(Posting {
        update: ItemUpdate {
            quantity_available: new_available,
            quantity_reserved: new_reserved,
            ..ItemUpdate::unchanged(item)
        },
        movement: MovementDraft {
            movement_type: request.operation.movement_type(),
            ticket_id: request.ticket_id,
            quantity: q,
            quantity_before: None,
            quantity_after: None,
            comment: request.comment.clone(),
            user_id: request.actor,
        },
    })
}

/// Executes issue, return, write-off and receive against a [`FundStore`].
#[derive(Debug)]
pub struct LedgerEngine<S> {
    store: Arc<S>,
    policy: ExecutionPolicy,
}

impl<S: FundStore> LedgerEngine<S> {
    /// Create a ledger engine over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>, policy: ExecutionPolicy) -> Self {
        Self { store, policy }
    }

    /// Apply one counter operation and record its movement.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a non-positive quantity or counter overflow
    /// - `NotFound` if the fund item does not exist
    /// - `PreconditionFailed` if stock is insufficient; nothing is written
    /// - `Conflict` if the idempotency key belongs to a different request
    /// - `StorageContention`, `Timeout` or `Storage` on store failures
    #[instrument(
        skip(self, request),
        fields(
            fund_item_id = %request.fund_item_id,
            operation = %request.operation,
            quantity = request.quantity,
            actor = %request.actor,
        )
    )]
    pub async fn perform_operation(&self, request: OperationRequest) -> Result<Posted, FundError> {
        let result = self.execute(&request).await;
        match &result {
            Ok(posted) => info!(
                movement_id = %posted.movement.id,
                available = posted.item.quantity_available,
                reserved = posted.item.quantity_reserved,
                ticket_id = ?request.ticket_id,
                replayed = posted.replayed,
                "Fund operation posted"
            ),
            Err(err) => err.log_failure(&request.failure_context()),
        }
        result
    }

    async fn execute(&self, request: &OperationRequest) -> Result<Posted, FundError> {
        request.validate()?;

        let decide = |item: &FundItem, _now: DateTime<Utc>| plan_operation(item, request);
        let posted = self
            .policy
            .post(
                self.store.as_ref(),
                request.operation.movement_type().as_str(),
                request.fund_item_id,
                request.idempotency_key,
                &decide,
            )
            .await?;

        if posted.replayed
            && (posted.movement.movement_type != request.operation.movement_type()
                || posted.movement.quantity != request.quantity)
        {
            return Err(FundError::Conflict(format!(
                "idempotency key was used for {} of {} on fund item {}",
                posted.movement.movement_type, posted.movement.quantity, posted.item.id
            )));
        }
        Ok(posted)
    }

    /// Issue stock for a ticket: available to reserved.
    ///
    /// # Errors
    ///
    /// See [`Self::perform_operation`].
    pub async fn issue(
        &self,
        fund_item_id: FundItemId,
        quantity: i32,
        actor: UserId,
        ticket_id: Option<TicketId>,
    ) -> Result<Posted, FundError> {
        let mut request = OperationRequest::new(fund_item_id, LedgerOperation::Issue, quantity, actor);
        request.ticket_id = ticket_id;
        self.perform_operation(request).await
    }

    /// Take issued stock back: reserved to available.
    ///
    /// # Errors
    ///
    /// See [`Self::perform_operation`].
    pub async fn return_stock(
        &self,
        fund_item_id: FundItemId,
        quantity: i32,
        actor: UserId,
        ticket_id: Option<TicketId>,
    ) -> Result<Posted, FundError> {
        let mut request =
            OperationRequest::new(fund_item_id, LedgerOperation::Return, quantity, actor);
        request.ticket_id = ticket_id;
        self.perform_operation(request).await
    }

    /// Remove stock from the available counter.
    ///
    /// # Errors
    ///
    /// See [`Self::perform_operation`].
    pub async fn write_off(
        &self,
        fund_item_id: FundItemId,
        quantity: i32,
        actor: UserId,
        comment: Option<String>,
    ) -> Result<Posted, FundError> {
        let mut request =
            OperationRequest::new(fund_item_id, LedgerOperation::WriteOff, quantity, actor);
        request.comment = comment;
        self.perform_operation(request).await
    }

    /// Add delivered stock to the available counter.
    ///
    /// # Errors
    ///
    /// See [`Self::perform_operation`].
    pub async fn receive(
        &self,
        fund_item_id: FundItemId,
        quantity: i32,
        actor: UserId,
        comment: Option<String>,
    ) -> Result<Posted, FundError> {
        let mut request =
            OperationRequest::new(fund_item_id, LedgerOperation::Receive, quantity, actor);
        request.comment = comment;
        self.perform_operation(request).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tonerdesk_core::{CartridgeTypeId, CatalogRef, FundScope, MovementType};

    use super::*;

    fn item(available: i32, reserved: i32) -> FundItem {
        let now = Utc::now();
        FundItem {
            id: FundItemId::new(1),
            catalog_ref: CatalogRef::Cartridge(CartridgeTypeId::new(1)),
            scope: FundScope::Global,
            quantity_available: available,
            quantity_reserved: reserved,
            quantity_actual: None,
            last_inventory_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(operation: LedgerOperation, quantity: i32) -> OperationRequest {
        OperationRequest::new(FundItemId::new(1), operation, quantity, UserId::new(7))
    }

    #[test]
    fn test_issue_moves_available_to_reserved() {
        let posting = plan_operation(
            &item(10, 0),
            &request(LedgerOperation::Issue, 4).with_ticket(TicketId::new(55)),
        )
        .unwrap();
        assert_eq!(posting.update.quantity_available, 6);
        assert_eq!(posting.update.quantity_reserved, 4);
        assert_eq!(posting.movement.movement_type, MovementType::Issue);
        assert_eq!(posting.movement.ticket_id, Some(TicketId::new(55)));
        assert_eq!(posting.movement.quantity_before, None);
    }

    #[test]
    fn test_return_moves_reserved_to_available() {
        let posting = plan_operation(&item(6, 4), &request(LedgerOperation::Return, 1)).unwrap();
        assert_eq!(posting.update.quantity_available, 7);
        assert_eq!(posting.update.quantity_reserved, 3);
    }

    #[test]
    fn test_write_off_leaves_reserved() {
        let posting = plan_operation(&item(5, 2), &request(LedgerOperation::WriteOff, 5)).unwrap();
        assert_eq!(posting.update.quantity_available, 0);
        assert_eq!(posting.update.quantity_reserved, 2);
    }

    #[test]
    fn test_receive_adds_available() {
        let posting = plan_operation(&item(5, 2), &request(LedgerOperation::Receive, 3)).unwrap();
        assert_eq!(posting.update.quantity_available, 8);
        assert_eq!(posting.update.quantity_reserved, 2);
    }

    #[test]
    fn test_shortfall_reports_counter() {
        let err = plan_operation(&item(5, 0), &request(LedgerOperation::WriteOff, 6)).unwrap_err();
        assert!(matches!(
            err,
            FundError::PreconditionFailed {
                counter: Counter::Available,
                requested: 6,
                on_hand: 5,
                ..
            }
        ));

        let err = plan_operation(&item(5, 0), &request(LedgerOperation::Return, 1)).unwrap_err();
        assert!(matches!(
            err,
            FundError::PreconditionFailed {
                counter: Counter::Reserved,
                on_hand: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_receive_overflow_is_invalid() {
        let err =
            plan_operation(&item(i32::MAX, 0), &request(LedgerOperation::Receive, 1)).unwrap_err();
        assert!(matches!(err, FundError::InvalidArgument(_)));
    }

    #[test]
    fn test_non_positive_quantity_is_invalid() {
        assert!(request(LedgerOperation::Issue, 0).validate().is_err());
        assert!(request(LedgerOperation::Issue, -3).validate().is_err());
        assert!(request(LedgerOperation::Issue, 1).validate().is_ok());
    }
}
