//! Integration tests for fund operations, audit trail and reconciliation.
//!
//! These run against the in-memory store and need no external services.

#![allow(clippy::unwrap_used)]

use tonerdesk_core::{CartridgeTypeId, FundItemId, LedgerOperation, MovementType, TicketId};
use tonerdesk_fund::FundError;
use tonerdesk_fund::error::Counter;
use tonerdesk_fund::models::{Counters, FundItemFilter, MovementFilter, ScopeFilter};
use tonerdesk_fund::services::{InventoryCount, OperationRequest};
use tonerdesk_integration_tests::{OPERATOR, memory_fund, provision_cartridge};

// =============================================================================
// Counter Operations
// =============================================================================

#[tokio::test]
async fn test_issue_then_return_with_ticket() {
    let fund = memory_fund();
    let item = provision_cartridge(&fund, CartridgeTypeId::new(12), 10).await;

    let issued = fund
        .ledger()
        .issue(item.id, 4, OPERATOR, Some(TicketId::new(55)))
        .await
        .unwrap();
    assert_eq!(issued.item.counters(), Counters { available: 6, reserved: 4 });
    assert_eq!(issued.movement.movement_type, MovementType::Issue);
    assert_eq!(issued.movement.ticket_id, Some(TicketId::new(55)));
    assert_eq!(issued.movement.user_id, OPERATOR);

    let returned = fund.ledger().return_stock(item.id, 1, OPERATOR, None).await.unwrap();
    assert_eq!(returned.item.counters(), Counters { available: 7, reserved: 3 });
}

#[tokio::test]
async fn test_write_off_beyond_available_changes_nothing() {
    let fund = memory_fund();
    let item = provision_cartridge(&fund, CartridgeTypeId::new(12), 5).await;
    let movements_before = fund.store().movement_count();

    let err = fund
        .ledger()
        .write_off(item.id, 6, OPERATOR, Some("Drum cracked".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FundError::PreconditionFailed {
            counter: Counter::Available,
            requested: 6,
            on_hand: 5,
            ..
        }
    ));
    let after = fund.query().get_fund_item(item.id).await.unwrap();
    assert_eq!(after.quantity_available, 5);
    assert_eq!(fund.store().movement_count(), movements_before);
}

#[tokio::test]
async fn test_issue_and_return_round_trip_restores_counters() {
    let fund = memory_fund();
    let item = provision_cartridge(&fund, CartridgeTypeId::new(1), 8).await;
    let before = fund.query().get_fund_item(item.id).await.unwrap().counters();

    fund.ledger().issue(item.id, 3, OPERATOR, None).await.unwrap();
    fund.ledger().return_stock(item.id, 3, OPERATOR, None).await.unwrap();

    let after = fund.query().get_fund_item(item.id).await.unwrap().counters();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_write_off_and_receive_leave_reserved_alone() {
    let fund = memory_fund();
    let item = provision_cartridge(&fund, CartridgeTypeId::new(1), 10).await;
    fund.ledger().issue(item.id, 2, OPERATOR, None).await.unwrap();

    let written_off = fund.ledger().write_off(item.id, 3, OPERATOR, None).await.unwrap();
    assert_eq!(written_off.item.counters(), Counters { available: 5, reserved: 2 });

    let received = fund.ledger().receive(item.id, 7, OPERATOR, None).await.unwrap();
    assert_eq!(received.item.counters(), Counters { available: 12, reserved: 2 });
}

#[tokio::test]
async fn test_return_more_than_reserved_is_rejected() {
    let fund = memory_fund();
    let item = provision_cartridge(&fund, CartridgeTypeId::new(1), 10).await;
    fund.ledger().issue(item.id, 1, OPERATOR, None).await.unwrap();

    let err = fund.ledger().return_stock(item.id, 2, OPERATOR, None).await.unwrap_err();
    assert!(matches!(
        err,
        FundError::PreconditionFailed {
            counter: Counter::Reserved,
            requested: 2,
            on_hand: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_posting() {
    let fund = memory_fund();
    let item = provision_cartridge(&fund, CartridgeTypeId::new(1), 10).await;
    let movements_before = fund.store().movement_count();

    let err = fund.ledger().issue(item.id, 0, OPERATOR, None).await.unwrap_err();
    assert!(matches!(err, FundError::InvalidArgument(_)));

    let err = fund.ledger().receive(FundItemId::new(999), 1, OPERATOR, None).await.unwrap_err();
    assert!(matches!(err, FundError::NotFound(id) if id == FundItemId::new(999)));

    let err = fund
        .reconciler()
        .perform_inventory(InventoryCount::new(item.id, -1, OPERATOR))
        .await
        .unwrap_err();
    assert!(matches!(err, FundError::InvalidArgument(_)));

    assert_eq!(fund.store().movement_count(), movements_before);
}

// =============================================================================
// Audit Trail
// =============================================================================

#[tokio::test]
async fn test_every_success_leaves_one_movement_and_replays() {
    let fund = memory_fund();
    let item = provision_cartridge(&fund, CartridgeTypeId::new(3), 10).await;

    let ledger = fund.ledger();
    ledger.issue(item.id, 4, OPERATOR, None).await.unwrap();
    ledger.return_stock(item.id, 2, OPERATOR, None).await.unwrap();
    ledger.write_off(item.id, 1, OPERATOR, None).await.unwrap();
    assert!(ledger.issue(item.id, 100, OPERATOR, None).await.is_err());
    ledger.receive(item.id, 5, OPERATOR, None).await.unwrap();
    fund.reconciler()
        .perform_inventory(InventoryCount::new(item.id, 13, OPERATOR).correcting())
        .await
        .unwrap();

    let filter = MovementFilter {
        fund_item_id: Some(item.id),
        ..MovementFilter::default()
    };
    let movements = fund.query().get_movements(&filter).await.unwrap();
    // Opening RECEIVE plus five successful operations.
    assert_eq!(movements.len(), 6);
    assert_eq!(movements[0].movement_type, MovementType::Inventory);

    let report = fund
        .query()
        .verify_audit_trail(item.id, Counters::default())
        .await
        .unwrap();
    assert_eq!(report.movements, 6);
    assert!(report.is_consistent());
    assert_eq!(report.recorded, Counters { available: 13, reserved: 2 });
}

#[tokio::test]
async fn test_movement_log_filters_and_limit() {
    let fund = memory_fund();
    let first = provision_cartridge(&fund, CartridgeTypeId::new(1), 10).await;
    let second = provision_cartridge(&fund, CartridgeTypeId::new(2), 10).await;
    fund.ledger().issue(first.id, 1, OPERATOR, None).await.unwrap();
    fund.ledger().issue(second.id, 1, OPERATOR, None).await.unwrap();
    fund.ledger().issue(second.id, 1, OPERATOR, None).await.unwrap();

    let issues = MovementFilter {
        movement_type: Some(MovementType::Issue),
        ..MovementFilter::default()
    };
    assert_eq!(fund.query().get_movements(&issues).await.unwrap().len(), 3);

    let limited = MovementFilter {
        limit: Some(2),
        ..MovementFilter::default()
    };
    let newest = fund.query().get_movements(&limited).await.unwrap();
    assert_eq!(newest.len(), 2);
    assert!(newest.iter().all(|m| m.fund_item_id == second.id));

    let too_many = MovementFilter {
        limit: Some(1001),
        ..MovementFilter::default()
    };
    let err = fund.query().get_movements(&too_many).await.unwrap_err();
    assert!(matches!(err, FundError::InvalidArgument(_)));
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_count_without_correction_surfaces_discrepancy() {
    let fund = memory_fund();
    let item = provision_cartridge(&fund, CartridgeTypeId::new(12), 20).await;
    let discrepancies = FundItemFilter {
        discrepancies_only: true,
        ..FundItemFilter::default()
    };
    assert!(fund.query().get_fund_items(&discrepancies).await.unwrap().is_empty());

    let posted = fund
        .reconciler()
        .perform_inventory(InventoryCount::new(item.id, 18, OPERATOR))
        .await
        .unwrap();
    assert_eq!(posted.item.quantity_available, 20);
    assert_eq!(posted.item.quantity_actual, Some(18));
    assert!(posted.item.last_inventory_date.is_some());
    assert_eq!(posted.movement.quantity_before, Some(20));
    assert_eq!(posted.movement.quantity_after, Some(20));
    assert_eq!(
        posted.movement.comment.as_deref(),
        Some("Inventory count: physical 18, book 20")
    );

    let listed = fund.query().get_fund_items(&discrepancies).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].item.id, item.id);
    assert_eq!(listed[0].discrepancy, Some(-2));
}

#[tokio::test]
async fn test_count_with_correction_resets_books() {
    let fund = memory_fund();
    let item = provision_cartridge(&fund, CartridgeTypeId::new(12), 20).await;
    fund.ledger().issue(item.id, 5, OPERATOR, None).await.unwrap();

    let posted = fund
        .reconciler()
        .perform_inventory(
            InventoryCount::new(item.id, 13, OPERATOR)
                .correcting()
                .with_comment("Quarterly count"),
        )
        .await
        .unwrap();

    assert_eq!(posted.item.counters(), Counters { available: 13, reserved: 5 });
    assert_eq!(posted.item.discrepancy(), Some(0));
    assert_eq!(posted.movement.quantity_before, Some(15));
    assert_eq!(posted.movement.quantity_after, Some(13));
    assert_eq!(posted.movement.comment.as_deref(), Some("Quarterly count"));
}

#[tokio::test]
async fn test_scope_filter_separates_funds() {
    use tonerdesk_core::{CatalogRef, CompanyId, FundScope};
    use tonerdesk_fund::models::NewFundItem;

    let fund = memory_fund();
    provision_cartridge(&fund, CartridgeTypeId::new(12), 1).await;
    fund.provision(
        NewFundItem {
            catalog_ref: CatalogRef::Cartridge(CartridgeTypeId::new(12)),
            scope: FundScope::Company(CompanyId::new(3)),
        },
        2,
        OPERATOR,
    )
    .await
    .unwrap();

    let count = |scope| {
        let filter = FundItemFilter {
            scope,
            ..FundItemFilter::default()
        };
        let query = fund.query();
        async move { query.get_fund_items(&filter).await.unwrap().len() }
    };
    assert_eq!(count(ScopeFilter::Global).await, 1);
    assert_eq!(count(ScopeFilter::Company(CompanyId::new(3))).await, 1);
    assert_eq!(count(ScopeFilter::Company(CompanyId::new(4))).await, 0);
    assert_eq!(count(ScopeFilter::All).await, 2);
}

// =============================================================================
// Idempotency
// =============================================================================

#[tokio::test]
async fn test_repeated_key_is_applied_once() {
    let fund = memory_fund();
    let item = provision_cartridge(&fund, CartridgeTypeId::new(12), 10).await;
    let key = uuid::Uuid::new_v4();
    let request = OperationRequest::new(item.id, LedgerOperation::Issue, 4, OPERATOR)
        .with_ticket(TicketId::new(55))
        .with_idempotency_key(key);

    let first = fund.ledger().perform_operation(request.clone()).await.unwrap();
    let again = fund.ledger().perform_operation(request).await.unwrap();

    assert!(!first.replayed);
    assert!(again.replayed);
    assert_eq!(first.movement.id, again.movement.id);
    let stored = fund.query().get_fund_item(item.id).await.unwrap();
    assert_eq!(stored.counters(), Counters { available: 6, reserved: 4 });
}

#[tokio::test]
async fn test_key_reused_for_different_operation_conflicts() {
    let fund = memory_fund();
    let item = provision_cartridge(&fund, CartridgeTypeId::new(12), 10).await;
    let key = uuid::Uuid::new_v4();

    fund.ledger()
        .perform_operation(
            OperationRequest::new(item.id, LedgerOperation::Issue, 4, OPERATOR)
                .with_idempotency_key(key),
        )
        .await
        .unwrap();
    let err = fund
        .ledger()
        .perform_operation(
            OperationRequest::new(item.id, LedgerOperation::WriteOff, 4, OPERATOR)
                .with_idempotency_key(key),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FundError::Conflict(_)));
    let stored = fund.query().get_fund_item(item.id).await.unwrap();
    assert_eq!(stored.quantity_available, 6);
}
