//! Fund-changing commands: provisioning, counter operations, physical counts.

use std::fmt::Write as _;

use tonerdesk_core::{CartridgeTypeId, CatalogRef, CompanyId, FundScope, PrinterModelId, UserId};
use tonerdesk_fund::models::{FundItem, NewFundItem, Posted};
use tonerdesk_fund::services::{InventoryCount, OperationRequest};
use tonerdesk_fund::{FundServices, FundStore};

use super::Output;

/// Build a catalog reference from the `--cartridge` / `--printer` flags.
///
/// # Errors
///
/// Returns an error unless exactly one of the two is given.
pub fn catalog_ref(
    cartridge: Option<CartridgeTypeId>,
    printer: Option<PrinterModelId>,
) -> Result<CatalogRef, Box<dyn std::error::Error>> {
    match (cartridge, printer) {
        (Some(id), None) => Ok(CatalogRef::Cartridge(id)),
        (None, Some(id)) => Ok(CatalogRef::Printer(id)),
        _ => Err("exactly one of --cartridge or --printer is required".into()),
    }
}

/// Create a fund item with optional opening stock.
///
/// # Errors
///
/// Returns an error if the position already exists or the store fails.
pub async fn provision<S: FundStore>(
    fund: &FundServices<S>,
    out: Output,
    catalog_ref: CatalogRef,
    company: Option<CompanyId>,
    quantity: i32,
    actor: UserId,
) -> Result<(), Box<dyn std::error::Error>> {
    let new = NewFundItem {
        catalog_ref,
        scope: FundScope::from(company),
    };
    let item = fund.provision(new, quantity, actor).await?;
    out.emit(&item, || render_item(&item))?;
    Ok(())
}

/// Issue, return, write off or receive stock.
///
/// # Errors
///
/// Returns the ledger error; its user message is what gets printed.
pub async fn operation<S: FundStore>(
    fund: &FundServices<S>,
    out: Output,
    request: OperationRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let posted = fund
        .ledger()
        .perform_operation(request)
        .await
        .map_err(|e| e.user_message())?;
    out.emit(&posted, || render_posted(&posted))?;
    Ok(())
}

/// Record a physical count.
///
/// # Errors
///
/// Returns the reconciler error; its user message is what gets printed.
pub async fn inventory<S: FundStore>(
    fund: &FundServices<S>,
    out: Output,
    count: InventoryCount,
) -> Result<(), Box<dyn std::error::Error>> {
    let posted = fund
        .reconciler()
        .perform_inventory(count)
        .await
        .map_err(|e| e.user_message())?;
    out.emit(&posted, || render_posted(&posted))?;
    Ok(())
}

fn render_item(item: &FundItem) -> String {
    format!(
        "Fund item {} ({}, {}): available {}, reserved {}",
        item.id, item.catalog_ref, item.scope, item.quantity_available, item.quantity_reserved
    )
}

/// One-line summary of a posting.
#[must_use]
pub fn render_posted(posted: &Posted) -> String {
    let m = &posted.movement;
    let mut line = format!(
        "{} {} on fund item {} (movement {})",
        m.movement_type, m.quantity, m.fund_item_id, m.id
    );
    if posted.replayed {
        line.push_str(" [already recorded]");
    }
    line.push('\n');
    line.push_str(&render_item(&posted.item));
    if let Some(diff) = posted.item.discrepancy().filter(|d| *d != 0) {
        let _ = write!(line, ", discrepancy {diff:+}");
    }
    line
}
