//! Read-only reports: fund items, movement log, audit trail.

use std::fmt::Write as _;

use tonerdesk_core::FundItemId;
use tonerdesk_fund::models::{AuditReport, Counters, FundItemFilter, FundItemView, Movement, MovementFilter};
use tonerdesk_fund::{FundServices, FundStore};

use super::Output;

/// List fund items.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn items<S: FundStore>(
    fund: &FundServices<S>,
    out: Output,
    filter: &FundItemFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    let items = fund.query().get_fund_items(filter).await?;
    out.emit(&items, || render_items(&items))?;
    Ok(())
}

/// Show the movement log.
///
/// # Errors
///
/// Returns an error for an out-of-range limit or if the store cannot be read.
pub async fn movements<S: FundStore>(
    fund: &FundServices<S>,
    out: Output,
    filter: &MovementFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    let movements = fund.query().get_movements(filter).await?;
    out.emit(&movements, || render_movements(&movements))?;
    Ok(())
}

/// Replay a fund item's movements.
///
/// # Errors
///
/// Returns an error if the item does not exist or the audit trail does not
/// reproduce the stored counters.
pub async fn audit<S: FundStore>(
    fund: &FundServices<S>,
    out: Output,
    item: FundItemId,
    opening: Counters,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = fund.query().verify_audit_trail(item, opening).await?;
    out.emit(&report, || render_audit(&report))?;
    if report.is_consistent() {
        Ok(())
    } else {
        Err(format!("audit trail of fund item {item} is inconsistent").into())
    }
}

fn or_dash(value: Option<i32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Text table of fund items.
#[must_use]
pub fn render_items(items: &[FundItemView]) -> String {
    if items.is_empty() {
        return "No fund items.".to_string();
    }
    let mut text = format!(
        "{:>6}  {:<9}  {:<32}  {:<12}  {:>9}  {:>8}  {:>6}  {:>5}",
        "ID", "TYPE", "NAME", "SCOPE", "AVAILABLE", "RESERVED", "ACTUAL", "DIFF"
    );
    for view in items {
        let item = &view.item;
        let _ = write!(
            text,
            "\n{:>6}  {:<9}  {:<32}  {:<12}  {:>9}  {:>8}  {:>6}  {:>5}",
            item.id.to_string(),
            item.item_type().to_string(),
            view.item_name.as_deref().unwrap_or("(unknown)"),
            item.scope.to_string(),
            item.quantity_available,
            item.quantity_reserved,
            or_dash(item.quantity_actual),
            or_dash(view.discrepancy),
        );
    }
    text
}

/// Text table of movements.
#[must_use]
pub fn render_movements(movements: &[Movement]) -> String {
    if movements.is_empty() {
        return "No movements.".to_string();
    }
    let mut text = format!(
        "{:>8}  {:<20}  {:>6}  {:<9}  {:>5}  {:>7}  {:>12}  {}",
        "ID", "WHEN (UTC)", "ITEM", "TYPE", "QTY", "TICKET", "USER", "COMMENT"
    );
    for m in movements {
        let _ = write!(
            text,
            "\n{:>8}  {:<20}  {:>6}  {:<9}  {:>5}  {:>7}  {:>12}  {}",
            m.id.to_string(),
            m.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            m.fund_item_id.to_string(),
            m.movement_type.to_string(),
            m.quantity,
            m.ticket_id.map_or_else(|| "-".to_string(), |t| t.to_string()),
            m.user_id.to_string(),
            m.comment.as_deref().unwrap_or(""),
        );
    }
    text
}

/// Text summary of an audit.
#[must_use]
pub fn render_audit(report: &AuditReport) -> String {
    format!(
        "Fund item {}: {} movements replayed from available {} / reserved {}\n\
         replayed: available {} / reserved {}\n\
         recorded: available {} / reserved {}\n\
         {}",
        report.fund_item_id,
        report.movements,
        report.opening.available,
        report.opening.reserved,
        report.replayed.available,
        report.replayed.reserved,
        report.recorded.available,
        report.recorded.reserved,
        if report.is_consistent() {
            "OK"
        } else {
            "MISMATCH"
        },
    )
}
