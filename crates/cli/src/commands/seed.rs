//! Provision fund items in bulk from a YAML file.
//!
//! ```yaml
//! items:
//!   - cartridge_type_id: 12
//!     quantity: 10
//!   - cartridge_type_id: 12
//!     company_id: 3
//!     quantity: 2
//!   - printer_model_id: 4
//! ```
//!
//! Entries whose position already exists are skipped, so a file can be
//! applied more than once.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use tonerdesk_core::{CartridgeTypeId, CatalogRef, CompanyId, FundScope, PrinterModelId, UserId};
use tonerdesk_fund::models::NewFundItem;
use tonerdesk_fund::{FundError, FundServices, FundStore};

use super::Output;

/// Errors in a seed file.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("entry {index}: {reason}")]
    InvalidEntry { index: usize, reason: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedFile {
    items: Vec<SeedEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedEntry {
    #[serde(default)]
    cartridge_type_id: Option<CartridgeTypeId>,
    #[serde(default)]
    printer_model_id: Option<PrinterModelId>,
    #[serde(default)]
    company_id: Option<CompanyId>,
    #[serde(default)]
    quantity: i32,
}

/// A validated seed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedItem {
    /// Position to create.
    pub new: NewFundItem,
    /// Opening stock.
    pub quantity: i32,
}

/// Outcome of a seed run.
#[derive(Debug, Default, Serialize)]
pub struct SeedSummary {
    /// Positions created.
    pub provisioned: usize,
    /// Positions that already existed.
    pub skipped: usize,
}

/// Parse and validate seed file content.
///
/// # Errors
///
/// Returns `SeedError` for malformed YAML, an entry without exactly one
/// catalog reference, or a negative quantity.
pub fn parse(content: &str) -> Result<Vec<SeedItem>, SeedError> {
    let file: SeedFile = serde_yaml::from_str(content)?;

    file.items
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let invalid = |reason: &str| SeedError::InvalidEntry {
                index,
                reason: reason.to_string(),
            };
            let catalog_ref = match (entry.cartridge_type_id, entry.printer_model_id) {
                (Some(id), None) => CatalogRef::Cartridge(id),
                (None, Some(id)) => CatalogRef::Printer(id),
                (None, None) => return Err(invalid("missing cartridge_type_id or printer_model_id")),
                (Some(_), Some(_)) => {
                    return Err(invalid("set only one of cartridge_type_id and printer_model_id"));
                }
            };
            if entry.quantity < 0 {
                return Err(invalid("quantity must not be negative"));
            }
            Ok(SeedItem {
                new: NewFundItem {
                    catalog_ref,
                    scope: FundScope::from(entry.company_id),
                },
                quantity: entry.quantity,
            })
        })
        .collect()
}

/// Provision every entry of a seed file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if provisioning
/// fails for a reason other than the position already existing.
pub async fn fund_items<S: FundStore>(
    fund: &FundServices<S>,
    out: Output,
    file_path: &str,
    actor: UserId,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading fund items from file");
    let content = tokio::fs::read_to_string(path).await?;
    let items = parse(&content)?;
    info!(items = items.len(), "Parsed seed file");

    let summary = apply(fund, &items, actor).await?;

    info!(
        provisioned = summary.provisioned,
        skipped = summary.skipped,
        "Seeding complete"
    );
    out.emit(&summary, || {
        format!(
            "Provisioned {} fund items, skipped {} existing",
            summary.provisioned, summary.skipped
        )
    })?;
    Ok(())
}

/// Provision `items`, skipping positions that already exist.
///
/// # Errors
///
/// Returns the first provisioning error other than a conflict.
pub async fn apply<S: FundStore>(
    fund: &FundServices<S>,
    items: &[SeedItem],
    actor: UserId,
) -> Result<SeedSummary, FundError> {
    let mut summary = SeedSummary::default();
    for item in items {
        match fund.provision(item.new, item.quantity, actor).await {
            Ok(_) => summary.provisioned += 1,
            Err(FundError::Conflict(_)) => {
                info!(
                    catalog_ref = %item.new.catalog_ref,
                    scope = %item.new.scope,
                    "Fund item already exists, skipping"
                );
                summary.skipped += 1;
            }
            Err(e) => {
                error!(
                    catalog_ref = %item.new.catalog_ref,
                    error = %e,
                    "Failed to provision fund item"
                );
                return Err(e);
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tonerdesk_fund::MemoryFundStore;
    use tonerdesk_fund::models::FundItemFilter;
    use tonerdesk_fund::models::ScopeFilter;
    use std::time::Duration;

    use tonerdesk_fund::retry::RetryPolicy;
    use tonerdesk_fund::services::ExecutionPolicy;

    use super::*;

    const SEED: &str = "
items:
  - cartridge_type_id: 12
    quantity: 10
  - cartridge_type_id: 12
    company_id: 3
    quantity: 2
  - printer_model_id: 4
";

    #[test]
    fn test_parse_seed_file() {
        let items = parse(SEED).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(
            items[0].new.catalog_ref,
            CatalogRef::Cartridge(CartridgeTypeId::new(12))
        );
        assert_eq!(items[1].new.scope, FundScope::Company(CompanyId::new(3)));
        assert_eq!(items[2].quantity, 0);
    }

    #[test]
    fn test_parse_rejects_ambiguous_entry() {
        let err = parse("items:\n  - cartridge_type_id: 1\n    printer_model_id: 2\n").unwrap_err();
        assert!(matches!(err, SeedError::InvalidEntry { index: 0, .. }));

        let err = parse("items:\n  - quantity: 3\n").unwrap_err();
        assert!(matches!(err, SeedError::InvalidEntry { index: 0, .. }));
    }

    #[test]
    fn test_parse_rejects_negative_quantity() {
        let err = parse("items:\n  - printer_model_id: 2\n    quantity: -1\n").unwrap_err();
        assert!(err.to_string().contains("negative"));
    }

    #[tokio::test]
    async fn test_apply_twice_skips_existing() {
        let fund = FundServices::new(MemoryFundStore::new(), ExecutionPolicy::default(), 100);
        let items = parse(SEED).unwrap();

        let first = apply(&fund, &items, UserId::new(1)).await.unwrap();
        assert_eq!(first.provisioned, 3);
        assert_eq!(first.skipped, 0);

        let second = apply(&fund, &items, UserId::new(1)).await.unwrap();
        assert_eq!(second.provisioned, 0);
        assert_eq!(second.skipped, 3);

        let filter = FundItemFilter {
            scope: ScopeFilter::All,
            ..FundItemFilter::default()
        };
        let views = fund.query().get_fund_items(&filter).await.unwrap();
        let stock: Vec<i32> = views.iter().map(|v| v.item.quantity_available).collect();
        assert_eq!(stock, [10, 2, 0]);
    }

    #[tokio::test]
    async fn test_apply_after_busy_failure_provisions_everything() {
        let policy = ExecutionPolicy {
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
            attempt_timeout: Duration::from_secs(5),
        };
        let fund = FundServices::new(MemoryFundStore::new(), policy, 100);
        let items = parse(SEED).unwrap();

        fund.store().inject_busy(3);
        let err = apply(&fund, &items, UserId::new(1)).await.unwrap_err();
        assert!(matches!(err, FundError::StorageContention { attempts: 3, .. }));

        let summary = apply(&fund, &items, UserId::new(1)).await.unwrap();
        assert_eq!(summary.provisioned, 3);
        assert_eq!(summary.skipped, 0);

        let filter = FundItemFilter {
            scope: ScopeFilter::All,
            ..FundItemFilter::default()
        };
        let views = fund.query().get_fund_items(&filter).await.unwrap();
        let stock: Vec<i32> = views.iter().map(|v| v.item.quantity_available).collect();
        assert_eq!(stock, [10, 2, 0]);
    }
}
