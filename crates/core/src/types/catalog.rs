//! Catalog references and fund scopes.
//!
//! A fund item points at exactly one catalog entry: a cartridge type or a
//! printer model. [`CatalogRef`] makes that rule part of the type instead of a
//! pair of nullable columns.

use serde::{Deserialize, Serialize};

use super::id::{CartridgeTypeId, CompanyId, PrinterModelId};
use super::movement::ParseKindError;

/// Kind of inventory position held in the replacement fund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "fund.item_type", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    /// Spare cartridge of a catalog cartridge type.
    Cartridge,
    /// Spare printer of a catalog printer model.
    Printer,
}

impl ItemType {
    /// Canonical upper-case name, as stored and as accepted by [`str::parse`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cartridge => "CARTRIDGE",
            Self::Printer => "PRINTER",
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CARTRIDGE" => Ok(Self::Cartridge),
            "PRINTER" => Ok(Self::Printer),
            _ => Err(ParseKindError::new("item type", s)),
        }
    }
}

/// Reference from a fund item to the catalog entry it stocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "item_type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CatalogRef {
    /// A cartridge type from the cartridge catalog.
    Cartridge(CartridgeTypeId),
    /// A printer model from the printer catalog.
    Printer(PrinterModelId),
}

impl CatalogRef {
    /// The item type implied by this reference.
    #[must_use]
    pub const fn item_type(self) -> ItemType {
        match self {
            Self::Cartridge(_) => ItemType::Cartridge,
            Self::Printer(_) => ItemType::Printer,
        }
    }

    /// Cartridge type id, if this is a cartridge reference.
    #[must_use]
    pub const fn cartridge_type_id(self) -> Option<CartridgeTypeId> {
        match self {
            Self::Cartridge(id) => Some(id),
            Self::Printer(_) => None,
        }
    }

    /// Printer model id, if this is a printer reference.
    #[must_use]
    pub const fn printer_model_id(self) -> Option<PrinterModelId> {
        match self {
            Self::Cartridge(_) => None,
            Self::Printer(id) => Some(id),
        }
    }

    /// Rebuild a reference from its stored column form.
    ///
    /// Returns `None` when the columns do not describe exactly one reference
    /// matching `item_type`.
    #[must_use]
    pub const fn from_columns(
        item_type: ItemType,
        cartridge_type_id: Option<CartridgeTypeId>,
        printer_model_id: Option<PrinterModelId>,
    ) -> Option<Self> {
        match (item_type, cartridge_type_id, printer_model_id) {
            (ItemType::Cartridge, Some(id), None) => Some(Self::Cartridge(id)),
            (ItemType::Printer, None, Some(id)) => Some(Self::Printer(id)),
            _ => None,
        }
    }
}

impl std::fmt::Display for CatalogRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cartridge(id) => write!(f, "cartridge type #{id}"),
            Self::Printer(id) => write!(f, "printer model #{id}"),
        }
    }
}

/// Which fund a fund item's counters belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "scope", content = "company_id", rename_all = "snake_case")]
pub enum FundScope {
    /// Shared fund, available to every company.
    #[default]
    Global,
    /// Private fund of a single company.
    Company(CompanyId),
}

impl FundScope {
    /// The company id column value (`None` for the global fund).
    #[must_use]
    pub const fn company_id(self) -> Option<CompanyId> {
        match self {
            Self::Global => None,
            Self::Company(id) => Some(id),
        }
    }
}

impl From<Option<CompanyId>> for FundScope {
    fn from(company_id: Option<CompanyId>) -> Self {
        company_id.map_or(Self::Global, Self::Company)
    }
}

impl std::fmt::Display for FundScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Company(id) => write!(f, "company #{id}"),
        }
    }
}
