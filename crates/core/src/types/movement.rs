//! Movement kinds recorded in the fund audit log.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a kind name (item type, movement type) is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseKindError {
    kind: &'static str,
    value: String,
}

impl ParseKindError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Type of a movement in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "fund.movement_type", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Stock handed out against a ticket (available -> reserved).
    Issue,
    /// Issued stock brought back (reserved -> available).
    Return,
    /// Stock permanently removed from the fund.
    WriteOff,
    /// New stock entering the fund.
    Receive,
    /// Physical count recorded against the book quantity.
    Inventory,
}

impl MovementType {
    /// Canonical upper-case name, as stored and as accepted by [`str::parse`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Issue => "ISSUE",
            Self::Return => "RETURN",
            Self::WriteOff => "WRITE_OFF",
            Self::Receive => "RECEIVE",
            Self::Inventory => "INVENTORY",
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MovementType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "ISSUE" => Ok(Self::Issue),
            "RETURN" => Ok(Self::Return),
            "WRITE_OFF" => Ok(Self::WriteOff),
            "RECEIVE" => Ok(Self::Receive),
            "INVENTORY" => Ok(Self::Inventory),
            _ => Err(ParseKindError::new("movement type", s)),
        }
    }
}

/// The four counter operations the ledger engine executes.
///
/// `INVENTORY` is absent: physical counts go through the
/// reconciler, which records counts rather than deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerOperation {
    /// Requires `available >= q`; moves `q` from available to reserved.
    Issue,
    /// Requires `reserved >= q`; moves `q` from reserved to available.
    Return,
    /// Requires `available >= q`; removes `q` from available.
    WriteOff,
    /// Adds `q` to available.
    Receive,
}

impl LedgerOperation {
    /// All operations, in display order.
    pub const ALL: [Self; 4] = [Self::Issue, Self::Return, Self::WriteOff, Self::Receive];

    /// Movement type written to the audit log for this operation.
    #[must_use]
    pub const fn movement_type(self) -> MovementType {
        match self {
            Self::Issue => MovementType::Issue,
            Self::Return => MovementType::Return,
            Self::WriteOff => MovementType::WriteOff,
            Self::Receive => MovementType::Receive,
        }
    }
}

impl std::fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.movement_type().as_str())
    }
}

impl TryFrom<MovementType> for LedgerOperation {
    type Error = ParseKindError;

    fn try_from(value: MovementType) -> Result<Self, Self::Error> {
        match value {
            MovementType::Issue => Ok(Self::Issue),
            MovementType::Return => Ok(Self::Return),
            MovementType::WriteOff => Ok(Self::WriteOff),
            MovementType::Receive => Ok(Self::Receive),
            MovementType::Inventory => Err(ParseKindError::new("ledger operation", value.as_str())),
        }
    }
}

impl std::str::FromStr for LedgerOperation {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let movement: MovementType = s
            .parse()
            .map_err(|_| ParseKindError::new("ledger operation", s))?;
        Self::try_from(movement)
    }
}

/// Accepts `write-off`, `write_off` and `WRITE_OFF` alike.
fn normalize(s: &str) -> String {
    s.trim().replace('-', "_").to_ascii_uppercase()
}
