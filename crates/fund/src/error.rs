//! Unified error handling for the replacement fund.

use std::time::Duration;

use thiserror::Error;

use tonerdesk_core::{FundItemId, UserId};

use crate::db::RepositoryError;

/// Which counter an operation needed more of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// `quantity_available`
    Available,
    /// `quantity_reserved`
    Reserved,
}

impl std::fmt::Display for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => f.write_str("available"),
            Self::Reserved => f.write_str("reserved"),
        }
    }
}

/// Error returned by the ledger, reconciler and query services.
#[derive(Debug, Error)]
pub enum FundError {
    /// Rejected before any transaction was opened.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The fund item does not exist.
    #[error("Fund item {0} not found")]
    NotFound(FundItemId),

    /// Not enough stock on the counter the operation draws from.
    #[error(
        "Insufficient {counter} quantity on fund item {fund_item_id}: requested {requested}, on hand {on_hand}"
    )]
    PreconditionFailed {
        fund_item_id: FundItemId,
        counter: Counter,
        requested: i32,
        on_hand: i32,
    },

    /// Idempotency key reused for a different operation, or duplicate provisioning.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store stayed busy for every retry attempt.
    #[error("Storage contention after {attempts} attempts: {source}")]
    StorageContention {
        attempts: u32,
        #[source]
        source: RepositoryError,
    },

    /// The operation did not finish in time and was rolled back.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Non-transient persistence failure.
    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),
}

impl FundError {
    /// Whether the same call may succeed if the store is retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Storage(err) => err.is_transient(),
            Self::StorageContention { .. } | Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Short machine-friendly name of the error kind, for log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::PreconditionFailed { .. } => "precondition_failed",
            Self::Conflict(_) => "conflict",
            Self::StorageContention { .. } => "storage_contention",
            Self::Timeout(_) => "timeout",
            Self::Storage(_) => "storage",
        }
    }

    /// Message suitable for showing to the bot user or admin operator.
    ///
    /// Caller mistakes get an actionable description; infrastructure
    /// failures get a generic text so internal details are not exposed.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidArgument(_) | Self::Conflict(_) => self.to_string(),
            Self::NotFound(id) => format!("Fund item #{id} does not exist."),
            Self::PreconditionFailed {
                counter,
                requested,
                on_hand,
                ..
            } => format!("Not enough {counter} stock: requested {requested}, only {on_hand} on hand."),
            Self::StorageContention { .. } | Self::Timeout(_) => {
                "The fund is busy right now. Please try again in a moment.".to_string()
            }
            Self::Storage(_) => "System error while updating the fund. Please try again later.".to_string(),
        }
    }

    /// Whether the failure is an infrastructure problem worth an error report
    /// (as opposed to a rejected request).
    #[must_use]
    pub const fn is_system_failure(&self) -> bool {
        matches!(
            self,
            Self::StorageContention { .. } | Self::Timeout(_) | Self::Storage(_)
        )
    }
}

/// Identifies a failed call in the failure log.
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    /// Operation name (`issue`, `inventory`, ...).
    pub operation: &'a str,
    /// Fund item the call targeted.
    pub fund_item_id: FundItemId,
    /// Requested or counted quantity.
    pub quantity: i32,
    /// Actor who made the call.
    pub actor: UserId,
}

impl FundError {
    /// Record a failed call.
    ///
    /// Rejections are logged as warnings. System failures are also sent to
    /// Sentry and the event id is logged with them.
    pub fn log_failure(&self, ctx: &FailureContext<'_>) {
        if self.is_system_failure() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                kind = self.kind(),
                operation = ctx.operation,
                fund_item_id = %ctx.fund_item_id,
                quantity = ctx.quantity,
                actor = %ctx.actor,
                sentry_event_id = %event_id,
                "Fund operation failed"
            );
        } else {
            tracing::warn!(
                error = %self,
                kind = self.kind(),
                operation = ctx.operation,
                fund_item_id = %ctx.fund_item_id,
                quantity = ctx.quantity,
                actor = %ctx.actor,
                "Fund operation rejected"
            );
        }
    }
}

impl From<sqlx::Error> for FundError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(RepositoryError::from(err))
    }
}
