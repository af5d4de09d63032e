//! Core types for Tonerdesk.
//!
//! This module provides type-safe wrappers for the replacement-fund domain.

pub mod catalog;
pub mod id;
pub mod movement;

pub use catalog::{CatalogRef, FundScope, ItemType};
pub use id::*;
pub use movement::{LedgerOperation, MovementType, ParseKindError};
