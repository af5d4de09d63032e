//! Tonerdesk replacement fund.
//!
//! A ledger of spare cartridges and printers kept for helpdesk tickets. Stock
//! is issued to a ticket, returned, written off or received, and every change
//! is recorded as an immutable movement. Physical counts can be reconciled
//! against the book quantity.
//!
//! # Layout
//!
//! - [`store`] - `FundStore` trait and the in-memory store
//! - [`db`] - `PostgreSQL` store, pool and migrations
//! - [`services`] - Ledger engine, inventory reconciler and queries
//! - [`state`] - `FundServices`, built once per process
//! - [`config`], [`telemetry`], [`retry`], [`error`]
//!
//! # Example
//!
//! ```rust,ignore
//! let config = FundConfig::from_env()?;
//! let fund = FundServices::connect(&config).await?;
//! fund.ledger()
//!     .issue(item_id, 1, actor, Some(ticket_id))
//!     .await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod retry;
pub mod services;
pub mod state;
pub mod store;
pub mod telemetry;

pub use config::FundConfig;
pub use error::FundError;
pub use state::FundServices;
pub use store::{FundStore, MemoryFundStore};
