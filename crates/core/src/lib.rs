//! Tonerdesk Core - Shared types for the replacement-fund ledger.
//!
//! This crate provides the types shared by every Tonerdesk component:
//! - `fund` - Replacement-fund stores and services (ledger, reconciliation, queries)
//! - `cli` - Operator tooling for migrations, provisioning and reports
//! - the chat bot and web admin processes that embed the `fund` library
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access. With the
//! `postgres` feature enabled, ids and enums also implement the `sqlx`
//! encoding traits so repositories can bind them directly.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, item and movement kinds, scopes and catalog references

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
