//! Domain models for the replacement fund.

pub mod fund;

pub use fund::*;
