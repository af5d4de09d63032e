//! CLI command implementations.

pub mod fund;
pub mod migrate;
pub mod report;
pub mod seed;

use serde::Serialize;

/// How command results are printed.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    /// Pretty JSON instead of text.
    pub json: bool,
}

impl Output {
    /// Print `value` as JSON, or the text produced by `human`.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if `value` cannot be serialized.
    #[allow(clippy::print_stdout)]
    pub fn emit<T, F>(self, value: &T, human: F) -> Result<(), serde_json::Error>
    where
        T: Serialize + ?Sized,
        F: FnOnce() -> String,
    {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", human());
        }
        Ok(())
    }
}
