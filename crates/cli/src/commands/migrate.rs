//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! tonerdesk migrate
//! ```
//!
//! # Environment Variables
//!
//! - `FUND_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)

use tracing::info;

use tonerdesk_fund::FundConfig;
use tonerdesk_fund::db;

/// Run the embedded fund migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run(config: &FundConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to fund database...");
    let pool = db::create_pool(&config.database).await?;

    info!("Running fund migrations...");
    db::migrate(&pool).await?;

    info!("Fund migrations complete!");
    Ok(())
}
