//! Tonerdesk CLI - Replacement fund operations and reports.
//!
//! # Usage
//!
//! ```bash
//! # Run fund database migrations
//! tonerdesk migrate
//!
//! # Provision a cartridge position with opening stock
//! tonerdesk provision --cartridge 12 --quantity 10 --actor 1
//!
//! # Issue two units for ticket 55
//! tonerdesk operation issue 3 2 --actor 7 --ticket 55
//!
//! # Record a physical count and correct the books
//! tonerdesk inventory 3 18 --actor 7 --correct
//!
//! # Items whose count disagrees with the books, as JSON
//! tonerdesk --json items --all --discrepancies
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run fund database migrations
//! - `provision` - Create a fund item
//! - `seed` - Provision fund items from a YAML file
//! - `operation` - Issue, return, write off or receive stock
//! - `inventory` - Record a physical count
//! - `items` - List fund items
//! - `movements` - Show the movement log
//! - `audit` - Replay an item's movements against its counters

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use uuid::Uuid;

use tonerdesk_core::{
    CartridgeTypeId, CompanyId, FundItemId, ItemType, LedgerOperation, MovementType,
    PrinterModelId, TicketId, UserId,
};
use tonerdesk_fund::FundConfig;
use tonerdesk_fund::models::{Counters, FundItemFilter, MovementFilter, ScopeFilter};
use tonerdesk_fund::services::{InventoryCount, OperationRequest};
use tonerdesk_fund::telemetry;

mod commands;

#[derive(Parser)]
#[command(name = "tonerdesk")]
#[command(author, version, about = "Tonerdesk replacement fund tools")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run fund database migrations
    Migrate,
    #[command(flatten)]
    Fund(FundCommand),
}

/// Commands that need a connected fund.
#[derive(Subcommand)]
enum FundCommand {
    /// Create a fund item, optionally with opening stock
    Provision {
        /// Cartridge type to stock
        #[arg(long, conflicts_with = "printer", required_unless_present = "printer")]
        cartridge: Option<CartridgeTypeId>,

        /// Printer model to stock
        #[arg(long)]
        printer: Option<PrinterModelId>,

        /// Company whose private fund this is (global fund when omitted)
        #[arg(long)]
        company: Option<CompanyId>,

        /// Opening stock, recorded as a RECEIVE
        #[arg(short, long, default_value_t = 0)]
        quantity: i32,

        /// Acting user
        #[arg(short, long)]
        actor: UserId,
    },
    /// Provision fund items listed in a YAML file
    Seed {
        /// Path to the YAML file
        file: String,

        /// Acting user
        #[arg(short, long)]
        actor: UserId,
    },
    /// Issue, return, write off or receive stock
    Operation {
        /// `issue`, `return`, `write-off` or `receive`
        operation: String,

        /// Fund item
        item: FundItemId,

        /// Units
        quantity: i32,

        /// Acting user
        #[arg(short, long)]
        actor: UserId,

        /// Ticket the operation belongs to
        #[arg(short, long)]
        ticket: Option<TicketId>,

        /// Free-text comment
        #[arg(short, long)]
        comment: Option<String>,

        /// Key that makes the request safe to resend
        #[arg(long)]
        idempotency_key: Option<Uuid>,
    },
    /// Record a physical count
    Inventory {
        /// Fund item
        item: FundItemId,

        /// Units found on the shelf
        actual: i32,

        /// Acting user
        #[arg(short, long)]
        actor: UserId,

        /// Also set the book quantity to the count
        #[arg(long)]
        correct: bool,

        /// Free-text comment
        #[arg(short, long)]
        comment: Option<String>,

        /// Key that makes the request safe to resend
        #[arg(long)]
        idempotency_key: Option<Uuid>,
    },
    /// List fund items
    Items {
        /// Only this company's private fund
        #[arg(long, conflicts_with = "all")]
        company: Option<CompanyId>,

        /// Every fund, global and private
        #[arg(long)]
        all: bool,

        /// `cartridge` or `printer`
        #[arg(long)]
        item_type: Option<ItemType>,

        /// Only items whose count disagrees with the books
        #[arg(long)]
        discrepancies: bool,
    },
    /// Show the movement log, newest first
    Movements {
        /// Only this fund item
        #[arg(long)]
        item: Option<FundItemId>,

        /// Only this movement type
        #[arg(long)]
        movement_type: Option<String>,

        /// Maximum rows (1-1000)
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Replay a fund item's movements and compare with its counters
    Audit {
        /// Fund item
        item: FundItemId,

        /// Available quantity before the first movement
        #[arg(long, default_value_t = 0)]
        opening_available: i32,

        /// Reserved quantity before the first movement
        #[arg(long, default_value_t = 0)]
        opening_reserved: i32,
    },
}

#[tokio::main]
#[allow(clippy::print_stderr)] // tracing is not set up until the config is loaded
async fn main() {
    let cli = Cli::parse();

    let config = match FundConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = telemetry::init_sentry(&config.sentry);
    telemetry::init_tracing(config.log_json, telemetry::DEFAULT_LOG_FILTER);

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, &config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &FundConfig) -> Result<(), Box<dyn std::error::Error>> {
    let out = commands::Output { json: cli.json };

    let command = match cli.command {
        Commands::Migrate => return commands::migrate::run(config).await,
        Commands::Fund(command) => command,
    };

    let fund = tonerdesk_fund::FundServices::connect(config).await?;

    match command {
        FundCommand::Provision {
            cartridge,
            printer,
            company,
            quantity,
            actor,
        } => {
            let catalog_ref = commands::fund::catalog_ref(cartridge, printer)?;
            commands::fund::provision(&fund, out, catalog_ref, company, quantity, actor).await?;
        }
        FundCommand::Seed { file, actor } => {
            commands::seed::fund_items(&fund, out, &file, actor).await?;
        }
        FundCommand::Operation {
            operation,
            item,
            quantity,
            actor,
            ticket,
            comment,
            idempotency_key,
        } => {
            let operation = operation.parse::<LedgerOperation>()?;
            let mut request = OperationRequest::new(item, operation, quantity, actor);
            request.ticket_id = ticket;
            request.comment = comment;
            request.idempotency_key = idempotency_key;
            commands::fund::operation(&fund, out, request).await?;
        }
        FundCommand::Inventory {
            item,
            actual,
            actor,
            correct,
            comment,
            idempotency_key,
        } => {
            let mut count = InventoryCount::new(item, actual, actor);
            count.correct_accounting = correct;
            count.comment = comment;
            count.idempotency_key = idempotency_key;
            commands::fund::inventory(&fund, out, count).await?;
        }
        FundCommand::Items {
            company,
            all,
            item_type,
            discrepancies,
        } => {
            let scope = match (company, all) {
                (Some(id), _) => ScopeFilter::Company(id),
                (None, true) => ScopeFilter::All,
                (None, false) => ScopeFilter::Global,
            };
            let filter = FundItemFilter {
                scope,
                item_type,
                discrepancies_only: discrepancies,
            };
            commands::report::items(&fund, out, &filter).await?;
        }
        FundCommand::Movements {
            item,
            movement_type,
            limit,
        } => {
            let filter = MovementFilter {
                fund_item_id: item,
                movement_type: movement_type
                    .map(|t| t.parse::<MovementType>())
                    .transpose()?,
                limit,
            };
            commands::report::movements(&fund, out, &filter).await?;
        }
        FundCommand::Audit {
            item,
            opening_available,
            opening_reserved,
        } => {
            let opening = Counters {
                available: opening_available,
                reserved: opening_reserved,
            };
            commands::report::audit(&fund, out, item, opening).await?;
        }
    }
    Ok(())
}
