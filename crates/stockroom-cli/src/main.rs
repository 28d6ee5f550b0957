//! Stockroom CLI
//!
//! Command-line interface for Stockroom - inventory, sales and purchases.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stockroom_core::{Config, Identity, InventoryError, ReportKind, Store};

mod commands;
mod output;

use commands::product::{list_query, ProductFields};
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "stockroom")]
#[command(about = "Stockroom - local-first inventory, sales and purchases")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up this device's user ID
    Init {
        /// Create a new user ID (skip interactive prompt)
        #[arg(long, conflicts_with = "join")]
        new: bool,
        /// Join an existing user ID (UUID, document ID or automerge URL)
        #[arg(long, conflicts_with = "new")]
        join: Option<String>,
    },
    /// Device identity management
    Device {
        #[command(subcommand)]
        command: Option<DeviceCommands>,
    },
    /// Manage products
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },
    /// Record and list sales
    Sale {
        #[command(subcommand)]
        command: SaleCommands,
    },
    /// Record and list purchases
    Purchase {
        #[command(subcommand)]
        command: PurchaseCommands,
    },
    /// Stats, low-stock alerts and recent sales
    Dashboard,
    /// Run a report
    Report {
        /// sales, purchases, inventory, top-selling or profitability
        kind: ReportKind,
        /// First day included (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day included (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Print a collection and reprint it whenever it changes
    Watch {
        /// products, sales or purchases
        collection: String,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Show status (user ID, sync status, counts)
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Sync with remote server
    Sync,
}

#[derive(Subcommand, Clone)]
enum DeviceCommands {
    /// Show the user ID
    Show,
}

#[derive(clap::Args, Clone, Debug, Default)]
struct ListArgs {
    /// Field to sort by (camelCase, e.g. price, stockQuantity, saleDate)
    #[arg(long)]
    sort: Option<String>,
    /// Sort ascending instead of descending
    #[arg(long, requires = "sort")]
    asc: bool,
    /// Maximum number of rows
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Subcommand)]
enum ProductCommands {
    /// Create a product
    #[command(alias = "create")]
    Add {
        #[command(flatten)]
        fields: ProductFields,
    },
    /// List products
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        list: ListArgs,
    },
    /// Show product details
    Show {
        /// Product ID (full UUID or prefix)
        id: String,
    },
    /// Change product fields
    Edit {
        /// Product ID (full UUID or prefix)
        id: String,
        #[command(flatten)]
        fields: ProductFields,
    },
    /// Delete a product
    #[command(alias = "rm")]
    Delete {
        /// Product ID (full UUID or prefix)
        id: String,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SaleCommands {
    /// Record a sale
    Record {
        /// Product ID (full UUID or prefix)
        product: String,
        /// Units sold
        quantity: i64,
    },
    /// List sales
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        list: ListArgs,
    },
    /// Delete a sale and return its units to stock
    #[command(alias = "rm")]
    Delete {
        /// Sale ID (full UUID or prefix)
        id: String,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum PurchaseCommands {
    /// Record a purchase
    Record {
        /// Product ID (full UUID or prefix)
        product: String,
        /// Units bought
        quantity: i64,
        /// Cost paid per unit
        unit_cost: f64,
    },
    /// List purchases
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        list: ListArgs,
    },
    /// Delete a purchase and take its units out of stock
    #[command(alias = "rm")]
    Delete {
        /// Purchase ID (full UUID or prefix)
        id: String,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, sync_url, sync_enabled, currency, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    if let Err(e) = run(cli, output).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// 2 for mistakes the user can correct (bad input, unknown product, not
/// enough stock), 1 for everything else
fn exit_code(err: &anyhow::Error) -> i32 {
    let user_error = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<InventoryError>())
        .any(InventoryError::is_user_error);
    if user_error {
        2
    } else {
        1
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    let config_path = cli.config.as_ref();

    // Commands that don't need the store
    match &cli.command {
        Commands::Config { command } => {
            return handle_config_command(command.clone(), config_path, &output);
        }
        Commands::Init { new, join } => {
            let config = load_config(config_path)?;
            return commands::identity::init(config, *new, join.clone(), &output);
        }
        Commands::Device { .. } => {
            let config = load_config(config_path)?;
            return commands::identity::show_device(config, &output);
        }
        _ => {}
    }

    let config = load_config(config_path)?;
    init_logging(&config);
    let output = output.with_currency(config.currency.clone());

    let user_id = Identity::with_config(config.clone())
        .load_or_create()
        .context("Failed to load user ID")?;
    let mut store = Store::open_with_config(config, user_id)?;

    let is_write = matches!(
        &cli.command,
        Commands::Product {
            command: ProductCommands::Add { .. }
                | ProductCommands::Edit { .. }
                | ProductCommands::Delete { .. }
        } | Commands::Sale {
            command: SaleCommands::Record { .. } | SaleCommands::Delete { .. }
        } | Commands::Purchase {
            command: PurchaseCommands::Record { .. } | PurchaseCommands::Delete { .. }
        }
    );
    let syncs_itself = matches!(&cli.command, Commands::Sync | Commands::Watch { .. });

    // Sync before read commands (to get latest data)
    if !is_write && !syncs_itself {
        auto_sync(&mut store, &output).await;
    }

    let result = match cli.command {
        Commands::Config { .. } | Commands::Init { .. } | Commands::Device { .. } => {
            unreachable!("handled before opening the store")
        }
        Commands::Product { command } => handle_product_command(command, &mut store, &output),
        Commands::Sale { command } => handle_sale_command(command, &mut store, &output),
        Commands::Purchase { command } => handle_purchase_command(command, &mut store, &output),
        Commands::Dashboard => commands::dashboard::show(&store, &output),
        Commands::Report { kind, from, to } => {
            commands::report::show(&store, kind, from, to, &output)
        }
        Commands::Watch { collection, list } => {
            let collection = commands::watch::parse_collection(&collection)?;
            let query = list_query(collection, list.sort, list.asc, list.limit);
            commands::watch::watch(&mut store, query, &output).await
        }
        Commands::Status => commands::status::show(&store, &output),
        Commands::Sync => commands::sync::sync(&mut store, &output).await,
    };

    // Sync after write commands (to push changes)
    if is_write && result.is_ok() {
        auto_sync(&mut store, &output).await;
    }

    result
}

fn load_config(config_path: Option<&PathBuf>) -> Result<Config> {
    Config::load_with_cli_override(config_path).context("Failed to load configuration")
}

fn handle_product_command(
    command: ProductCommands,
    store: &mut Store,
    output: &Output,
) -> Result<()> {
    match command {
        ProductCommands::Add { fields } => commands::product::add(store, fields, output),
        ProductCommands::List { list } => {
            commands::product::list(store, list.sort, list.asc, list.limit, output)
        }
        ProductCommands::Show { id } => commands::product::show(store, id, output),
        ProductCommands::Edit { id, fields } => commands::product::edit(store, id, fields, output),
        ProductCommands::Delete { id, yes } => commands::product::delete(store, id, yes, output),
    }
}

fn handle_sale_command(command: SaleCommands, store: &mut Store, output: &Output) -> Result<()> {
    match command {
        SaleCommands::Record { product, quantity } => {
            commands::sale::record(store, product, quantity, output)
        }
        SaleCommands::List { list } => {
            commands::sale::list(store, list.sort, list.asc, list.limit, output)
        }
        SaleCommands::Delete { id, yes } => commands::sale::delete(store, id, yes, output),
    }
}

fn handle_purchase_command(
    command: PurchaseCommands,
    store: &mut Store,
    output: &Output,
) -> Result<()> {
    match command {
        PurchaseCommands::Record {
            product,
            quantity,
            unit_cost,
        } => commands::purchase::record(store, product, quantity, unit_cost, output),
        PurchaseCommands::List { list } => {
            commands::purchase::list(store, list.sort, list.asc, list.limit, output)
        }
        PurchaseCommands::Delete { id, yes } => commands::purchase::delete(store, id, yes, output),
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Log to a file when STOCKROOM_LOG names a level
///
/// stdout carries command output, so logs never go to the terminal.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("STOCKROOM_LOG") else {
        return;
    };

    let log_path = config.log_path();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::new(format!(
        "stockroom_core={},stockroom_cli={}",
        log_level, log_level
    ));

    // Ignore the error if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("Logging to {:?}", log_path);
}

/// Auto-sync if sync is enabled, silently handles errors
async fn auto_sync(store: &mut Store, output: &Output) {
    if let Err(e) = commands::sync::sync_quiet(store).await {
        if !output.is_quiet() {
            eprintln!("⚠ Auto-sync failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use stockroom_core::Collection;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_product_list_flags() {
        let cli = Cli::try_parse_from([
            "stockroom", "--json", "product", "list", "--sort", "price", "--asc", "--limit", "5",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Product {
                command: ProductCommands::List { list },
            } => {
                assert_eq!(list.sort.as_deref(), Some("price"));
                assert!(list.asc);
                assert_eq!(list.limit, Some(5));
            }
            _ => panic!("expected product list"),
        }
    }

    #[test]
    fn test_parse_report_dates() {
        let cli = Cli::try_parse_from([
            "stockroom", "report", "top-selling", "--from", "2024-01-01", "--to", "2024-01-31",
        ])
        .unwrap();
        match cli.command {
            Commands::Report { kind, from, to } => {
                assert_eq!(kind, ReportKind::TopSelling);
                assert_eq!(from, NaiveDate::from_ymd_opt(2024, 1, 1));
                assert_eq!(to, NaiveDate::from_ymd_opt(2024, 1, 31));
            }
            _ => panic!("expected report"),
        }
    }

    #[test]
    fn test_exit_code_separates_user_errors() {
        let insufficient = anyhow::Error::from(InventoryError::InsufficientStock {
            available: 2,
            requested: 5,
        });
        assert_eq!(exit_code(&insufficient), 2);

        let wrapped = anyhow::Error::from(InventoryError::ProductNotFound(uuid::Uuid::new_v4()))
            .context("Failed to record sale");
        assert_eq!(exit_code(&wrapped), 2);

        let storage = anyhow::anyhow!("disk on fire");
        assert_eq!(exit_code(&storage), 1);
    }

    #[test]
    fn test_rejects_unknown_report() {
        assert!(Cli::try_parse_from(["stockroom", "report", "weekly"]).is_err());
    }

    #[test]
    fn test_parse_purchase_record() {
        let cli =
            Cli::try_parse_from(["stockroom", "purchase", "record", "ab12", "6", "4.25"]).unwrap();
        match cli.command {
            Commands::Purchase {
                command:
                    PurchaseCommands::Record {
                        product,
                        quantity,
                        unit_cost,
                    },
            } => {
                assert_eq!(product, "ab12");
                assert_eq!(quantity, 6);
                assert_eq!(unit_cost, 4.25);
            }
            _ => panic!("expected purchase record"),
        }
    }

    #[test]
    fn test_collection_names_match_watch() {
        for collection in Collection::ALL {
            assert_eq!(
                commands::watch::parse_collection(collection.name()).unwrap(),
                collection
            );
        }
    }
}
