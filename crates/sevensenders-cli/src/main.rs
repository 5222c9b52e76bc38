use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use sevensenders_api::{ApiClient, SevenSendersApi};
use sevensenders_config::{Config, LogLevel, LoggingConfig};
use sevensenders_core::{
    ExportOutcome, Pipeline, ReconcileOutcome, Reporter, ScheduledRun, SkipReason,
    StatusChangeOutcome,
};
use sevensenders_store::{FileStore, OrderStore, STORE_FILE};
use sevensenders_types::{Order, OrderStatus};

#[derive(Parser, Debug)]
#[command(name = "sevensenders", version)]
#[command(about = "Sync shop orders and shipments with the Seven Senders tracking API")]
struct Cli {
    /// Path to the configuration file (default: nearest .sevensenders.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the order store file
    #[arg(long, global = true, default_value = STORE_FILE)]
    store: PathBuf,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the effective configuration and report missing settings.
    CheckConfig,
    /// List the carriers supported by the API.
    Carriers,
    /// Import orders from a JSON file (an array of orders).
    Import { file: PathBuf },
    /// Record the carrier and tracking code of an order.
    SetShipping {
        id: u64,
        #[arg(long)]
        carrier: String,
        #[arg(long)]
        tracking_code: String,
    },
    /// Apply an order status change and run the exports it triggers.
    StatusChanged { id: u64, status: OrderStatus },
    /// Export an order.
    ExportOrder { id: u64 },
    /// Export the shipment of an exported order.
    ExportShipment { id: u64 },
    /// Backfill delivery dates from the API.
    Reconcile,
    /// Reconcile if the configured schedule says it is due.
    RunScheduled {
        /// Run even if not due.
        #[arg(long)]
        force: bool,
    },
    /// Print the stored record of an order.
    Show { id: u64 },
}

struct CliReporter;

impl Reporter for CliReporter {
    fn info(&mut self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn warn(&mut self, msg: &str) {
        tracing::warn!("{msg}");
    }

    fn error(&mut self, msg: &str) {
        tracing::error!("{msg}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_path) = load_config(cli.config.as_deref())?;
    init_tracing(config.logging());

    let mut reporter = CliReporter;

    match cli.cmd {
        Commands::CheckConfig => run_check_config(&config, config_path.as_deref()),
        Commands::Carriers => {
            let missing = config.missing_required();
            if !missing.is_empty() {
                bail!("missing required settings: {}", missing.join(", "));
            }
            config.validate()?;
            let mut api = api_client(&config);
            let carriers = api.carriers().context("failed to fetch carriers")?;
            for carrier in carriers {
                println!(
                    "{}\t{}\t{}",
                    carrier.code,
                    carrier.name,
                    carrier.countries.join(",")
                );
            }
            Ok(())
        }
        Commands::Import { file } => {
            let mut store = FileStore::open(&cli.store)?;
            let count = import_orders(&file, &mut store)?;
            println!("imported {count} orders into {}", store.location());
            Ok(())
        }
        Commands::SetShipping {
            id,
            carrier,
            tracking_code,
        } => {
            let mut pipeline = pipeline(config, &cli.store)?;
            pipeline.record_shipping(id, &carrier, &tracking_code, &mut reporter)?;
            Ok(())
        }
        Commands::StatusChanged { id, status } => {
            let mut pipeline = pipeline(config, &cli.store)?;
            let outcome = pipeline.handle_status_change(id, status, &mut reporter)?;
            print_status_change(id, &outcome);
            for step in [outcome.order, outcome.shipment].into_iter().flatten() {
                check_outcome(&step)?;
            }
            Ok(())
        }
        Commands::ExportOrder { id } => {
            let mut pipeline = pipeline(config, &cli.store)?;
            let outcome = pipeline.export_order(id, &mut reporter)?;
            println!("order {id}: {outcome}");
            check_outcome(&outcome)
        }
        Commands::ExportShipment { id } => {
            let mut pipeline = pipeline(config, &cli.store)?;
            let outcome = pipeline.export_shipment(id, &mut reporter)?;
            println!("shipment {id}: {outcome}");
            check_outcome(&outcome)
        }
        Commands::Reconcile => {
            let mut pipeline = pipeline(config, &cli.store)?;
            let outcome = pipeline.reconcile(&mut reporter)?;
            print_reconcile(&outcome);
            check_reconcile(&outcome)
        }
        Commands::RunScheduled { force } => {
            let mut pipeline = pipeline(config, &cli.store)?;
            match pipeline.run_scheduled(force, &mut reporter)? {
                ScheduledRun::NotDue { next_run } => {
                    println!("not due until {}", next_run.to_rfc3339());
                    Ok(())
                }
                ScheduledRun::Ran(outcome) => {
                    print_reconcile(&outcome);
                    check_reconcile(&outcome)
                }
            }
        }
        Commands::Show { id } => {
            let store = FileStore::open(&cli.store)?;
            let Some(record) = store.get(id)? else {
                bail!("order {id} not found in {}", store.location());
            };
            println!("stage: {}", record.tracking.stage());
            println!(
                "{}",
                serde_json::to_string_pretty(&record).context("failed to serialize record")?
            );
            Ok(())
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter_directive()));
    let toggles = logging.clone();
    let output = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_ansi(false)
        .with_filter(filter_fn(move |meta| toggles.allows(log_level(meta.level()))));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init();
}

fn log_level(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warn,
        Level::INFO => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

/// Load the config file and apply the environment access key override.
fn load_config(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            Some(path.to_path_buf())
        }
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            sevensenders_config::find_config(&cwd)
        }
    };

    let config = match &path {
        Some(path) => sevensenders_config::load_config_from_file(path)?,
        None => Config::default(),
    };
    let key = sevensenders_config::resolve_access_key(&config);
    Ok((config.with_access_key(key.key), path))
}

fn api_client(config: &Config) -> ApiClient {
    ApiClient::new(
        config.api_base_url().unwrap_or_default(),
        config.access_key().unwrap_or_default(),
    )
    .with_timeout(config.request_timeout())
    .with_reauth_policy(config.reauth_policy().clone())
    .with_carrier_ttl(config.carrier_cache_ttl())
}

fn pipeline(config: Config, store_path: &Path) -> Result<Pipeline<ApiClient, FileStore>> {
    config.validate()?;
    let store = FileStore::open(store_path)?;
    let api = api_client(&config);
    Ok(Pipeline::new(config, api, store))
}

fn import_orders(file: &Path, store: &mut dyn OrderStore) -> Result<usize> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read orders file {}", file.display()))?;
    let orders: Vec<Order> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse orders file {}", file.display()))?;

    let count = orders.len();
    for order in orders {
        store.upsert_order(order)?;
    }
    Ok(count)
}

fn run_check_config(config: &Config, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => println!("config: {}", path.display()),
        None => println!("config: <defaults>"),
    }
    let key = sevensenders_config::resolve_access_key(config);
    println!("api.base_url: {}", config.api_base_url().unwrap_or("<missing>"));
    println!("api.access_key: {}", if key.key.is_some() { "<set>" } else { "<missing>" });
    println!("api.access_key_source: {}", key.source);
    println!(
        "tracking.page_base_url: {}",
        config.tracking_page_base_url().unwrap_or("<missing>")
    );
    println!("delivery.enabled: {}", config.delivery_tracking_enabled());
    println!("delivery.schedule: {}", config.schedule());
    println!("reauth.max_attempts: {}", config.reauth_policy().max_attempts);

    let missing = config.missing_required();
    if !missing.is_empty() {
        bail!("missing required settings: {}", missing.join(", "));
    }
    config.validate()?;
    println!("ok");
    Ok(())
}

fn print_status_change(id: u64, outcome: &StatusChangeOutcome) {
    match (&outcome.order, &outcome.shipment) {
        (None, None) => println!("order {id}: no export triggered"),
        (order, shipment) => {
            if let Some(order) = order {
                println!("order {id}: {order}");
            }
            if let Some(shipment) = shipment {
                println!("shipment {id}: {shipment}");
            }
        }
    }
}

fn print_reconcile(outcome: &ReconcileOutcome) {
    println!("reconcile: {outcome}");
}

/// Failures and configuration problems exit non-zero; ordinary skips do not.
fn check_outcome(outcome: &ExportOutcome) -> Result<()> {
    match outcome {
        ExportOutcome::Failed(reason) => bail!("{reason}"),
        ExportOutcome::Skipped(
            reason @ (SkipReason::MissingSettings(_)
            | SkipReason::InvalidSettings(_)
            | SkipReason::UnknownOrder(_)),
        ) => bail!("{reason}"),
        _ => Ok(()),
    }
}

fn check_reconcile(outcome: &ReconcileOutcome) -> Result<()> {
    match outcome {
        ReconcileOutcome::Failed(reason) => bail!("{reason}"),
        ReconcileOutcome::Skipped(reason) => bail!("{reason}"),
        _ => Ok(()),
    }
}
