//! Additive schema reconciliation across many databases.
//!
//! This binary loads `schemasync.toml`, connects to one MySQL/MariaDB or
//! PostgreSQL server, discovers the target databases and ensures every
//! configured table and column exists in each of them.
//!
//! # Exit Status
//! Non-zero when the configuration is invalid, the server cannot be reached,
//! or discovery yields no databases. Per-object failures are reported but
//! do not change the exit status.

mod output;
mod prompt;

use clap::{Args, Parser, Subcommand, ValueEnum};
use schemasync_core::{
    ConnectionErrorKind, DatabaseDriver, Result, SchemaSyncError, StrategyKind, SyncConfig,
    adapters::create_driver,
    config::ServerCredentials,
    discovery::{self, Discovered},
    logging::{LogFormat, init_logging},
    reconcile::Reconciler,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "schemasync.toml";

#[derive(Parser, Debug)]
#[command(name = "schemasync")]
#[command(about = "Additive schema reconciliation across many databases")]
#[command(version)]
#[command(long_about = "
schemasync - idempotent, additive schema reconciliation

For every target database on one server, schemasync checks that the
configured tables and columns exist and creates only what is missing.
Nothing is ever dropped, renamed or rewritten.

DISCOVERY STRATEGIES:
- file             names listed in a newline-delimited file
- reference-table  every database containing a given table
- all              every non-system database on the server

SUPPORTED DATABASES:
- MySQL / MariaDB (mysql://, mariadb://)
- PostgreSQL (postgres://, postgresql://)

EXAMPLES:
  schemasync test --database-url mysql://admin@localhost:3306
  schemasync discover --strategy reference-table --reference-table chatbot_setup
  schemasync run --config schemasync.toml --output report.json
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile tables and columns in every target database
    Run(RunArgs),
    /// Resolve and print the target databases without changing anything
    Discover(DiscoverArgs),
    /// Test the server connection
    Test(TargetArgs),
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogStyle::Text)]
    pub log_format: LogStyle,

    /// Prompt for the database password
    #[arg(long, global = true, help = "Prompt for the database password instead of reading it from config or environment")]
    pub ask_password: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Configuration file
    #[arg(
        short,
        long,
        env = "SCHEMASYNC_CONFIG",
        help = "Configuration file (default: ./schemasync.toml if present)"
    )]
    pub config: Option<PathBuf>,

    /// Database connection URL
    #[arg(
        long,
        env = "DATABASE_URL",
        help = "Server connection string, overrides [server] (credentials are redacted in logs)"
    )]
    pub database_url: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DiscoveryArgs {
    /// Discovery strategy
    #[arg(long, help = "Discovery strategy: file, reference-table or all")]
    pub strategy: Option<StrategyKind>,

    /// Database list file
    #[arg(long, help = "Newline-delimited database list (implies --strategy file)")]
    pub db_list: Option<PathBuf>,

    /// Reference table
    #[arg(long, help = "Table whose presence marks a target database (implies --strategy reference-table)")]
    pub reference_table: Option<String>,

    /// Fallback strategy
    #[arg(long, help = "Strategy to try when the primary strategy fails")]
    pub fallback: Option<StrategyKind>,
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Databases processed at once
    #[arg(long, help = "Databases processed concurrently (default: [run] max_concurrency, 1 = sequential)")]
    pub concurrency: Option<usize>,

    /// Report file
    #[arg(short, long, help = "Also write the JSON report to this file")]
    pub output: Option<PathBuf>,

    /// Summary format on stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    Text,
    Json,
}

impl From<LogStyle> for LogFormat {
    fn from(style: LogStyle) -> Self {
        match style {
            LogStyle::Text => Self::Text,
            LogStyle::Json => Self::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format.into())?;

    match &cli.command {
        Command::Run(args) => run(args, &cli.global).await,
        Command::Discover(args) => discover(args, &cli.global).await,
        Command::Test(args) => test_connection(args, &cli.global).await,
    }
}

/// Loads the config file (if any) and applies command-line overrides.
fn load_config(target: &TargetArgs, discovery: Option<&DiscoveryArgs>) -> Result<SyncConfig> {
    let mut config = match &target.config {
        Some(path) => SyncConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => SyncConfig::load(Path::new(DEFAULT_CONFIG))?,
        None => SyncConfig::default(),
    };

    if let Some(url) = &target.database_url {
        config = config.with_database_url(url.clone());
    }

    if let Some(args) = discovery {
        apply_discovery_overrides(&mut config, args)?;
    }

    Ok(config)
}

fn apply_discovery_overrides(config: &mut SyncConfig, args: &DiscoveryArgs) -> Result<()> {
    if let Some(path) = &args.db_list {
        let absolute = std::path::absolute(path).map_err(|e| SchemaSyncError::Io {
            context: format!("Failed to resolve {}", path.display()),
            source: e,
        })?;
        config.discovery.database_list = Some(absolute);
    }
    if let Some(table) = &args.reference_table {
        config.discovery.reference_table = Some(table.clone());
    }
    if let Some(fallback) = args.fallback {
        config.discovery.fallback = Some(fallback);
    }

    config.discovery.strategy = match (args.strategy, &args.db_list, &args.reference_table) {
        (Some(kind), _, _) => Some(kind),
        (None, Some(_), None) => Some(StrategyKind::File),
        (None, None, Some(_)) => Some(StrategyKind::ReferenceTable),
        (None, _, _) => config.discovery.strategy,
    };

    Ok(())
}

fn credentials(config: &SyncConfig, global: &GlobalArgs) -> Result<ServerCredentials> {
    let credentials = config.credentials()?;
    if global.ask_password {
        let password = prompt::read_password()?;
        return Ok(credentials.with_password(password));
    }
    Ok(credentials)
}

async fn connect(config: &SyncConfig, global: &GlobalArgs) -> Result<Arc<dyn DatabaseDriver>> {
    let credentials = credentials(config, global)?;
    info!("Target: {}", credentials);

    let driver = create_driver(&credentials, &config.connection_config())
        .await
        .map_err(|e| {
            error!("Failed to connect: {}", e.detailed_message());
            e
        })?;

    Ok(Arc::from(driver))
}

async fn resolve_targets(config: &mut SyncConfig, driver: &dyn DatabaseDriver) -> Result<Discovered> {
    if config.discovery.strategy.is_none() {
        config.discovery.strategy = Some(prompt::choose_strategy()?);
    }
    let primary = config.strategy()?;
    let fallback = config.fallback_strategy()?;

    let discovered = discovery::resolve_with_fallback(driver, &primary, fallback.as_ref())
        .await
        .map_err(|e| {
            error!("Discovery failed: {}", e.detailed_message());
            e
        })?;

    info!(
        "✓ Found {} target databases using {}",
        discovered.databases.len(),
        discovered.strategy
    );
    Ok(discovered)
}

/// Reconciles every target database and prints the report
async fn run(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let mut config = load_config(&args.target, Some(&args.discovery))?;
    if let Some(concurrency) = args.concurrency {
        config.run.max_concurrency = concurrency;
    }

    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;
    let plan = config.plan()?;

    let driver = connect(&config, global).await?;
    let discovered = match resolve_targets(&mut config, driver.as_ref()).await {
        Ok(discovered) => discovered,
        Err(e) => {
            driver.close().await;
            return Err(e);
        }
    };

    let reconciler = Reconciler::new(Arc::clone(&driver), plan, config.reconcile_options());
    let report = reconciler.run(&discovered).await;
    driver.close().await;

    output::print_report(&report, args.format)?;
    if let Some(path) = &args.output {
        output::save_report(&report, path).await?;
        info!("✓ Report saved to {}", path.display());
    }

    Ok(())
}

/// Prints the databases a run would visit
async fn discover(args: &DiscoverArgs, global: &GlobalArgs) -> Result<()> {
    let mut config = load_config(&args.target, Some(&args.discovery))?;
    let driver = connect(&config, global).await?;

    let result = resolve_targets(&mut config, driver.as_ref()).await;
    driver.close().await;

    output::print_databases(&result?, args.format)
}

/// Tests the administrative connection
async fn test_connection(args: &TargetArgs, global: &GlobalArgs) -> Result<()> {
    info!("Testing database connection...");
    let config = load_config(args, None)?;
    let driver = connect(&config, global).await?;

    let healthy = driver.ping().await;
    let engine = driver.engine();
    driver.close().await;

    if !healthy {
        error!("Connection test failed: server did not answer");
        return Err(SchemaSyncError::connection_failed(
            ConnectionErrorKind::Other,
            format!("{} server did not answer the health check", engine),
            std::io::Error::other("SELECT 1 failed"),
        ));
    }

    info!("✓ Connection test successful");
    println!("Connection to {} server successful", engine);
    Ok(())
}
