//! Crawl command implementation

use crate::config::CrawlerConfig;
use crate::crawler::{CrawlEngine, CrawlPlan, CrawlSummary, LeafScheduler, RateLimiter, TableSelection};
use crate::fetcher::fipe_http::FipeHttpClient;
use crate::output::CsvRecordWriter;
use crate::resume::{CheckpointState, CheckpointStore, ResumeError};
use crate::shutdown::SharedShutdown;
use crate::VehicleType;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use super::{CheckpointCommand, CliError, CliSink, TablesCommand};

/// Maximum allowed concurrency; more only queues behind the rate limiter
const MAX_CONCURRENCY: usize = 32;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Resume modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Continue from the checkpoint if there is one
    On,
    /// Forget the checkpoint and start fresh
    Reset,
    /// Refuse to start if the checkpoint exists but cannot be read
    Verify,
}

impl FromStr for ResumeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on" => Ok(ResumeMode::On),
            "reset" => Ok(ResumeMode::Reset),
            "verify" => Ok(ResumeMode::Verify),
            _ => Err(format!(
                "Invalid resume mode: {s}. Valid options: on, reset, verify"
            )),
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Vehicle type filter on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VehicleTypeArg {
    /// Cars
    Car,
    /// Motorcycles
    Motorcycle,
    /// Trucks
    Truck,
    /// Every vehicle type
    All,
}

impl VehicleTypeArg {
    /// Expand a list of filters into distinct vehicle types in code order.
    pub fn expand(args: &[VehicleTypeArg]) -> Vec<VehicleType> {
        let mut types: Vec<VehicleType> = Vec::new();
        for arg in args {
            let picked: &[VehicleType] = match arg {
                Self::Car => &[VehicleType::Car],
                Self::Motorcycle => &[VehicleType::Motorcycle],
                Self::Truck => &[VehicleType::Truck],
                Self::All => &VehicleType::ALL,
            };
            for vehicle_type in picked {
                if !types.contains(vehicle_type) {
                    types.push(*vehicle_type);
                }
            }
        }
        types.sort_by_key(|vehicle_type| vehicle_type.code());
        types
    }
}

/// FIPE price crawler CLI
#[derive(Parser, Debug)]
#[command(name = "fipe-crawler")]
#[command(about = "Crawl vehicle prices from the FIPE reference tables", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// TOML configuration file (defaults to the public FIPE API settings)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Checkpoint file, overriding the configured one
    #[arg(long, global = true)]
    pub checkpoint: Option<PathBuf>,

    /// Maximum number of retries for failed requests (range: 0-20)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: Option<u32>,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Expose Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<std::net::SocketAddr>,
}

impl Cli {
    /// Load the configuration and apply global overrides.
    pub fn load_config(&self) -> Result<CrawlerConfig, CliError> {
        let mut config = CrawlerConfig::load_optional(self.config.as_deref())?;
        if let Some(path) = &self.checkpoint {
            config.crawl.checkpoint_path = path.clone();
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        config.validate()?;
        Ok(config)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl prices into the checkpoint and an optional CSV file
    Crawl(CrawlArgs),

    /// List reference tables
    Tables(TablesCommand),

    /// Inspect or reset the checkpoint
    Checkpoint(CheckpointCommand),
}

/// Crawl command arguments
#[derive(Parser, Debug)]
pub struct CrawlArgs {
    /// Reference table ids to crawl (repeatable)
    #[arg(long = "table", conflicts_with_all = ["year", "month"])]
    pub tables: Vec<i64>,

    /// Crawl the tables of this year
    #[arg(long)]
    pub year: Option<String>,

    /// Narrow --year to one month (name or number)
    #[arg(long, requires = "year")]
    pub month: Option<String>,

    /// Vehicle types to crawl (repeatable; defaults to the configured ones)
    #[arg(long = "vehicle-type", value_enum)]
    pub vehicle_types: Vec<VehicleTypeArg>,

    /// Leaves priced at once (default: configured, max: 32)
    #[arg(long, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,

    /// Persist the checkpoint every N processed leaves
    #[arg(long)]
    pub flush_every: Option<usize>,

    /// Append priced vehicles to this CSV file
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Resume mode: on, reset, or verify
    #[arg(long, default_value = "on")]
    pub resume: ResumeMode,
}

impl CrawlArgs {
    /// Table selection from the arguments
    pub fn selection(&self) -> TableSelection {
        if !self.tables.is_empty() {
            TableSelection::Ids(self.tables.clone())
        } else if let Some(year) = &self.year {
            TableSelection::Period {
                year: year.clone(),
                month: self.month.clone(),
            }
        } else {
            TableSelection::All
        }
    }

    /// Crawl plan from the arguments, falling back to configured vehicle types
    pub fn plan(&self, config: &CrawlerConfig) -> CrawlPlan {
        let vehicle_types = if self.vehicle_types.is_empty() {
            config.crawl.vehicle_types.clone()
        } else {
            VehicleTypeArg::expand(&self.vehicle_types)
        };
        CrawlPlan {
            tables: self.selection(),
            vehicle_types,
        }
    }

    /// Apply crawl overrides to the configuration.
    pub fn apply_overrides(&self, config: &mut CrawlerConfig) -> Result<(), CliError> {
        if let Some(concurrency) = self.concurrency {
            config.crawl.concurrency = concurrency;
        }
        if let Some(flush_every) = self.flush_every {
            config.crawl.flush_every = flush_every;
        }
        config.validate()?;
        Ok(())
    }

    /// Execute the crawl
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let mut config = cli.load_config()?;
        self.apply_overrides(&mut config)?;
        let plan = self.plan(&config);
        if plan.vehicle_types.is_empty() {
            return Err(CliError::InvalidArgument("no vehicle types selected".to_string()));
        }

        let checkpoint_path = config.crawl.checkpoint_path.clone();
        if self.resume == ResumeMode::Verify {
            verify_checkpoint(&checkpoint_path)?;
        }

        let store = Arc::new(CheckpointStore::load(&checkpoint_path, config.crawl.flush_policy()));
        if self.resume == ResumeMode::Reset {
            store.reset().await?;
        }

        let api = build_api(&config, shutdown.clone())?;
        let writer = match &self.output {
            Some(path) => Some(CsvRecordWriter::new(path)?),
            None => None,
        };
        let sink = Arc::new(CliSink::new(writer, cli.output_format == OutputFormat::Human));

        let engine = CrawlEngine::new(api, Arc::new(config.dictionaries.clone()), store, sink.clone())
            .with_scheduler(LeafScheduler::from_concurrency(config.crawl.concurrency))
            .with_shutdown(shutdown);

        info!(
            tables = ?plan.tables,
            vehicle_types = ?plan.vehicle_types,
            concurrency = config.crawl.concurrency,
            checkpoint = %checkpoint_path.display(),
            "Starting crawl"
        );

        let result = engine.run(&plan).await;
        let written = sink.finish()?;

        match &result {
            Ok(summary) => match cli.output_format {
                OutputFormat::Json => output_json(summary, written, self.output.as_deref()),
                OutputFormat::Human => output_human(summary, written, self.output.as_deref()),
            },
            Err(e) => {
                eprintln!("\nCrawl failed!");
                eprintln!("Error: {e}");
                error!("Crawl failed: {}", e);
            }
        }

        result.map(|_| ()).map_err(CliError::from)
    }
}

/// Build the rate-limited HTTP client from configuration.
pub fn build_api(config: &CrawlerConfig, shutdown: SharedShutdown) -> Result<Arc<FipeHttpClient>, CliError> {
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.capacity,
        config.rate_limit.refill_per_sec,
    )?);
    let client = FipeHttpClient::from_config(config, limiter)?.with_shutdown(shutdown);
    Ok(Arc::new(client))
}

/// Fail when a checkpoint exists but cannot be loaded
fn verify_checkpoint(path: &Path) -> Result<(), CliError> {
    match CheckpointState::load(path) {
        Ok(state) => {
            info!("Verify passed: {} processed leaves in {:?}", state.len(), path);
            Ok(())
        }
        Err(ResumeError::NotFound(_)) => {
            info!("Verify mode: no checkpoint at {:?}, nothing to verify", path);
            Ok(())
        }
        Err(e) => {
            error!("Invalid checkpoint: {:?}: {}", path, e);
            Err(CliError::InvalidArgument(format!(
                "Verify failed for {}: {e}. Use --resume reset to clear.",
                path.display()
            )))
        }
    }
}

fn output_json(summary: &CrawlSummary, written: u64, output: Option<&Path>) {
    let output = serde_json::json!({
        "success": true,
        "stopped": summary.stopped,
        "tables_selected": summary.tables_selected,
        "tables_completed": summary.stats.tables_completed,
        "vehicles_priced": summary.stats.fetched,
        "already_processed": summary.stats.skipped,
        "failed": summary.stats.failed,
        "malformed": summary.stats.malformed,
        "listing_failures": summary.stats.listing_failures,
        "elapsed_secs": summary.elapsed.as_secs_f64(),
        "vehicles_per_hour": summary.rate_per_hour(),
        "records_written": written,
        "output_path": output.map(|p| p.display().to_string()),
    });
    println!("{output}");
}

fn output_human(summary: &CrawlSummary, written: u64, output: Option<&Path>) {
    println!("\n{}", summary.format_summary());
    if let Some(path) = output {
        println!("  Output: {} ({} records)", path.display(), written);
    }
    if summary.stopped {
        println!("Progress saved. Run the same command again to resume.");
    }
}
