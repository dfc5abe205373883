//! Crawl engine
//!
//! Walks reference table → vehicle type → brand → model → model-year and
//! prices every leaf not yet in the checkpoint. Each table moves through
//! [`TablePhase`]s in order; the stop flag is honoured between levels and
//! in-flight leaves always run to completion.

use crate::config::Dictionaries;
use crate::crawler::events::{EventSink, LogLevel, Stage};
use crate::crawler::progress::{format_duration, rate_per_hour};
use crate::crawler::scheduler::LeafScheduler;
use crate::crawler::CrawlError;
use crate::fetcher::normalizer::{build_price_record, PriceQuery};
use crate::fetcher::{FetcherError, FipeApi, FipeClient};
use crate::metrics;
use crate::resume::{CheckpointStore, Claim};
use crate::shutdown::{SharedShutdown, ShutdownCoordinator};
use crate::{Brand, LeafKey, Model, ModelYear, ModelYearOption, ReferenceTable, VehicleType};
use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

/// Which reference tables a crawl covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSelection {
    /// Every table the API lists
    All,
    /// Tables with these identifiers
    Ids(Vec<i64>),
    /// Tables of a year, optionally narrowed to one month (name or number)
    Period {
        /// Four-digit year
        year: String,
        /// Month name ("janeiro") or number ("1", "01")
        month: Option<String>,
    },
}

impl TableSelection {
    /// Whether a table is selected.
    pub fn matches(&self, table: &ReferenceTable) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.contains(&table.id),
            Self::Period { year, month } => {
                table.year == year.trim()
                    && month.as_deref().map_or(true, |month| month_matches(table, month))
            }
        }
    }
}

fn month_matches(table: &ReferenceTable, month: &str) -> bool {
    let month = month.trim();
    if month.eq_ignore_ascii_case(&table.month_name) {
        return true;
    }
    match (month.parse::<u32>(), table.month_code.parse::<u32>()) {
        (Ok(wanted), Ok(code)) => wanted == code,
        _ => false,
    }
}

/// What to crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlPlan {
    /// Reference tables to visit
    pub tables: TableSelection,
    /// Vehicle types to visit under each table, in order
    pub vehicle_types: Vec<VehicleType>,
}

impl CrawlPlan {
    /// Every table, the given vehicle types
    pub fn all_tables(vehicle_types: Vec<VehicleType>) -> Self {
        Self {
            tables: TableSelection::All,
            vehicle_types,
        }
    }
}

/// Traversal phase of one reference table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePhase {
    /// Choosing the vehicle types to visit
    LoadingTypes,
    /// Listing brands of a vehicle type
    LoadingBrands,
    /// Listing models of a brand
    LoadingModels,
    /// Listing model-years of a model
    LoadingModelYears,
    /// Pricing the leaves of a model
    FetchingLeaves,
    /// Every level of the table visited
    Done,
}

impl fmt::Display for TablePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadingTypes => "loading vehicle types",
            Self::LoadingBrands => "loading brands",
            Self::LoadingModels => "loading models",
            Self::LoadingModelYears => "loading model years",
            Self::FetchingLeaves => "fetching prices",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of one leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafOutcome {
    /// Priced, recorded and emitted
    Fetched,
    /// Already in the checkpoint
    AlreadyProcessed,
    /// Claimed by a concurrent task in the same crawl
    Duplicate,
    /// Model-year value could not be split; not recorded
    Malformed,
    /// Price fetch failed; not recorded, retried on the next run
    Failed,
    /// Not started because a stop was requested
    Deferred,
}

impl LeafOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::AlreadyProcessed => "skipped",
            Self::Duplicate => "duplicate",
            Self::Malformed => "malformed",
            Self::Failed => "failed",
            Self::Deferred => "deferred",
        }
    }
}

/// Counters of one crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Tables fully visited
    pub tables_completed: usize,
    /// Brands visited
    pub brands: usize,
    /// Models visited
    pub models: usize,
    /// Leaves priced in this run
    pub fetched: usize,
    /// Leaves skipped because already processed
    pub skipped: usize,
    /// Leaves claimed twice within one batch
    pub duplicates: usize,
    /// Leaves with malformed model-year values
    pub malformed: usize,
    /// Leaves whose price fetch failed
    pub failed: usize,
    /// Listings that failed and were treated as empty
    pub listing_failures: usize,
}

impl CrawlStats {
    fn record(&mut self, outcome: LeafOutcome) {
        match outcome {
            LeafOutcome::Fetched => self.fetched += 1,
            LeafOutcome::AlreadyProcessed => self.skipped += 1,
            LeafOutcome::Duplicate => self.duplicates += 1,
            LeafOutcome::Malformed => self.malformed += 1,
            LeafOutcome::Failed => self.failed += 1,
            LeafOutcome::Deferred => {}
        }
    }
}

/// Result of [`CrawlEngine::run`]
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    /// Counters
    pub stats: CrawlStats,
    /// Tables selected by the plan
    pub tables_selected: usize,
    /// Wall time of the run
    pub elapsed: Duration,
    /// Whether the run ended on a stop request
    pub stopped: bool,
}

impl CrawlSummary {
    /// Vehicles priced per hour in this run
    pub fn rate_per_hour(&self) -> f64 {
        rate_per_hour(self.stats.fetched as u64, self.elapsed)
    }

    /// Human-readable summary block
    pub fn format_summary(&self) -> String {
        let status = if self.stopped { "stopped" } else { "completed" };
        [
            format!("Crawl {status}"),
            format!(
                "  Tables: {}/{}",
                self.stats.tables_completed, self.tables_selected
            ),
            format!("  Vehicles priced: {}", self.stats.fetched),
            format!("  Already processed: {}", self.stats.skipped),
            format!(
                "  Failed: {} | Malformed: {} | Failed listings: {}",
                self.stats.failed, self.stats.malformed, self.stats.listing_failures
            ),
            format!("  Elapsed: {}", format_duration(self.elapsed)),
            format!("  Speed: {:.2} vehicles/hour", self.rate_per_hour()),
        ]
        .join("\n")
    }
}

/// Context of the model whose leaves are being priced
struct ModelScope<'a> {
    table: &'a ReferenceTable,
    vehicle_type: VehicleType,
    brand: &'a Brand,
    model: &'a Model,
}

/// Drives a crawl over the FIPE taxonomy
pub struct CrawlEngine {
    client: FipeClient,
    dictionaries: Arc<Dictionaries>,
    store: Arc<CheckpointStore>,
    sink: Arc<dyn EventSink>,
    scheduler: LeafScheduler,
    shutdown: SharedShutdown,
}

impl CrawlEngine {
    /// Create a sequential engine with its own stop flag.
    pub fn new(
        api: Arc<dyn FipeApi>,
        dictionaries: Arc<Dictionaries>,
        store: Arc<CheckpointStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            client: FipeClient::new(api, Arc::clone(&dictionaries)),
            dictionaries,
            store,
            sink,
            scheduler: LeafScheduler::sequential(),
            shutdown: ShutdownCoordinator::shared(),
        }
    }

    /// Use a different leaf scheduler
    pub fn with_scheduler(mut self, scheduler: LeafScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Share a stop flag with the caller
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Stop flag of this engine
    pub fn shutdown_handle(&self) -> SharedShutdown {
        Arc::clone(&self.shutdown)
    }

    /// Request a cooperative stop. In-flight leaves finish first.
    pub fn stop(&self) {
        self.shutdown.request_shutdown();
    }

    /// Checkpoint store of this engine
    pub fn store(&self) -> &Arc<CheckpointStore> {
        &self.store
    }

    fn stop_requested(&self) -> bool {
        self.shutdown.is_shutdown_requested()
    }

    /// List reference tables.
    pub async fn reference_tables(&self) -> Result<Vec<ReferenceTable>, CrawlError> {
        self.client
            .list_reference_tables()
            .await
            .map_err(CrawlError::ReferenceTables)
    }

    /// Run a crawl.
    ///
    /// Resumes at the checkpoint's current table when it is part of the plan.
    /// A failing table listing is the only fetch error returned; every other
    /// fetch failure is logged and skipped. Checkpoint write failures abort.
    pub async fn run(&self, plan: &CrawlPlan) -> Result<CrawlSummary, CrawlError> {
        let started = Instant::now();
        let mut stats = CrawlStats::default();

        let tables: Vec<ReferenceTable> = self
            .reference_tables()
            .await?
            .into_iter()
            .filter(|table| plan.tables.matches(table))
            .collect();

        if tables.is_empty() {
            self.log("No reference tables match the selection", LogLevel::Warning);
        }

        let start_index = match self.store.current_table().await {
            Some(id) => match tables.iter().position(|table| table.id == id) {
                Some(index) => {
                    info!(table_id = id, "Resuming from checkpointed table");
                    self.log(
                        &format!("Resuming from table {}", tables[index].label()),
                        LogLevel::Info,
                    );
                    index
                }
                None => 0,
            },
            None => 0,
        };

        for (index, table) in tables.iter().enumerate().skip(start_index) {
            if self.stop_requested() {
                break;
            }
            self.sink.on_progress(Stage::Tables, index + 1, tables.len());
            self.store.set_current_table(Some(table.id)).await?;

            let span = tracing::info_span!("table", table_id = table.id, label = %table.label());
            let completed = self
                .crawl_table(table, &plan.vehicle_types, &mut stats)
                .instrument(span)
                .await?;
            if completed {
                stats.tables_completed += 1;
            }
        }

        let stopped = self.stop_requested();
        if stopped {
            self.log("Stop requested, crawl interrupted", LogLevel::Warning);
        } else {
            self.store.set_current_table(None).await?;
        }
        self.store.flush().await?;

        let summary = CrawlSummary {
            stats,
            tables_selected: tables.len(),
            elapsed: started.elapsed(),
            stopped,
        };
        info!(
            fetched = summary.stats.fetched,
            skipped = summary.stats.skipped,
            failed = summary.stats.failed,
            stopped,
            elapsed = %format_duration(summary.elapsed),
            "Crawl finished"
        );
        self.log(
            &format!(
                "Crawl {}: {} vehicles priced in {}",
                if stopped { "stopped" } else { "completed" },
                summary.stats.fetched,
                format_duration(summary.elapsed)
            ),
            if stopped { LogLevel::Warning } else { LogLevel::Success },
        );
        Ok(summary)
    }

    /// Returns whether every level of the table was visited.
    async fn crawl_table(
        &self,
        table: &ReferenceTable,
        vehicle_types: &[VehicleType],
        stats: &mut CrawlStats,
    ) -> Result<bool, CrawlError> {
        self.enter(table, TablePhase::LoadingTypes);
        self.log(&format!("Table {} (id {})", table.label(), table.id), LogLevel::Info);

        for (index, &vehicle_type) in vehicle_types.iter().enumerate() {
            if self.stop_requested() {
                return Ok(false);
            }
            self.sink
                .on_progress(Stage::VehicleTypes, index + 1, vehicle_types.len());

            self.enter(table, TablePhase::LoadingBrands);
            let brands = match self.client.list_brands(table.id, vehicle_type).await {
                Ok(brands) => brands,
                Err(e) => {
                    self.listing_failed("brands", &e, stats);
                    continue;
                }
            };

            for (brand_index, brand) in brands.iter().enumerate() {
                if self.stop_requested() {
                    return Ok(false);
                }
                self.sink.on_progress(Stage::Brands, brand_index + 1, brands.len());
                stats.brands += 1;
                self.crawl_brand(table, vehicle_type, brand, stats).await?;
            }
        }

        if self.stop_requested() {
            return Ok(false);
        }
        self.enter(table, TablePhase::Done);
        Ok(true)
    }

    async fn crawl_brand(
        &self,
        table: &ReferenceTable,
        vehicle_type: VehicleType,
        brand: &Brand,
        stats: &mut CrawlStats,
    ) -> Result<(), CrawlError> {
        self.enter(table, TablePhase::LoadingModels);
        let models = match self.client.list_models(table.id, vehicle_type, &brand.id).await {
            Ok(models) => models,
            Err(e) => {
                self.listing_failed("models", &e, stats);
                return Ok(());
            }
        };

        for (model_index, model) in models.iter().enumerate() {
            if self.stop_requested() {
                return Ok(());
            }
            self.sink.on_progress(Stage::Models, model_index + 1, models.len());
            stats.models += 1;

            self.enter(table, TablePhase::LoadingModelYears);
            let options = match self
                .client
                .list_model_years(table.id, vehicle_type, &brand.id, &model.id)
                .await
            {
                Ok(options) => options,
                Err(e) => {
                    self.listing_failed("model years", &e, stats);
                    continue;
                }
            };

            if self.stop_requested() {
                return Ok(());
            }
            self.enter(table, TablePhase::FetchingLeaves);
            let scope = ModelScope {
                table,
                vehicle_type,
                brand,
                model,
            };
            self.crawl_leaves(&scope, &options, stats).await?;
        }
        Ok(())
    }

    async fn crawl_leaves(
        &self,
        scope: &ModelScope<'_>,
        options: &[ModelYearOption],
        stats: &mut CrawlStats,
    ) -> Result<(), CrawlError> {
        let total = options.len();
        let done = AtomicUsize::new(0);

        let outcomes = self
            .scheduler
            .run_batch(options, |option| {
                let done = &done;
                async move {
                    let outcome = self.process_leaf(scope, option).await;
                    let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                    self.sink.on_progress(Stage::Vehicles, current, total);
                    outcome
                }
            })
            .await;

        // Record every outcome before surfacing a checkpoint error.
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => {
                    stats.record(outcome);
                    metrics::record_leaf_outcome(outcome.label());
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn process_leaf(&self, scope: &ModelScope<'_>, option: &ModelYearOption) -> Result<LeafOutcome, CrawlError> {
        if self.stop_requested() {
            return Ok(LeafOutcome::Deferred);
        }

        let key = LeafKey::new(
            scope.table.id,
            scope.vehicle_type,
            &scope.brand.id,
            &scope.model.id,
            &option.value,
        );

        match self.store.claim(&key).await {
            Claim::Claimed => {}
            Claim::AlreadyProcessed => {
                debug!(key = %key, "Leaf already processed");
                return Ok(LeafOutcome::AlreadyProcessed);
            }
            Claim::InFlight => {
                debug!(key = %key, "Leaf already in flight");
                return Ok(LeafOutcome::Duplicate);
            }
        }

        let model_year = match ModelYear::parse(&option.value) {
            Ok(model_year) => model_year,
            Err(e) => {
                self.store.release(&key).await;
                warn!(key = %key, error = %e, "Skipping leaf with malformed model-year value");
                self.log(
                    &format!("Skipping {} {}: {}", scope.model.label, option.label, e),
                    LogLevel::Warning,
                );
                return Ok(LeafOutcome::Malformed);
            }
        };

        self.sink
            .on_current_leaf(&scope.brand.label, &scope.model.label, &option.value);

        let payload = match self
            .client
            .fetch_price(
                scope.table.id,
                scope.vehicle_type,
                &scope.brand.id,
                &scope.model.id,
                &model_year,
            )
            .await
        {
            Ok(payload) => payload,
            Err(e) => {
                self.store.release(&key).await;
                warn!(key = %key, error = %e, "Price fetch failed, leaf left unprocessed");
                self.log(
                    &format!(
                        "Failed to price {} | {} | {}: {}",
                        scope.brand.label, scope.model.label, option.label, e
                    ),
                    LogLevel::Warning,
                );
                return Ok(LeafOutcome::Failed);
            }
        };

        if let Err(e) = self.store.mark_processed(key.clone()).await {
            self.store.release(&key).await;
            return Err(e.into());
        }

        let query = PriceQuery {
            table_id: scope.table.id,
            vehicle_type: scope.vehicle_type,
            model_year: model_year.year,
            fuel_code: model_year.fuel_code,
        };
        let record = build_price_record(&payload, &self.dictionaries, &query, Utc::now());
        debug!(key = %key, price = %record.price, "Leaf priced");
        self.sink.on_record(&record);
        Ok(LeafOutcome::Fetched)
    }

    fn enter(&self, table: &ReferenceTable, phase: TablePhase) {
        self.sink.on_phase(table.id, phase);
    }

    fn listing_failed(&self, what: &str, error: &FetcherError, stats: &mut CrawlStats) {
        stats.listing_failures += 1;
        warn!(listing = what, error = %error, "Listing failed, treating as empty");
        self.log(
            &format!("Failed to list {what}, skipping: {error}"),
            LogLevel::Warning,
        );
    }

    fn log(&self, message: &str, level: LogLevel) {
        self.sink.on_log(message, level);
    }
}
