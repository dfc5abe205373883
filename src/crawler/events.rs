//! Crawl event sink
//!
//! The engine reports progress, log lines, records, table phases and the
//! leaf in progress through an [`EventSink`]. Front-ends decide what to do with them.

use crate::crawler::engine::TablePhase;
use crate::VehiclePriceRecord;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Taxonomy level a progress event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reference tables of the crawl
    Tables,
    /// Vehicle types of a table
    VehicleTypes,
    /// Brands of a vehicle type
    Brands,
    /// Models of a brand
    Models,
    /// Model-year leaves of a model
    Vehicles,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tables => "tables",
            Self::VehicleTypes => "vehicle types",
            Self::Brands => "brands",
            Self::Models => "models",
            Self::Vehicles => "vehicles",
        };
        f.write_str(name)
    }
}

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Routine information
    Info,
    /// Something finished well
    Success,
    /// Recoverable problem; the crawl continues
    Warning,
    /// Serious problem
    Error,
}

/// Receiver of crawl events.
///
/// Called from the crawl task; implementations must not block for long.
pub trait EventSink: Send + Sync {
    /// Position within a level: `current` of `total` done.
    fn on_progress(&self, stage: Stage, current: usize, total: usize);

    /// Human-readable log line.
    fn on_log(&self, message: &str, level: LogLevel);

    /// A leaf was priced and recorded as processed.
    fn on_record(&self, record: &VehiclePriceRecord);

    /// The leaf about to be fetched.
    fn on_current_leaf(&self, brand: &str, model: &str, model_year_value: &str);

    /// A reference table entered a new traversal phase.
    fn on_phase(&self, _table_id: i64, _phase: TablePhase) {}
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_progress(&self, _stage: Stage, _current: usize, _total: usize) {}
    fn on_log(&self, _message: &str, _level: LogLevel) {}
    fn on_record(&self, _record: &VehiclePriceRecord) {}
    fn on_current_leaf(&self, _brand: &str, _model: &str, _model_year_value: &str) {}
}

/// Sink that forwards every event to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_progress(&self, stage: Stage, current: usize, total: usize) {
        debug!(%stage, current, total, "Progress");
    }

    fn on_log(&self, message: &str, level: LogLevel) {
        forward_log(message, level);
    }

    fn on_record(&self, record: &VehiclePriceRecord) {
        info!(
            table_id = record.table_id,
            fipe_code = %record.fipe_code,
            price = %record.price,
            "{}",
            record.describe()
        );
    }

    fn on_current_leaf(&self, brand: &str, model: &str, model_year_value: &str) {
        debug!(brand, model, model_year_value, "Fetching leaf");
    }

    fn on_phase(&self, table_id: i64, phase: TablePhase) {
        debug!(table_id, %phase, "Table phase");
    }
}

/// Emit a sink log line through `tracing` at the matching level.
pub fn forward_log(message: &str, level: LogLevel) {
    match level {
        LogLevel::Info | LogLevel::Success => info!("{}", message),
        LogLevel::Warning => warn!("{}", message),
        LogLevel::Error => error!("{}", message),
    }
}
