//! Terminal event sink
//!
//! Drives a spinner from engine events, appends records to the CSV export,
//! logs each priced vehicle in human mode and emits a throughput line at a
//! fixed interval.

use crate::crawler::events::forward_log;
use crate::crawler::{EventSink, LogLevel, ProgressState, Stage, TablePhase};
use crate::fetcher::normalizer::format_brl;
use crate::output::{CsvRecordWriter, OutputResult, RecordWriter};
use crate::VehiclePriceRecord;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use super::CliError;

/// Event sink for the `crawl` command
pub struct CliSink {
    bar: ProgressBar,
    human: bool,
    writer: Mutex<Option<CsvRecordWriter>>,
    progress: Mutex<ProgressState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CliSink {
    /// Create a sink; `human` is false for machine-readable output, which
    /// hides the spinner and the per-vehicle lines.
    pub fn new(writer: Option<CsvRecordWriter>, human: bool) -> Self {
        let bar = if human {
            create_progress_bar()
        } else {
            ProgressBar::hidden()
        };
        Self {
            bar,
            human,
            writer: Mutex::new(writer),
            progress: Mutex::new(ProgressState::new()),
        }
    }

    /// Vehicles reported so far
    pub fn items_processed(&self) -> u64 {
        lock(&self.progress).items_processed
    }

    /// Close the CSV export and clear the spinner. Returns records written.
    pub fn finish(&self) -> Result<u64, CliError> {
        self.bar.finish_and_clear();
        let Some(writer) = lock(&self.writer).take() else {
            return Ok(0);
        };
        let written = writer.records_written();
        writer.close()?;
        Ok(written)
    }

    fn write(&self, record: &VehiclePriceRecord) -> OutputResult<()> {
        match lock(&self.writer).as_mut() {
            Some(writer) => writer.write_record(record),
            None => Ok(()),
        }
    }
}

impl EventSink for CliSink {
    fn on_progress(&self, stage: Stage, current: usize, total: usize) {
        if stage == Stage::Tables {
            self.bar.set_prefix(format!("table {current}/{total}"));
        }
    }

    fn on_log(&self, message: &str, level: LogLevel) {
        self.bar.suspend(|| forward_log(message, level));
        if level == LogLevel::Info {
            lock(&self.progress).set_phase(Some(message));
        }
    }

    fn on_record(&self, record: &VehiclePriceRecord) {
        if let Err(e) = self.write(record) {
            warn!(fipe_code = %record.fipe_code, error = %e, "Failed to write CSV record");
        }
        self.bar.inc(1);
        if self.human {
            let line = record_line(record);
            self.bar.suspend(|| info!("{}", line));
        }

        let mut progress = lock(&self.progress);
        progress.update(1);
        if progress.should_emit_update() {
            let line = progress.format_progress();
            self.bar.suspend(|| info!("{}", line));
            progress.mark_emitted();
        }
    }

    fn on_current_leaf(&self, brand: &str, model: &str, model_year_value: &str) {
        self.bar.set_message(format!("{brand} {model} {model_year_value}"));
    }

    fn on_phase(&self, table_id: i64, phase: TablePhase) {
        if phase != TablePhase::FetchingLeaves {
            self.bar.set_message(format!("table {table_id}: {phase}"));
        }
    }
}

/// "Brand | Model | Year | R$ 1.234,56" line for one priced vehicle
pub fn record_line(record: &VehiclePriceRecord) -> String {
    let price = if record.price_available {
        format_brl(record.price)
    } else {
        "price unavailable".to_string()
    };
    format!("{} | {}", record.describe(), price)
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {prefix} | {pos} priced | {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}
