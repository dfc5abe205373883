//! CSV record writer
//!
//! Appends one row per priced vehicle. An existing non-empty file is
//! extended without repeating the header, so a resumed crawl keeps adding
//! to the same export.

use crate::crawler::defaults::OUTPUT_FLUSH_EVERY;
use crate::VehiclePriceRecord;
use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{OutputError, OutputResult, RecordWriter};

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// One CSV row
#[derive(Debug, Serialize)]
struct PriceRow<'a> {
    table_id: i64,
    reference_year: &'a str,
    reference_month: &'a str,
    vehicle_type: &'a str,
    fipe_code: &'a str,
    brand: &'a str,
    model: &'a str,
    model_year: i64,
    fuel_code: &'a str,
    fuel_abbreviation: &'a str,
    fuel: &'a str,
    price: String,
    price_available: bool,
    queried_at: String,
}

impl<'a> From<&'a VehiclePriceRecord> for PriceRow<'a> {
    fn from(record: &'a VehiclePriceRecord) -> Self {
        Self {
            table_id: record.table_id,
            reference_year: &record.reference_year,
            reference_month: &record.reference_month_code,
            vehicle_type: &record.vehicle_type_label,
            fipe_code: &record.fipe_code,
            brand: &record.brand,
            model: &record.model,
            model_year: record.model_year,
            fuel_code: &record.fuel_code,
            fuel_abbreviation: &record.fuel_abbreviation,
            fuel: &record.fuel_label,
            price: record.price.to_string(),
            price_available: record.price_available,
            queried_at: record.queried_at.to_rfc3339(),
        }
    }
}

/// CSV writer for vehicle price records
pub struct CsvRecordWriter {
    writer: Writer<BufWriter<File>>,
    path: PathBuf,
    records_written: u64,
    flush_every: u64,
}

impl CsvRecordWriter {
    /// Open `path` for appending, flushing every [`OUTPUT_FLUSH_EVERY`] records.
    pub fn new<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        Self::with_flush_every(path, OUTPUT_FLUSH_EVERY)
    }

    /// Open `path` for appending with a custom flush cadence (at least 1).
    pub fn with_flush_every<P: AsRef<Path>>(path: P, flush_every: usize) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Opening CSV output: path={}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {}", e)))?;
        }

        let has_content = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| OutputError::IoError(format!("Failed to open file: {}", e)))?;

        let writer = WriterBuilder::new()
            .has_headers(!has_content)
            .from_writer(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file));

        debug!(append = has_content, "CSV writer ready");

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            records_written: 0,
            flush_every: flush_every.max(1) as u64,
        })
    }

    /// Output file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush, sync to disk and drop the writer.
    pub fn close(mut self) -> OutputResult<()> {
        self.flush()?;

        let buf_writer = self
            .writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get inner writer: {}", e)))?;
        let file = buf_writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get file handle: {}", e)))?;
        file.sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync file: {}", e)))?;

        info!(
            "CSV output closed: {} records written to {}",
            self.records_written,
            self.path.display()
        );
        Ok(())
    }
}

impl RecordWriter for CsvRecordWriter {
    fn write_record(&mut self, record: &VehiclePriceRecord) -> OutputResult<()> {
        self.writer
            .serialize(PriceRow::from(record))
            .map_err(|e| OutputError::CsvError(format!("Failed to write record: {}", e)))?;

        self.records_written += 1;
        if self.records_written % self.flush_every == 0 {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {}", e)))
    }

    fn records_written(&self) -> u64 {
        self.records_written
    }
}
