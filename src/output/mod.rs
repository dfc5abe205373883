//! Record writers

use crate::VehiclePriceRecord;

pub mod csv;

pub use self::csv::CsvRecordWriter;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Sink for priced vehicles
pub trait RecordWriter {
    /// Write a single record
    fn write_record(&mut self, record: &VehiclePriceRecord) -> OutputResult<()>;

    /// Write multiple records at once
    fn write_records(&mut self, records: &[VehiclePriceRecord]) -> OutputResult<()> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Flush any buffered data to disk
    fn flush(&mut self) -> OutputResult<()>;

    /// Number of records written by this writer
    fn records_written(&self) -> u64;
}
