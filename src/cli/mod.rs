//! CLI command implementations

pub mod checkpoint;
pub mod crawl;
pub mod error;
pub mod sink;
pub mod tables;

pub use checkpoint::CheckpointCommand;
pub use crawl::{Cli, Commands, CrawlArgs, OutputFormat, ResumeMode, VehicleTypeArg};
pub use error::CliError;
pub use sink::CliSink;
pub use tables::TablesCommand;
