//! CLI command for listing reference tables

use crate::fetcher::FipeClient;
use crate::shutdown::SharedShutdown;
use crate::ReferenceTable;
use clap::Args;
use serde_json::json;
use std::sync::Arc;

use super::crawl::build_api;
use super::{Cli, CliError, OutputFormat};

/// Tables subcommand
#[derive(Debug, Args)]
pub struct TablesCommand {
    /// Only list tables of this year
    #[arg(long)]
    pub year: Option<String>,

    /// Show at most this many tables, newest first
    #[arg(long)]
    pub limit: Option<usize>,
}

impl TablesCommand {
    /// Keep the tables requested by the filters
    pub fn filter(&self, tables: Vec<ReferenceTable>) -> Vec<ReferenceTable> {
        let filtered = tables
            .into_iter()
            .filter(|table| self.year.as_deref().map_or(true, |year| table.year == year.trim()));
        match self.limit {
            Some(limit) => filtered.take(limit).collect(),
            None => filtered.collect(),
        }
    }

    /// Execute the tables command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = cli.load_config()?;
        let api = build_api(&config, shutdown)?;
        let client = FipeClient::new(api, Arc::new(config.dictionaries.clone()));

        let tables = self.filter(client.list_reference_tables().await?);

        match cli.output_format {
            OutputFormat::Json => {
                let rows: Vec<_> = tables
                    .iter()
                    .map(|table| {
                        json!({
                            "id": table.id,
                            "year": table.year,
                            "month_code": table.month_code,
                            "month": table.month_name,
                        })
                    })
                    .collect();
                println!("{}", serde_json::Value::Array(rows));
            }
            OutputFormat::Human => {
                println!("Found {} reference tables:\n", tables.len());
                for table in &tables {
                    println!("{:>5} | {}", table.id, table.label());
                }
            }
        }

        Ok(())
    }
}
