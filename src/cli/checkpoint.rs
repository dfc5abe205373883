//! CLI command for checkpoint maintenance

use crate::resume::{CheckpointState, CheckpointStore, ResumeError};
use clap::{Args, Subcommand};
use serde_json::json;

use super::{Cli, CliError, OutputFormat};

/// Checkpoint subcommand
#[derive(Debug, Args)]
pub struct CheckpointCommand {
    #[command(subcommand)]
    action: CheckpointAction,
}

/// Checkpoint actions
#[derive(Debug, Subcommand)]
enum CheckpointAction {
    /// Show what the checkpoint holds
    Show,
    /// Forget every processed leaf
    Reset,
}

impl CheckpointCommand {
    /// Execute the checkpoint command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = cli.load_config()?;
        let path = config.crawl.checkpoint_path.clone();

        match self.action {
            CheckpointAction::Show => {
                let state = match CheckpointState::load(&path) {
                    Ok(state) => Some(state),
                    Err(ResumeError::NotFound(_)) => None,
                    Err(e) => return Err(e.into()),
                };
                match cli.output_format {
                    OutputFormat::Json => {
                        let output = json!({
                            "path": path.display().to_string(),
                            "exists": state.is_some(),
                            "processed": state.as_ref().map_or(0, CheckpointState::len),
                            "current_table_id": state.as_ref().and_then(CheckpointState::current_table_id),
                            "saved_at": state.as_ref().map(|s| s.saved_at().to_rfc3339()),
                        });
                        println!("{output}");
                    }
                    OutputFormat::Human => match state {
                        Some(state) => {
                            println!("Checkpoint: {}", path.display());
                            println!("Processed leaves: {}", state.len());
                            match state.current_table_id() {
                                Some(id) => println!("Table in progress: {id}"),
                                None => println!("Table in progress: none"),
                            }
                            println!("Saved at: {}", state.saved_at().to_rfc3339());
                        }
                        None => println!("No checkpoint at {}", path.display()),
                    },
                }
            }
            CheckpointAction::Reset => {
                let store = CheckpointStore::load(&path, config.crawl.flush_policy());
                let before = store.processed_count().await;
                store.reset().await?;
                println!("Checkpoint reset: {} processed leaves forgotten", before);
            }
        }

        Ok(())
    }
}
