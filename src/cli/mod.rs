//! Command-line interface for clearflow.
//!
//! Provides commands for ingesting payout CSVs, planning, quoting and
//! executing batches, and inspecting or exporting their state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::adapters::{LifiQuoteProvider, RelayerTransferExecutor, TransferExecutor};
use crate::config::ResolvedConfig;
use crate::core::{ExportFormat, Orchestrator};
use crate::ingest::parse_payout_csv;
use crate::store::SqliteStore;

/// clearflow - Batched cross-chain payout orchestrator
#[derive(Parser, Debug)]
#[command(name = "clearflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a draft batch from a payout CSV
    Create {
        /// CSV with recipientAddress,destinationChainId,preferredToken,amount
        csv: PathBuf,

        /// Platform the batch belongs to (part of every idempotency key)
        #[arg(short, long, default_value = "default")]
        platform: String,
    },

    /// Group a draft batch into routes
    Plan {
        /// Batch ID (UUID)
        batch_id: String,
    },

    /// Quote every item of a planned batch
    Quote {
        /// Batch ID (UUID)
        batch_id: String,

        /// Sender address used for the quotes
        #[arg(long)]
        from_address: Option<String>,
    },

    /// Execute a planned batch
    Execute {
        /// Batch ID (UUID)
        batch_id: String,

        /// Use synthetic transfers instead of the relayer
        #[arg(long)]
        mock: bool,
    },

    /// Move a failed or interrupted batch back to planned
    Reopen {
        /// Batch ID (UUID)
        batch_id: String,
    },

    /// Show a batch with its items
    Status {
        /// Batch ID (UUID)
        batch_id: String,
    },

    /// List batches, newest first
    Batches {
        /// Maximum number of batches to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Export a batch's items
    Export {
        /// Batch ID (UUID)
        batch_id: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: ExportArg,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Export format for CLI (maps to ExportFormat)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExportArg {
    Json,
    Csv,
}

impl From<ExportArg> for ExportFormat {
    fn from(arg: ExportArg) -> Self {
        match arg {
            ExportArg::Json => ExportFormat::Json,
            ExportArg::Csv => ExportFormat::Csv,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = ResolvedConfig::load()?;

        match self.command {
            Commands::Config => print_json(&config),
            Commands::Create { csv, platform } => create_batch(&config, &csv, &platform).await,
            Commands::Plan { batch_id } => {
                let plan = build_orchestrator(&config)?.plan(parse_id(&batch_id)?).await?;
                print_json(&plan)
            }
            Commands::Quote {
                batch_id,
                from_address,
            } => {
                let result = build_orchestrator(&config)?
                    .quote_all(parse_id(&batch_id)?, from_address.as_deref())
                    .await?;
                print_json(&result)
            }
            Commands::Execute { batch_id, mock } => {
                let result = build_orchestrator(&config)?
                    .execute(parse_id(&batch_id)?, mock)
                    .await?;
                print_json(&result)
            }
            Commands::Reopen { batch_id } => {
                let batch = build_orchestrator(&config)?.reopen(parse_id(&batch_id)?).await?;
                print_json(&batch)
            }
            Commands::Status { batch_id } => {
                let report = build_orchestrator(&config)?.status(parse_id(&batch_id)?).await?;
                print_json(&report)
            }
            Commands::Batches { limit } => list_batches(&config, limit).await,
            Commands::Export {
                batch_id,
                format,
                output,
            } => {
                let rendered = build_orchestrator(&config)?
                    .export(parse_id(&batch_id)?, format.into())
                    .await?;
                match output {
                    Some(path) => {
                        tokio::fs::write(&path, rendered)
                            .await
                            .with_context(|| format!("Failed to write export: {}", path.display()))?;
                        eprintln!("Exported to {}", path.display());
                        Ok(())
                    }
                    None => {
                        println!("{}", rendered);
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Open the store and collaborators described by `config`
pub fn build_orchestrator(config: &ResolvedConfig) -> Result<Orchestrator> {
    std::fs::create_dir_all(&config.home)
        .with_context(|| format!("Failed to create state directory: {}", config.home.display()))?;

    let store = SqliteStore::open(&config.database_path())
        .with_context(|| format!("Failed to open database: {}", config.database_path().display()))?;

    let quotes = LifiQuoteProvider::new(
        config.quotes.base_url.clone(),
        config.quotes.integrator.clone(),
        Duration::from_secs(config.quotes.timeout_seconds),
    )?;

    let transfers = match config.execution.relayer_url {
        Some(ref url) => {
            let relayer: Arc<dyn TransferExecutor> = Arc::new(RelayerTransferExecutor::new(
                url.clone(),
                Duration::from_secs(config.execution.timeout_seconds),
            )?);
            Some(relayer)
        }
        None => None,
    };

    Ok(Orchestrator::new(
        Arc::new(store),
        Arc::new(quotes),
        transfers,
        config.execution_config(),
        config.prices.clone(),
    ))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid batch ID: {}", raw))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", rendered);
    Ok(())
}

/// Parse a payout CSV and store it as a draft batch
async fn create_batch(config: &ResolvedConfig, path: &Path, platform: &str) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read CSV: {}", path.display()))?;

    let parsed = parse_payout_csv(&text);
    if !parsed.is_clean() {
        for error in &parsed.errors {
            eprintln!("  row {}: {}", error.row, error.message);
        }
        anyhow::bail!("CSV validation failed: {} invalid row(s)", parsed.errors.len());
    }

    let orchestrator = build_orchestrator(config)?;
    let (batch, items) = orchestrator
        .create_batch(platform, &parsed.rows, config.policy.clone(), &config.source_defaults())
        .await?;

    print_json(&json!({
        "batchId": batch.id,
        "platformId": batch.platform_id,
        "status": batch.status,
        "items": items.len(),
    }))
}

/// List batches
async fn list_batches(config: &ResolvedConfig, limit: usize) -> Result<()> {
    let batches = build_orchestrator(config)?.list_batches().await?;

    if batches.is_empty() {
        println!("No batches found");
        return Ok(());
    }

    println!("{:<38} {:<20} {:<12} {:<25}", "BATCH ID", "PLATFORM", "STATUS", "CREATED");
    println!("{}", "-".repeat(95));

    for batch in batches.into_iter().take(limit) {
        println!(
            "{:<38} {:<20} {:<12} {:<25}",
            batch.id,
            batch.platform_id,
            batch.status.as_str(),
            batch.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_execute_mock() {
        let cli = Cli::parse_from(["clearflow", "execute", "8c2d6f3e-1b0a-4c47-9f3e-2a1b3c4d5e6f", "--mock"]);
        match cli.command {
            Commands::Execute { batch_id, mock } => {
                assert!(mock);
                assert!(parse_id(&batch_id).is_ok());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_export_format() {
        let cli = Cli::parse_from(["clearflow", "export", "x", "--format", "csv"]);
        match cli.command {
            Commands::Export { format, .. } => {
                assert_eq!(ExportFormat::from(format), ExportFormat::Csv);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(parse_id("x").is_err());
    }
}
