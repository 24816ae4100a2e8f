//! Configuration for clearflow.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CLEARFLOW_HOME, CLEARFLOW_SIGNER_ADDRESS,
//!    CLEARFLOW_RELAYER_URL, CLEARFLOW_QUOTE_URL)
//! 2. Config file (.clearflow/config.yaml)
//! 3. Defaults (~/.clearflow, LI.FI, USDC on Base)
//!
//! Config file discovery:
//! - Searches the working directory and its parents for .clearflow/config.yaml
//! - `paths.home` is relative to the .clearflow/ directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{ChainRegistry, ExecutionConfig, PriceTable, DEFAULT_STALE_AFTER_SECS};
use crate::domain::{Policy, DEFAULT_MAX_RETRIES};
use crate::ingest::SourceDefaults;

pub const ENV_HOME: &str = "CLEARFLOW_HOME";
pub const ENV_SIGNER_ADDRESS: &str = "CLEARFLOW_SIGNER_ADDRESS";
pub const ENV_RELAYER_URL: &str = "CLEARFLOW_RELAYER_URL";
pub const ENV_QUOTE_URL: &str = "CLEARFLOW_QUOTE_URL";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub policy: Option<Policy>,
    #[serde(default)]
    pub chains: Option<ChainRegistry>,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub quotes: QuotesSection,
    #[serde(default)]
    pub prices: HashMap<String, Decimal>,
    #[serde(default)]
    pub ingest: IngestSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .clearflow/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionSection {
    pub max_retries: Option<u32>,
    pub mock_delay_ms: Option<u64>,
    pub signer_address: Option<String>,
    pub relayer_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub stale_after_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotesSection {
    pub base_url: Option<String>,
    pub integrator: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestSection {
    pub source_chain_id: Option<u64>,
    pub source_token: Option<String>,
}

/// Resolved configuration with absolute paths and defaults applied
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// State directory (holds the database)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Policy snapshot given to new batches
    pub policy: Policy,
    /// Supported chains and token addresses
    pub chains: ChainRegistry,
    pub execution: ExecutionSettings,
    pub quotes: QuoteSettings,
    /// Token → USD price
    pub prices: PriceTable,
    pub ingest: IngestSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSettings {
    pub max_retries: u32,
    pub mock_delay_ms: u64,
    pub signer_address: Option<String>,
    pub relayer_url: Option<String>,
    pub timeout_seconds: u64,
    /// Idle time before an executing batch may be reopened
    pub stale_after_seconds: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            mock_delay_ms: 1000,
            signer_address: None,
            relayer_url: None,
            timeout_seconds: 120,
            stale_after_seconds: DEFAULT_STALE_AFTER_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteSettings {
    pub base_url: String,
    pub integrator: String,
    pub timeout_seconds: u64,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            base_url: "https://li.quest/v1".to_string(),
            integrator: "clearflow".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSettings {
    pub source_chain_id: u64,
    pub source_token: String,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            source_chain_id: 8453,
            source_token: "USDC".to_string(),
        }
    }
}

impl ResolvedConfig {
    /// Load configuration for the current process
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine working directory")?;
        let default_home = dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".clearflow");
        let config_file = find_config_file(&cwd);
        Self::resolve(config_file, default_home, |key| std::env::var(key).ok())
    }

    /// Resolve from an optional config file, a default home and an env lookup
    pub fn resolve<E>(config_file: Option<PathBuf>, default_home: PathBuf, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let file = match config_file {
            Some(ref path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };

        let home = if let Some(env_home) = env(ENV_HOME) {
            PathBuf::from(env_home)
        } else if let (Some(home_path), Some(config_path)) = (&file.paths.home, &config_file) {
            let clearflow_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(clearflow_dir, home_path)
        } else {
            default_home
        };

        let mut chains = ChainRegistry::defaults();
        if let Some(extra) = file.chains {
            chains.extend(extra);
        }

        let exec_defaults = ExecutionSettings::default();
        let execution = ExecutionSettings {
            max_retries: file.execution.max_retries.unwrap_or(exec_defaults.max_retries),
            mock_delay_ms: file.execution.mock_delay_ms.unwrap_or(exec_defaults.mock_delay_ms),
            signer_address: env(ENV_SIGNER_ADDRESS).or(file.execution.signer_address),
            relayer_url: env(ENV_RELAYER_URL).or(file.execution.relayer_url),
            timeout_seconds: file
                .execution
                .timeout_seconds
                .unwrap_or(exec_defaults.timeout_seconds),
            stale_after_seconds: file
                .execution
                .stale_after_seconds
                .unwrap_or(exec_defaults.stale_after_seconds),
        };

        // A transfer still in flight must never look abandoned
        if execution.stale_after_seconds <= execution.timeout_seconds {
            anyhow::bail!(
                "execution.stale_after_seconds ({}) must exceed execution.timeout_seconds ({})",
                execution.stale_after_seconds,
                execution.timeout_seconds
            );
        }

        let quote_defaults = QuoteSettings::default();
        let quotes = QuoteSettings {
            base_url: env(ENV_QUOTE_URL)
                .or(file.quotes.base_url)
                .unwrap_or(quote_defaults.base_url),
            integrator: file.quotes.integrator.unwrap_or(quote_defaults.integrator),
            timeout_seconds: file
                .quotes
                .timeout_seconds
                .unwrap_or(quote_defaults.timeout_seconds),
        };

        let ingest_defaults = IngestSettings::default();
        let ingest = IngestSettings {
            source_chain_id: file
                .ingest
                .source_chain_id
                .unwrap_or(ingest_defaults.source_chain_id),
            source_token: file
                .ingest
                .source_token
                .map(|t| t.to_ascii_uppercase())
                .unwrap_or(ingest_defaults.source_token),
        };

        Ok(Self {
            home,
            config_file,
            policy: file.policy.unwrap_or_default(),
            chains,
            execution,
            quotes,
            prices: PriceTable::new(file.prices),
            ingest,
        })
    }

    /// SQLite database location
    pub fn database_path(&self) -> PathBuf {
        self.home.join("clearflow.db")
    }

    /// Engine configuration derived from these settings
    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            chains: self.chains.clone(),
            signer_address: self.execution.signer_address.clone(),
            max_retries: self.execution.max_retries,
            mock_delay: Duration::from_millis(self.execution.mock_delay_ms),
            stale_after: Duration::from_secs(self.execution.stale_after_seconds),
        }
    }

    /// Funding source for newly ingested batches
    pub fn source_defaults(&self) -> SourceDefaults {
        SourceDefaults {
            chain_id: self.ingest.source_chain_id,
            token: self.ingest.source_token.clone(),
        }
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".clearflow").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}
