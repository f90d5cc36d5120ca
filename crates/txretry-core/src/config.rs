use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{Classifier, RecognizedStates, RetryPolicy};

/// Which preset of transient SQLSTATE codes to recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatePreset {
    /// 40001 only.
    #[default]
    SerializationOnly,
    /// 40001 plus 40003, 08003 and 08006.
    ConnectionAware,
}

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per transaction (including the first).
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub backoff_ms: u64,
    #[serde(default)]
    pub states: StatePreset,
    /// Additional SQLSTATE codes to treat as transient.
    #[serde(default)]
    pub extra_states: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 2,
            states: StatePreset::default(),
            extra_states: Vec::new(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }

    pub fn recognized_states(&self) -> RecognizedStates {
        let mut states = match self.states {
            StatePreset::SerializationOnly => RecognizedStates::serialization_only(),
            StatePreset::ConnectionAware => RecognizedStates::connection_aware(),
        };
        for code in &self.extra_states {
            states.insert(code.trim());
        }
        states
    }
}

/// Global configuration loaded from `~/.config/txretry/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRetryConfig {
    /// sqlx connection URL for the demo store.
    pub database_url: String,
    /// Pool size for the demo store.
    pub max_connections: u32,
    /// Rows per statement when inserting in bulk.
    pub batch_size: usize,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for TxRetryConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            batch_size: 128,
            retry: None,
        }
    }
}

impl TxRetryConfig {
    /// Retry section, or defaults when absent.
    pub fn retry(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    /// Build the classifier described by this config.
    pub fn classifier(&self) -> Classifier {
        let retry = self.retry();
        Classifier::new(retry.recognized_states(), retry.policy())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("txretry")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TxRetryConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = TxRetryConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from a specific file.
pub fn load_from(path: impl AsRef<Path>) -> Result<TxRetryConfig> {
    let data = fs::read_to_string(path.as_ref())?;
    let cfg: TxRetryConfig = toml::from_str(&data)?;
    Ok(cfg)
}
