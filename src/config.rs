//! Configuration loading.
//!
//! Loads from `./papersentry.toml` (or `$PAPERSENTRY_CONFIG_PATH`).
//! Environment variables override file values; file values override
//! defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default bounded round-trip timeout for oracle calls, seconds.
const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 20;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Verdict oracle settings.
    pub oracle: OracleConfig,
    /// Storage settings.
    pub storage: StorageConfig,
}

/// Verdict oracle settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Remote API key. Absent means the deterministic simulation runs.
    pub api_key: Option<String>,
    /// Bounded round-trip timeout per oracle call, seconds.
    pub timeout_secs: u64,
    /// Treat monitoring oracle failures as violations instead of
    /// assuming fine. Off by default: a flaky network should not lock
    /// out a legitimate user continuously.
    pub fail_closed_monitoring: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            timeout_secs: DEFAULT_ORACLE_TIMEOUT_SECS,
            fail_closed_monitoring: false,
        }
    }
}

impl OracleConfig {
    /// The per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Storage settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory override. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let path = std::env::var("PAPERSENTRY_CONFIG_PATH")
            .map_or_else(|_| PathBuf::from("papersentry.toml"), PathBuf::from);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                toml::from_str(&contents).context("failed to parse config TOML")
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function for testability.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(key) = env("GEMINI_API_KEY").or_else(|| env("PAPERSENTRY_API_KEY")) {
            if !key.trim().is_empty() {
                self.oracle.api_key = Some(key);
            }
        }
        if let Some(v) = env("PAPERSENTRY_ORACLE_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.oracle.timeout_secs = n,
                Err(_) => tracing::warn!(
                    var = "PAPERSENTRY_ORACLE_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("PAPERSENTRY_FAIL_CLOSED_MONITORING") {
            self.oracle.fail_closed_monitoring = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = env("PAPERSENTRY_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(v));
        }
    }

    /// Resolve the effective data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no override is set and the platform data
    /// directory cannot be determined.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("", "", "papersentry")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .context("could not determine platform data directory")
    }
}
