//! Configuration management for keyflow.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::delivery::INGEST_BATCH_LIMIT;
use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "keyflow";

/// Default failure cache file name.
const CACHE_FILE_NAME: &str = "failed_events.json";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `KEYFLOW_`)
/// 2. TOML config file at `~/.config/keyflow/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ingest endpoint configuration.
    pub ingest: IngestConfig,
    /// Flush scheduling configuration.
    pub flush: FlushConfig,
    /// Failure cache configuration.
    pub cache: CacheConfig,
}

/// Ingest endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Base URL of the backend API, e.g. `http://localhost:8000/api`.
    pub base_url: String,
    /// Bearer token attached to delivery requests.
    ///
    /// Must be available synchronously; the pipeline never performs a token
    /// refresh, and the teardown beacon in particular sends whatever is here.
    pub auth_token: Option<String>,
    /// Request timeout in milliseconds. A timed-out delivery is classified
    /// as a transient failure.
    pub request_timeout_ms: u64,
}

/// Flush scheduling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Buffer length at which a flush fires immediately.
    pub max_batch_size: usize,
    /// Milliseconds of inactivity after which the buffer is flushed.
    pub idle_timeout_ms: u64,
}

/// Failure cache configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path to the failure cache file.
    /// Defaults to `~/.local/share/keyflow/failed_events.json`.
    pub path: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            auth_token: None,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            idle_timeout_ms: 5_000,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `KEYFLOW_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("KEYFLOW_").split("_"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.base_url.is_empty() {
            return Err(Error::ConfigValidation {
                message: "ingest.base_url must not be empty".to_string(),
            });
        }

        if !self.ingest.base_url.starts_with("http://")
            && !self.ingest.base_url.starts_with("https://")
        {
            return Err(Error::ConfigValidation {
                message: format!(
                    "ingest.base_url must be an http(s) URL, got '{}'",
                    self.ingest.base_url
                ),
            });
        }

        if self.ingest.request_timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "ingest.request_timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.flush.max_batch_size == 0 {
            return Err(Error::ConfigValidation {
                message: "flush.max_batch_size must be greater than 0".to_string(),
            });
        }

        if self.flush.max_batch_size > INGEST_BATCH_LIMIT {
            return Err(Error::ConfigValidation {
                message: format!(
                    "flush.max_batch_size ({}) cannot exceed the ingest batch cap ({INGEST_BATCH_LIMIT})",
                    self.flush.max_batch_size
                ),
            });
        }

        if self.flush.idle_timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "flush.idle_timeout_ms must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the failure cache path, resolving defaults if not set.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.cache
            .path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(CACHE_FILE_NAME))
    }

    /// Get the idle timeout as a Duration.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.flush.idle_timeout_ms)
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.ingest.request_timeout_ms)
    }
}
