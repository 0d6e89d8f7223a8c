// Server and plugin configuration: defaults, file loading, environment overrides

use crate::error::{ToolhostError, ToolhostResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "toolhost.json";

pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_RESOURCE_PATHS: &str = "RESOURCE_PATHS";
pub const ENV_DATA_DIR: &str = "DATA_DIR";
pub const ENV_UPDATE_INTERVAL: &str = "UPDATE_INTERVAL";
pub const ENV_MAX_ITEMS: &str = "MAX_ITEMS";

/// Plugin settings, fixed between two `setup()` calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Seconds between two background cycles
    pub update_interval: u64,

    /// Upper bound on the items a plugin keeps around
    pub max_items: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            update_interval: 60,
            max_items: 100,
            data_dir: None,
        }
    }
}

impl PluginConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.update_interval.max(1))
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup; a present, valid value
    /// always beats the current one.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(interval) = parse_override::<u64, _>(&lookup, ENV_UPDATE_INTERVAL) {
            if interval == 0 {
                tracing::warn!("Ignoring {}=0, interval must be at least one second", ENV_UPDATE_INTERVAL);
            } else {
                self.update_interval = interval;
            }
        }

        if let Some(max_items) = parse_override::<usize, _>(&lookup, ENV_MAX_ITEMS) {
            self.max_items = max_items;
        }

        if let Some(dir) = non_empty(&lookup, ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }

        self
    }

    pub fn validate(&self) -> ToolhostResult<()> {
        if self.update_interval == 0 {
            return Err(ToolhostError::Configuration(
                "update_interval must be at least 1 second".to_string(),
            ));
        }
        if self.max_items == 0 {
            return Err(ToolhostError::Configuration(
                "max_items must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,

    /// Directories exposed through the `file://` resource provider
    pub resource_paths: Vec<PathBuf>,

    /// Serve the JSON-RPC protocol on stdin/stdout
    pub stdio: bool,

    pub plugin: PluginConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "toolhost".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            resource_paths: Vec::new(),
            stdio: true,
            plugin: PluginConfig::default(),
        }
    }
}

/// On-disk configuration format, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

impl ServerConfig {
    /// Read a configuration file without applying environment overrides.
    /// A missing file yields the defaults.
    pub fn from_file(path: &Path) -> ToolhostResult<Self> {
        if !path.exists() {
            tracing::info!("Configuration file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ToolhostError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = match ConfigFormat::from_path(path) {
            ConfigFormat::Json => serde_json::from_str(&content).map_err(|e| {
                ToolhostError::Configuration(format!("failed to parse {}: {}", path.display(), e))
            })?,
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| {
                ToolhostError::Configuration(format!("failed to parse {}: {}", path.display(), e))
            })?,
        };

        config.plugin.validate()?;
        Ok(config)
    }

    /// File then environment; any file problem is returned to the caller
    pub fn try_load(path: &Path) -> ToolhostResult<Self> {
        Ok(Self::from_file(path)?.with_env())
    }

    /// File then environment; a malformed file is logged and replaced by the defaults
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; falling back to default configuration", e);
                Self::default().with_env()
            }
        }
    }

    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = non_empty(&lookup, ENV_HOST) {
            self.host = host;
        }

        if let Some(port) = parse_override::<u16, _>(&lookup, ENV_PORT) {
            self.port = port;
        }

        if let Some(level) = non_empty(&lookup, ENV_LOG_LEVEL) {
            self.log_level = level;
        }

        if let Some(paths) = non_empty(&lookup, ENV_RESOURCE_PATHS) {
            self.resource_paths = paths
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        self.plugin = self.plugin.with_overrides(&lookup);
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn to_string_pretty(&self, format: ConfigFormat) -> anyhow::Result<String> {
        match format {
            ConfigFormat::Json => {
                serde_json::to_string_pretty(self).context("Failed to serialize configuration")
            }
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).context("Failed to serialize configuration")
            }
        }
    }

    /// Write the configuration atomically (temp file, then rename)
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = self.to_string_pretty(ConfigFormat::from_path(path))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, content)
            .with_context(|| format!("Failed to write to {}", temp_path.display()))?;
        std::fs::rename(&temp_path, path).with_context(|| {
            format!("Failed to rename {} to {}", temp_path.display(), path.display())
        })?;

        Ok(())
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = non_empty(lookup, key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Ignoring invalid value {:?} for {}: {}", raw, key, e);
            None
        }
    }
}
