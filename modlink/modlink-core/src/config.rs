//! Engine configuration.
//!
//! Configuration is layered:
//! 1. Built-in defaults (`EngineConfig::default()`)
//! 2. An optional TOML file (`--config` or `MODLINK_CONFIG_PATH`)
//! 3. Environment variable overrides (`MODLINK_*`)
//!
//! # Example
//!
//! ```toml
//! link_dir = "node_modules"
//! map_file = "module-map.json"
//! descriptor_file = "package.json"
//! marker = "@providesModule"
//! reserved_names = ["app"]
//! hoist_to_workspace = true
//!
//! [watch]
//! debounce_ms = 100
//! pattern = "**/*.js"
//! ```

use crate::error::{ModlinkError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

// Environment variable names
pub const ENV_CONFIG_PATH: &str = "MODLINK_CONFIG_PATH";
pub const ENV_LINK_DIR: &str = "MODLINK_LINK_DIR";
pub const ENV_MAP_FILE: &str = "MODLINK_MAP_FILE";
pub const ENV_DESCRIPTOR: &str = "MODLINK_DESCRIPTOR";
pub const ENV_MARKER: &str = "MODLINK_MARKER";
pub const ENV_HOIST: &str = "MODLINK_HOIST";

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory under each root where module links are materialized
    pub link_dir: String,

    /// File under each root holding the persisted module map
    pub map_file: String,

    /// File whose presence marks a project root
    pub descriptor_file: String,

    /// Keyword of the declaration marker comment
    pub marker: String,

    /// Names that can never be claimed, in addition to the runtime builtins
    pub reserved_names: Vec<String>,

    /// Also bind declarations in the enclosing workspace root
    pub hoist_to_workspace: bool,

    /// Watcher tuning
    pub watch: WatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            link_dir: "node_modules".to_string(),
            map_file: "module-map.json".to_string(),
            descriptor_file: "package.json".to_string(),
            marker: "@providesModule".to_string(),
            reserved_names: Vec::new(),
            hoist_to_workspace: true,
            watch: WatchConfig::default(),
        }
    }
}

/// Configuration for the file watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Wait this long after the last event for a path before emitting it
    pub debounce_ms: u64,

    /// Emit batched events at this interval
    pub batch_interval_ms: u64,

    /// Maximum pending paths before forcing emission
    pub max_batch_size: usize,

    /// Optional glob restricting which files are reconciled
    pub pattern: Option<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            batch_interval_ms: 250,
            max_batch_size: 100,
            pattern: None,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }
}

impl EngineConfig {
    /// Load configuration from an explicit path, `MODLINK_CONFIG_PATH`, or defaults.
    ///
    /// Environment overrides are applied in every case.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is named but unreadable, fails to
    /// parse, or the merged configuration is invalid.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from));

        match path {
            Some(path) => Self::load_from_path(&path).await,
            None => {
                let mut config = Self::default();
                config.merge_env_vars()?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load configuration from a TOML file, then apply environment overrides.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ModlinkError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: Self = toml::from_str(&content)
            .map_err(|e| ModlinkError::config(format!("Failed to parse config file: {}", e)))?;

        config.merge_env_vars()?;
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(link_dir) = lookup(ENV_LINK_DIR) {
            debug!("Overriding link_dir from environment: {}", link_dir);
            self.link_dir = link_dir;
        }

        if let Some(map_file) = lookup(ENV_MAP_FILE) {
            debug!("Overriding map_file from environment: {}", map_file);
            self.map_file = map_file;
        }

        if let Some(descriptor) = lookup(ENV_DESCRIPTOR) {
            debug!("Overriding descriptor_file from environment: {}", descriptor);
            self.descriptor_file = descriptor;
        }

        if let Some(marker) = lookup(ENV_MARKER) {
            debug!("Overriding marker from environment: {}", marker);
            self.marker = marker;
        }

        if let Some(hoist) = lookup(ENV_HOIST) {
            self.hoist_to_workspace = match hoist.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(ModlinkError::config(format!(
                        "Invalid {} value '{}'. Must be true or false",
                        ENV_HOIST, other
                    )));
                }
            };
        }

        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a file or directory name is empty or contains a
    /// path separator, or if the marker keyword is blank.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("link_dir", &self.link_dir),
            ("map_file", &self.map_file),
            ("descriptor_file", &self.descriptor_file),
        ] {
            if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
                return Err(ModlinkError::config(format!(
                    "Invalid {} '{}'. Must be a plain file name",
                    field, value
                )));
            }
        }

        if self.marker.trim().is_empty() || self.marker.contains(char::is_whitespace) {
            return Err(ModlinkError::config(format!(
                "Invalid marker '{}'. Must be a single non-empty word",
                self.marker
            )));
        }

        if self.watch.max_batch_size == 0 {
            return Err(ModlinkError::config("watch.max_batch_size must be positive"));
        }

        Ok(())
    }
}
