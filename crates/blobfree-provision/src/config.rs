//! Provisioning configuration
//!
//! Stored as JSON at `<config dir>/blobfree/config.json`. A missing file is
//! created with defaults on first load.

use anyhow::{Context, Result};
use blobfree_device::{CallTimeouts, HostTools, RegistryOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Name of the staging base directory under the system temp dir.
pub const STAGING_DIR_NAME: &str = "b2g-installer";

/// Top-level provisioning configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Parent directory of per-device staging roots
    pub staging_base: PathBuf,
    /// External tool locations
    pub tools: ToolPaths,
    /// Per-call time limits
    pub timeouts: TimeoutConfig,
    /// Upper bound on enumeration passes after root elevation
    pub max_elevation_passes: u32,
    /// Device watcher polling interval in milliseconds
    pub watch_interval_ms: u64,
}

/// Program names or paths of the external tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// Debug bridge client
    pub adb: PathBuf,
    /// Bootloader client
    pub fastboot: PathBuf,
    /// Ramdisk cpio packer
    pub mkbootfs: PathBuf,
    /// Boot image writer
    pub mkbootimg: PathBuf,
    /// ext4 filesystem image builder
    pub make_ext4fs: PathBuf,
}

/// Time limits, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Property dumps, variable queries, elevation and reboots
    pub query_secs: u64,
    /// One blob pull
    pub pull_secs: u64,
    /// One external image tool run
    pub build_secs: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            staging_base: std::env::temp_dir().join(STAGING_DIR_NAME),
            tools: ToolPaths::default(),
            timeouts: TimeoutConfig::default(),
            max_elevation_passes: 3,
            watch_interval_ms: 1000,
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            adb: PathBuf::from("adb"),
            fastboot: PathBuf::from("fastboot"),
            mkbootfs: PathBuf::from("mkbootfs"),
            mkbootimg: PathBuf::from("mkbootimg"),
            make_ext4fs: PathBuf::from("make_ext4fs"),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            query_secs: 30,
            pull_secs: 300,
            build_secs: 900,
        }
    }
}

impl ProvisionConfig {
    /// Load configuration from the default location
    pub async fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path).await
    }

    /// Load configuration from a specific path, writing defaults if absent
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!(path = %path.display(), "Config file not found, creating default");
            let config = Self::default();
            config.save_to_path(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ProvisionConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Save configuration to a specific path
    pub async fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Default configuration file path
    pub fn default_config_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("No configuration directory for this platform")?;
        Ok(base.join("blobfree").join("config.json"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeouts.query_secs == 0 {
            anyhow::bail!("Invalid query timeout: {} s", self.timeouts.query_secs);
        }
        if self.timeouts.pull_secs == 0 {
            anyhow::bail!("Invalid pull timeout: {} s", self.timeouts.pull_secs);
        }
        if self.timeouts.build_secs == 0 {
            anyhow::bail!("Invalid build timeout: {} s", self.timeouts.build_secs);
        }
        if self.max_elevation_passes == 0 {
            anyhow::bail!("Invalid elevation pass limit: {}", self.max_elevation_passes);
        }
        if self.watch_interval_ms == 0 {
            anyhow::bail!("Invalid watch interval: {} ms", self.watch_interval_ms);
        }
        if self.staging_base.as_os_str().is_empty() {
            anyhow::bail!("Staging base directory is empty");
        }
        Ok(())
    }

    /// Timeouts for device calls
    pub fn call_timeouts(&self) -> CallTimeouts {
        CallTimeouts {
            query: Duration::from_secs(self.timeouts.query_secs),
            pull: Duration::from_secs(self.timeouts.pull_secs),
        }
    }

    /// Registry options derived from this configuration
    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            timeouts: self.call_timeouts(),
            max_elevation_passes: self.max_elevation_passes,
        }
    }

    /// Host debug tool locations
    pub fn host_tools(&self) -> HostTools {
        HostTools {
            adb: self.tools.adb.clone(),
            fastboot: self.tools.fastboot.clone(),
        }
    }

    /// Time limit for one external image tool run
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.build_secs)
    }

    /// Device watcher polling interval
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}
