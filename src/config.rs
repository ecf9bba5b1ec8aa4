//! Settings file and application paths
//!
//! Directory priority:
//! 1. CLI `--config-dir`
//! 2. `SEQCACHE_CONFIG_DIR` environment variable
//! 3. Local folder IF any config files exist (seqcache.json, seqcache.log)
//! 4. Platform directories from dirs-next
//!
//! Platform paths:
//! - Linux: ~/.config/seqcache/{name}, ~/.local/share/seqcache/{name}
//! - macOS: ~/Library/Application Support/seqcache/{name}
//! - Windows: %APPDATA%\seqcache\{name}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::core::cache::DEFAULT_READ_BEHIND;
use crate::io::options::IoOptions;

const APP_DIR: &str = "seqcache";
const CONFIG_DIR_ENV: &str = "SEQCACHE_CONFIG_DIR";

/// Settings file name
pub const SETTINGS_FILE: &str = "seqcache.json";

/// Default log file name
pub const LOG_FILE: &str = "seqcache.log";

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path to a configuration file
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config_dir(config).join(name)
}

/// Path to a data file (logs)
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    data_dir(config).join(name)
}

/// Create configuration and data directories if missing
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = config_dir(config);
    let data_dir = data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }
    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }
    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn local_dir() -> Option<PathBuf> {
    std::env::current_dir().ok().filter(|d| has_local_config_files(d))
}

fn config_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    local_dir()
        .or_else(|| dirs_next::config_dir().map(|d| d.join(APP_DIR)))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn data_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    local_dir()
        .or_else(|| dirs_next::data_dir().map(|d| d.join(APP_DIR)))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Frame cache sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Fraction of available memory given to frame caches (0.0-1.0)
    pub mem_fraction: f64,
    /// Memory left to the system, in GB
    pub reserve_gb: f64,
    /// Frames kept behind the playhead
    pub read_behind: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mem_fraction: 0.75,
            reserve_gb: 2.0,
            read_behind: DEFAULT_READ_BEHIND,
        }
    }
}

impl CacheSettings {
    /// Per-media byte budget: available memory minus the reserve, scaled by
    /// `mem_fraction` and split evenly among `open_media` sources.
    ///
    /// The budget bounds the look-ahead only. A cache also keeps up to
    /// `read_behind` frames behind the playhead, so it can hold
    /// `budget + read_behind * frame_bytes` (see `FrameCache::resident_bound`).
    /// Ten 4K RGBA half frames add about 660 MB.
    pub fn budget_bytes(&self, open_media: usize) -> usize {
        let mut sys = System::new();
        sys.refresh_memory();
        let available = sys.available_memory() as usize;
        let budget = self.budget_from_available(available, open_media);
        debug!(
            "Cache budget: available={} MB, per media={} MB ({} open)",
            available / 1024 / 1024,
            budget / 1024 / 1024,
            open_media.max(1)
        );
        budget
    }

    fn budget_from_available(&self, available: usize, open_media: usize) -> usize {
        if !self.enabled {
            return 0;
        }
        let reserve = (self.reserve_gb.max(0.0) * 1024.0 * 1024.0 * 1024.0) as usize;
        let usable = available.saturating_sub(reserve);
        let total = (usable as f64 * self.mem_fraction.clamp(0.0, 1.0)) as usize;
        total / open_media.max(1)
    }
}

/// Persistent settings (`seqcache.json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub io: IoOptions,
    pub cache: CacheSettings,
}

impl Settings {
    /// Load settings; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write settings: {}", path.display()))?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }
}
