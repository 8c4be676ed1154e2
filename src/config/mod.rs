// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/atticguard

//! Configuration module
//!
//! Ingest and analysis thresholds are deployment specific and have no
//! built-in defaults: a config file without them fails to load. Sink and
//! database settings fall back to defaults.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::codec::DEFAULT_COMPANY_ID;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Decode and dedup settings
    pub ingest: IngestConfig,

    /// Motion and risk thresholds
    pub analysis: AnalysisConfig,

    /// Storage sink delivery
    #[serde(default)]
    pub sink: SinkConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_app_name() -> String {
    "AtticGuard".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Starting point for a new deployment. Every threshold here should be
    /// reviewed against the building being monitored.
    pub fn example() -> Self {
        Self {
            app_name: default_app_name(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            ingest: IngestConfig {
                company_id: DEFAULT_COMPANY_ID,
                min_inter_arrival_ms: 2_000,
                sequence_resync_after_secs: Some(6 * 3600),
                stale_after_secs: default_stale_after_secs(),
            },
            analysis: AnalysisConfig {
                window_capacity: 64,
                window_horizon_secs: 6 * 3600,
                low_power_widening: 4.0,
                baseline_len: 8,
                motion_threshold_mm: 0.5,
                min_trend_samples: 6,
                risk: RiskThresholds {
                    elevated: HysteresisBand { rising: 0.2, falling: 0.15 },
                    critical: HysteresisBand { rising: 1.0, falling: 0.8 },
                },
            },
            sink: SinkConfig::default(),
            database: DatabaseConfig::default(),
        }
    }

    /// Reject internally inconsistent settings
    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        self.sink.validate()?;
        Ok(())
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("atticguard"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Ingest pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Bluetooth company id our sensors advertise under
    #[serde(default = "default_company_id")]
    pub company_id: u16,

    /// Minimum receipt spacing for readings without a sequence number
    pub min_inter_arrival_ms: u64,

    /// Silence after which any sequence number is accepted (sensor reboot)
    #[serde(default)]
    pub sequence_resync_after_secs: Option<u64>,

    /// Age after which a sensor is reported stale
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_company_id() -> u16 {
    DEFAULT_COMPANY_ID
}

fn default_stale_after_secs() -> u64 {
    20 * 60
}

impl IngestConfig {
    pub fn min_inter_arrival(&self) -> Duration {
        Duration::from_millis(self.min_inter_arrival_ms)
    }

    pub fn sequence_resync_after(&self) -> Option<Duration> {
        self.sequence_resync_after_secs.map(Duration::from_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum samples kept per sensor
    pub window_capacity: usize,

    /// Samples older than this are evicted
    pub window_horizon_secs: u64,

    /// Horizon multiplier for sensors in low-power mode
    pub low_power_widening: f64,

    /// Prior samples averaged for the motion baseline
    pub baseline_len: usize,

    /// Displacement delta from baseline that counts as motion (mm, exclusive)
    pub motion_threshold_mm: f64,

    /// Samples required before a trend is scored
    pub min_trend_samples: usize,

    /// Risk boundaries on the displacement trend (mm/hour)
    pub risk: RiskThresholds,
}

impl AnalysisConfig {
    /// Effective time horizon for a sensor
    pub fn horizon(&self, low_power: bool) -> Duration {
        let base = Duration::from_secs(self.window_horizon_secs);
        if low_power {
            base.mul_f64(self.low_power_widening)
        } else {
            base
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_capacity < 2 {
            bail!("analysis.window_capacity must be at least 2");
        }
        if self.baseline_len == 0 || self.baseline_len > self.window_capacity {
            bail!("analysis.baseline_len must be between 1 and window_capacity");
        }
        if self.min_trend_samples < 2 || self.min_trend_samples > self.window_capacity {
            bail!("analysis.min_trend_samples must be between 2 and window_capacity");
        }
        if self.window_horizon_secs == 0 {
            bail!("analysis.window_horizon_secs must be positive");
        }
        if !(self.low_power_widening >= 1.0 && self.low_power_widening.is_finite()) {
            bail!("analysis.low_power_widening must be a finite value >= 1");
        }
        if !(self.motion_threshold_mm >= 0.0 && self.motion_threshold_mm.is_finite()) {
            bail!("analysis.motion_threshold_mm must be a finite value >= 0");
        }
        self.risk.validate()
    }
}

/// Rising/falling pair for one risk level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisBand {
    /// Score at or above which the level is entered
    pub rising: f64,
    /// Score below which the level is left
    pub falling: f64,
}

/// Risk level boundaries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub elevated: HysteresisBand,
    pub critical: HysteresisBand,
}

impl RiskThresholds {
    pub fn validate(&self) -> Result<()> {
        let e = self.elevated;
        let c = self.critical;
        for (name, band) in [("elevated", e), ("critical", c)] {
            if !(band.falling >= 0.0 && band.falling < band.rising && band.rising.is_finite()) {
                bail!("analysis.risk.{name}: need 0 <= falling < rising");
            }
        }
        if c.rising < e.rising || c.falling <= e.falling {
            bail!("analysis.risk.critical must sit above analysis.risk.elevated");
        }
        Ok(())
    }
}

/// Storage sink delivery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Maximum records per write
    pub batch_size: usize,

    /// How long a partial batch may wait for more records
    pub flush_interval_ms: u64,

    /// First retry delay
    pub initial_backoff_ms: u64,

    /// Retry delay ceiling
    pub max_backoff_ms: u64,

    /// Consecutive failures before escalating to the operator log
    pub alert_after_failures: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval_ms: 500,
            initial_backoff_ms: 250,
            max_backoff_ms: 30_000,
            alert_after_failures: 5,
        }
    }
}

impl SinkConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("sink.batch_size must be at least 1");
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            bail!("sink.initial_backoff_ms must not exceed sink.max_backoff_ms");
        }
        Ok(())
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Enable database storage
    pub enabled: bool,

    /// Database path
    pub path: PathBuf,

    /// Retention period in days
    pub retention_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./data/atticguard.db"),
            retention_days: 365,
        }
    }
}
