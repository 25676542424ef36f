//! Configuration management for Cellway
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::CellwayError;
use crate::proximity::ProximitySettings;
use crate::scoring::ScoringWeights;
use crate::selector::SelectionWeights;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellwayConfig {
    /// Route provider settings
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Tower provider settings
    #[serde(default)]
    pub towers: TowerConfig,
    /// Proximity filter thresholds
    #[serde(default)]
    pub proximity: ProximitySettings,
    /// Signal score weights
    #[serde(default)]
    pub scoring: ScoringWeights,
    /// Variant selection weights
    #[serde(default)]
    pub selection: SelectionWeights,
    /// Result cache settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Route provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Base URL of the routing backend
    #[serde(default = "default_routing_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    /// Maximum number of retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Alternatives requested from backends without weighted routing
    #[serde(default = "default_alternatives")]
    pub alternatives: u32,
}

/// Where tower records come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TowerSource {
    Http,
    Csv,
}

/// Tower provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TowerConfig {
    #[serde(default = "default_tower_source")]
    pub source: TowerSource,
    /// Base URL of the tower service (http source)
    #[serde(default = "default_routing_base_url")]
    pub base_url: String,
    /// OpenCelliD export (csv source)
    #[serde(default = "default_csv_path")]
    pub csv_path: String,
    /// Maximum towers returned per bounding box
    #[serde(default = "default_max_towers")]
    pub max_towers: usize,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in minutes
    #[serde(default = "default_cache_ttl")]
    pub ttl_minutes: u32,
    /// Decimal digits kept from endpoint coordinates in cache keys
    #[serde(default = "default_key_precision")]
    pub key_precision: u32,
    /// Decimal digits tower bounding boxes are rounded outward to
    #[serde(default = "default_tower_box_precision")]
    pub tower_box_precision: u32,
    /// Directory of the persistent cache, memory only when unset
    #[serde(default)]
    pub location: Option<String>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_routing_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_timeout() -> u32 {
    20
}

fn default_max_retries() -> u32 {
    2
}

fn default_alternatives() -> u32 {
    5
}

fn default_tower_source() -> TowerSource {
    TowerSource::Http
}

fn default_csv_path() -> String {
    "data/cell_towers.csv".to_string()
}

fn default_max_towers() -> usize {
    500
}

fn default_cache_ttl() -> u32 {
    30
}

fn default_key_precision() -> u32 {
    6
}

fn default_tower_box_precision() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: default_routing_base_url(),
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            alternatives: default_alternatives(),
        }
    }
}

impl Default for TowerConfig {
    fn default() -> Self {
        Self {
            source: default_tower_source(),
            base_url: default_routing_base_url(),
            csv_path: default_csv_path(),
            max_towers: default_max_towers(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_cache_ttl(),
            key_precision: default_key_precision(),
            tower_box_precision: default_tower_box_precision(),
            location: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl CellwayConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // CELLWAY_ROUTING__BASE_URL and friends
        builder = builder.add_source(
            Environment::with_prefix("CELLWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: CellwayConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cellway").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.routing.base_url.is_empty() {
            self.routing.base_url = default_routing_base_url();
        }
        if self.routing.timeout_seconds == 0 {
            self.routing.timeout_seconds = default_timeout();
        }
        if self.routing.alternatives == 0 {
            self.routing.alternatives = default_alternatives();
        }
        if self.towers.base_url.is_empty() {
            self.towers.base_url = self.routing.base_url.clone();
        }
        if self.towers.timeout_seconds == 0 {
            self.towers.timeout_seconds = default_timeout();
        }
        if self.towers.max_towers == 0 {
            self.towers.max_towers = default_max_towers();
        }
        if self.cache.ttl_minutes == 0 {
            self.cache.ttl_minutes = default_cache_ttl();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_weights()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.routing.timeout_seconds > 300 || self.towers.timeout_seconds > 300 {
            return Err(CellwayError::config("Provider timeout cannot exceed 300 seconds").into());
        }

        if self.routing.max_retries > 10 {
            return Err(CellwayError::config("Provider max retries cannot exceed 10").into());
        }

        if self.routing.alternatives > 10 {
            return Err(CellwayError::config("Route alternatives cannot exceed 10").into());
        }

        if self.cache.ttl_minutes > 24 * 60 {
            return Err(CellwayError::config("Cache TTL cannot exceed 24 hours").into());
        }

        if self.cache.key_precision > 8 {
            return Err(CellwayError::config("Cache key precision cannot exceed 8 digits").into());
        }

        if self.cache.tower_box_precision > 6 {
            return Err(
                CellwayError::config("Tower box precision cannot exceed 6 digits").into(),
            );
        }

        let p = &self.proximity;
        if p.max_distance_meters <= 0.0 || p.max_distance_meters > 50_000.0 {
            return Err(CellwayError::config(
                "Proximity max distance must be within (0, 50000] meters",
            )
            .into());
        }

        if p.near_tier_meters > p.mid_tier_meters {
            return Err(CellwayError::config(
                "Near sampling tier cannot extend past the middle tier",
            )
            .into());
        }

        Ok(())
    }

    fn validate_weights(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        let s = &self.selection;
        for (name, value) in [
            ("selection.cell_coverage_weight", s.cell_coverage_weight),
            ("selection.balanced_weight", s.balanced_weight),
            ("selection.balanced_signal_share", s.balanced_signal_share),
            ("scoring.signal_weight", self.scoring.signal_weight),
            ("scoring.count_weight", self.scoring.count_weight),
        ] {
            if !unit.contains(&value) {
                return Err(CellwayError::config(format!("{name} must be within [0, 1]")).into());
            }
        }

        if self.scoring.dbm_per_point <= 0.0 {
            return Err(CellwayError::config("scoring.dbm_per_point must be positive").into());
        }

        if s.duration_slack <= 0.0 {
            return Err(CellwayError::config("selection.duration_slack must be positive").into());
        }

        Ok(())
    }

    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(CellwayError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(CellwayError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for url in [&self.routing.base_url, &self.towers.base_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(CellwayError::config(format!(
                    "Provider base URL '{url}' must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        Ok(())
    }
}
