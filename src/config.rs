//! Configuration system using Figment
//!
//! This module provides strongly-typed configuration loading for the anemometer core.
//! Configuration is loaded from:
//! 1. A TOML file (base configuration, e.g. `config/anemometer.toml`)
//! 2. Environment variables (prefixed with `ANEMOMETER_`, nested keys separated by `__`)
//!
//! Every numeric constant the algorithm depends on (tetrahedron angles, the count
//! offset, the notification interval) lives here so it can be swapped per sensor
//! hardware revision without touching the algorithm.
//!
//! # Example
//! ```no_run
//! use chirp_anemometer::config::AnemometerConfig;
//!
//! let config = AnemometerConfig::load_from("config/anemometer.toml")?;
//! config.validate()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), chirp_anemometer::error::AnemometerError>(())
//! ```

use crate::error::{AnemometerError, AppResult};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnemometerConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Transducer layout and tetrahedron constants
    #[serde(default)]
    pub geometry: GeometryConfig,
    /// ToF estimator constants
    #[serde(default)]
    pub estimator: EstimatorConfig,
    /// Output assembly and diagnostics
    #[serde(default)]
    pub output: OutputConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Recognised sensor hardware revisions.
///
/// The `geometry.profile` key selects which profile supplies the defaults for
/// [`GeometryConfig`] and [`EstimatorConfig`] in [`AnemometerConfig::load_from`];
/// individual keys in the configuration file still override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorProfile {
    /// First reference board: 60 mm edge tetrahedron, ports B/D/A/C.
    #[default]
    #[serde(rename = "reference_1_1")]
    Reference1_1,
}

impl SensorProfile {
    /// Geometry defaults for this revision.
    pub fn geometry(self) -> GeometryConfig {
        match self {
            SensorProfile::Reference1_1 => GeometryConfig {
                profile: self,
                // port 0 is B, port 1 is D, port 2 is A, port 3 is C
                port_to_index: [1, 3, 0, 2],
                separation_um: 60_000.0,
                initial_tof_us: 174.92,
                diagonal_tof_us: 1.0e-12,
                edge_angle_deg: 30.0,
                elevation_angle_deg: 54.74,
                azimuth_angle_deg: 60.0,
            },
        }
    }

    /// Estimator defaults for this revision.
    pub fn estimator(self) -> EstimatorConfig {
        match self {
            SensorProfile::Reference1_1 => EstimatorConfig {
                count_offset: -4,
                tof_scale: 8.0,
                freq_factor_divisor: 2048.0,
            },
        }
    }
}

/// Transducer layout configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Hardware revision these values were taken from
    #[serde(default)]
    pub profile: SensorProfile,
    /// Physical port number to matrix index; must be a permutation of 0..4
    pub port_to_index: [usize; 4],
    /// Edge length between any two transducers, in microns
    pub separation_um: f64,
    /// One-way ToF assumed for pairs not yet observed, in microseconds
    pub initial_tof_us: f64,
    /// Strictly positive sentinel stored on the ToF diagonal
    pub diagonal_tof_us: f64,
    /// Angle between the base edges and the x axis, in degrees
    pub edge_angle_deg: f64,
    /// Angle between the rising edges and the vertical, in degrees
    pub elevation_angle_deg: f64,
    /// Azimuth of the rising edges in the base plane, in degrees
    pub azimuth_angle_deg: f64,
}

/// ToF estimator constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Fixed sample-count offset applied to the interpolated index
    pub count_offset: i32,
    /// Multiplier turning samples/frequency into seconds
    pub tof_scale: f64,
    /// Fixed-point divisor of the raw `sample_freq_factor` register
    pub freq_factor_divisor: f64,
}

/// Output assembly configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Minimum wall-clock time between diagnostic annotations
    #[serde(with = "humantime_serde", default = "default_notify_interval")]
    pub notify_interval: Duration,
    /// Dump per-sample estimator diagnostics at debug level
    #[serde(default)]
    pub dump_bursts: bool,
    /// A reciprocal ToF older than this many bursts of the same device is stale
    #[serde(default = "default_stale_after_bursts")]
    pub stale_after_bursts: u64,
}

// Default value functions
fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_notify_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_stale_after_bursts() -> u64 {
    4
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "chirp-anemometer".to_string(),
            log_level: "info".to_string(),
            log_format: default_log_format(),
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        SensorProfile::default().geometry()
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        SensorProfile::default().estimator()
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            notify_interval: default_notify_interval(),
            dump_bursts: false,
            stale_after_bursts: default_stale_after_bursts(),
        }
    }
}

impl AnemometerConfig {
    /// Load configuration from a specific file path, layered over the defaults
    ///
    /// Environment variables can override configuration with prefix `ANEMOMETER_`.
    /// Example: `ANEMOMETER_ESTIMATOR__COUNT_OFFSET=-3`
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let overrides = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ANEMOMETER_").split("__"));

        let profile = if overrides.contains("geometry.profile") {
            overrides.extract_inner::<SensorProfile>("geometry.profile")?
        } else {
            SensorProfile::default()
        };

        let config = Figment::from(Serialized::defaults(Self::for_profile(profile)))
            .merge(overrides)
            .extract()?;
        Ok(config)
    }

    /// Defaults for every section, with geometry and estimator taken from `profile`.
    pub fn for_profile(profile: SensorProfile) -> Self {
        Self {
            geometry: profile.geometry(),
            estimator: profile.estimator(),
            ..Self::default()
        }
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(AnemometerError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(AnemometerError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let geometry = &self.geometry;
        if !(geometry.separation_um.is_finite() && geometry.separation_um > 0.0) {
            return Err(AnemometerError::Configuration(format!(
                "separation_um must be positive, got {}",
                geometry.separation_um
            )));
        }
        if !(geometry.initial_tof_us.is_finite() && geometry.initial_tof_us > 0.0) {
            return Err(AnemometerError::Configuration(format!(
                "initial_tof_us must be positive, got {}",
                geometry.initial_tof_us
            )));
        }
        if !(geometry.diagonal_tof_us.is_finite() && geometry.diagonal_tof_us > 0.0) {
            return Err(AnemometerError::Configuration(format!(
                "diagonal_tof_us must be a strictly positive sentinel, got {}",
                geometry.diagonal_tof_us
            )));
        }

        if !(self.estimator.freq_factor_divisor.is_finite()
            && self.estimator.freq_factor_divisor > 0.0)
        {
            return Err(AnemometerError::Configuration(format!(
                "freq_factor_divisor must be positive, got {}",
                self.estimator.freq_factor_divisor
            )));
        }
        if !(self.estimator.tof_scale.is_finite() && self.estimator.tof_scale > 0.0) {
            return Err(AnemometerError::Configuration(format!(
                "tof_scale must be positive, got {}",
                self.estimator.tof_scale
            )));
        }

        if self.output.stale_after_bursts == 0 {
            return Err(AnemometerError::Configuration(
                "stale_after_bursts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
