// SPDX-License-Identifier: MPL-2.0
//! Decoder configuration, loaded from and saved to a `decoder.toml` file.
//!
//! Every field has a default, so a partial (or empty) file is valid. Values
//! are clamped into their supported ranges by [`DecoderConfig::sanitized`],
//! which the resolver applies before use.
//!
//! # Examples
//!
//! ```no_run
//! use seekframe::config::{self, DecoderConfig};
//!
//! // Load existing configuration
//! let mut config = config::load().unwrap_or_default();
//!
//! // Modify a setting
//! config.frame_cache_capacity = 16;
//!
//! // Save the modified configuration
//! config::save(&config).expect("Failed to save config");
//! ```

pub mod defaults;

use crate::domain::{HardwareDeviceKind, OutputPixelFormat, ScalingQuality};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use defaults::*;

const CONFIG_FILE: &str = "decoder.toml";
const APP_NAME: &str = "seekframe";

/// Tuning for frame resolution on one media resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Number of decoded frames kept in the rolling cache.
    pub frame_cache_capacity: usize,
    /// Forward gap, in seconds, above which the resolver seeks.
    pub seek_forward_threshold_secs: f64,
    /// Cache-hit tolerance, in native frame periods.
    pub frame_tolerance_periods: f64,
    /// Frame rate assumed when the stream reports none.
    pub fallback_frame_rate: f64,
    pub hardware: HardwareSettings,
    pub output: OutputSettings,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            frame_cache_capacity: DEFAULT_FRAME_CACHE_CAPACITY,
            seek_forward_threshold_secs: DEFAULT_SEEK_FORWARD_THRESHOLD_SECS,
            frame_tolerance_periods: DEFAULT_FRAME_TOLERANCE_PERIODS,
            fallback_frame_rate: DEFAULT_FALLBACK_FRAME_RATE,
            hardware: HardwareSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl DecoderConfig {
    /// Returns a copy with every numeric field clamped into its supported range.
    ///
    /// Non-finite values fall back to their defaults.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        fn clamp_f64(value: f64, min: f64, max: f64, default: f64) -> f64 {
            if value.is_finite() {
                value.clamp(min, max)
            } else {
                default
            }
        }

        Self {
            frame_cache_capacity: self
                .frame_cache_capacity
                .clamp(MIN_FRAME_CACHE_CAPACITY, MAX_FRAME_CACHE_CAPACITY),
            seek_forward_threshold_secs: clamp_f64(
                self.seek_forward_threshold_secs,
                MIN_SEEK_FORWARD_THRESHOLD_SECS,
                MAX_SEEK_FORWARD_THRESHOLD_SECS,
                DEFAULT_SEEK_FORWARD_THRESHOLD_SECS,
            ),
            frame_tolerance_periods: clamp_f64(
                self.frame_tolerance_periods,
                MIN_FRAME_TOLERANCE_PERIODS,
                MAX_FRAME_TOLERANCE_PERIODS,
                DEFAULT_FRAME_TOLERANCE_PERIODS,
            ),
            fallback_frame_rate: clamp_f64(
                self.fallback_frame_rate,
                MIN_FALLBACK_FRAME_RATE,
                MAX_FALLBACK_FRAME_RATE,
                DEFAULT_FALLBACK_FRAME_RATE,
            ),
            hardware: self.hardware.clone(),
            output: self.output,
        }
    }

    /// Same configuration with hardware decoding switched off.
    #[must_use]
    pub fn software_only(mut self) -> Self {
        self.hardware.enabled = false;
        self
    }
}

/// Hardware decode preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareSettings {
    /// Attempt hardware decoding at all.
    pub enabled: bool,
    /// Candidate devices, tried in order until one can be created.
    pub preferred_devices: Vec<HardwareDeviceKind>,
}

impl Default for HardwareSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            preferred_devices: HardwareDeviceKind::platform_defaults(),
        }
    }
}

/// Format of frames handed to the render layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub pixel_format: OutputPixelFormat,
    pub scaling: ScalingQuality,
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

/// Loads the configuration from the user's config directory.
///
/// Returns defaults when no file exists.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn load() -> Result<DecoderConfig> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(DecoderConfig::default())
}

/// Saves the configuration to the user's config directory.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save(config: &DecoderConfig) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

/// Loads the configuration from `path`.
///
/// A file that is not valid TOML yields the defaults, with a warning.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn load_from_path(path: &Path) -> Result<DecoderConfig> {
    let content = fs::read_to_string(path)?;
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "invalid decoder config, using defaults");
            Ok(DecoderConfig::default())
        }
    }
}

/// Saves the configuration to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn save_to_path(config: &DecoderConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip_preserves_fields() {
        let config = DecoderConfig {
            frame_cache_capacity: 12,
            seek_forward_threshold_secs: 3.0,
            hardware: HardwareSettings {
                enabled: false,
                preferred_devices: vec![HardwareDeviceKind::Vaapi],
            },
            output: OutputSettings {
                pixel_format: OutputPixelFormat::Bgra,
                scaling: ScalingQuality::Bilinear,
            },
            ..DecoderConfig::default()
        };
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("decoder.toml");

        save_to_path(&config, &config_path).expect("failed to save config");
        let loaded = load_from_path(&config_path).expect("failed to load config");

        assert_eq!(loaded, config);
    }

    #[test]
    fn load_from_path_returns_default_on_invalid_toml() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("decoder.toml");
        fs::write(&config_path, "not = valid = toml").expect("failed to write invalid toml");

        let loaded = load_from_path(&config_path).expect("load should not error");
        assert_eq!(loaded, DecoderConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("decoder.toml");
        fs::write(
            &config_path,
            "frame_cache_capacity = 4\n[output]\npixel_format = \"bgra\"\n",
        )
        .expect("failed to write config");

        let loaded = load_from_path(&config_path).expect("load should not error");
        assert_eq!(loaded.frame_cache_capacity, 4);
        assert_eq!(loaded.output.pixel_format, OutputPixelFormat::Bgra);
        assert_eq!(loaded.output.scaling, ScalingQuality::Bicubic);
        assert!(loaded.hardware.enabled);
    }

    #[test]
    fn load_from_missing_path_is_io_error() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let result = load_from_path(&temp_dir.path().join("absent.toml"));
        assert!(matches!(result, Err(crate::error::Error::Io(_))));
    }

    #[test]
    fn sanitized_clamps_out_of_range_values() {
        let config = DecoderConfig {
            frame_cache_capacity: 0,
            seek_forward_threshold_secs: 1_000.0,
            frame_tolerance_periods: f64::NAN,
            fallback_frame_rate: -5.0,
            ..DecoderConfig::default()
        };

        let clean = config.sanitized();
        assert_eq!(clean.frame_cache_capacity, MIN_FRAME_CACHE_CAPACITY);
        assert_eq!(clean.seek_forward_threshold_secs, MAX_SEEK_FORWARD_THRESHOLD_SECS);
        assert_eq!(clean.frame_tolerance_periods, DEFAULT_FRAME_TOLERANCE_PERIODS);
        assert_eq!(clean.fallback_frame_rate, MIN_FALLBACK_FRAME_RATE);
    }

    #[test]
    fn default_config_matches_defaults_module() {
        let config = DecoderConfig::default();
        assert_eq!(config.frame_cache_capacity, DEFAULT_FRAME_CACHE_CAPACITY);
        assert_eq!(config.output.pixel_format, OutputPixelFormat::Rgba);
        assert!(!config.software_only().hardware.enabled);
    }
}
