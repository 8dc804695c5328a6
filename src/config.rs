//! Configuration management for measurement tuning
//!
//! This module provides runtime configuration loading from JSON files so the
//! calibration reference, sampling cadence, noise bands and persistence retry
//! policy can be adjusted without recompilation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub calibration: CalibrationConfig,
    pub sampler: SamplerConfig,
    pub session: SessionConfig,
    pub report: ReportConfig,
    pub store: StoreConfig,
}

/// Calibration engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Decibel level the reference baseline is mapped to
    pub reference_floor_db: f64,
    /// Minimum reference window length, converted to samples via the tick cadence
    pub min_window_ms: u64,
    /// Baselines at or below this RMS amplitude count as silence
    pub degenerate_threshold: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            // Quiet room: the reference interval is taken while nobody is speaking
            reference_floor_db: 30.0,
            min_window_ms: 1000,
            // -120 dBFS
            degenerate_threshold: 1e-6,
        }
    }
}

/// Decibel sampler parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Interval between sampling ticks
    pub tick_interval_ms: u64,
    /// Lower clamp for calibrated readings
    pub min_db: f64,
    /// Upper clamp for calibrated readings
    pub max_db: f64,
    /// Frames buffered between audio source and session before dropping
    pub queue_capacity: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 125,
            min_db: 0.0,
            max_db: 140.0,
            queue_capacity: 64,
        }
    }
}

/// Session lifecycle parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions auto-complete once this much time has been measured
    pub max_duration_ms: u64,
    /// How often the pump drains the frame queue
    pub pump_interval_ms: u64,
    /// Buffered snapshots per observer before lagging
    pub observer_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: 60_000,
            pump_interval_ms: 25,
            observer_capacity: 64,
        }
    }
}

/// Report banding thresholds (lower bounds, dB)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub moderate_db: f64,
    pub loud_db: f64,
    pub harmful_db: f64,
    /// Half-to-half mean difference needed to call a rising/falling trend
    pub trend_threshold_db: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            moderate_db: 55.0,
            loud_db: 70.0,
            harmful_db: 85.0,
            trend_threshold_db: 3.0,
        }
    }
}

/// Report persistence retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Total insert attempts including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    /// Attempts exceeding this are abandoned and treated as transient failures
    pub attempt_timeout_ms: u64,
    /// Fractional +/- jitter applied to each backoff delay
    pub jitter: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 200,
            backoff_multiplier: 2.0,
            max_backoff_ms: 2_000,
            attempt_timeout_ms: 5_000,
            jitter: 0.1,
        }
    }
}

impl StoreConfig {
    /// Backoff before retry number `retry` (1-based), without jitter
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_backoff_ms as f64).max(0.0) as u64)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// Loaded configuration, or the defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Number of reference samples calibration needs at the configured cadence
    pub fn calibration_window_samples(&self) -> usize {
        let tick = self.sampler.tick_interval_ms.max(1);
        self.calibration.min_window_ms.div_ceil(tick).max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.calibration.reference_floor_db, 30.0);
        assert_eq!(config.sampler.tick_interval_ms, 125);
        assert_eq!(config.session.max_duration_ms, 60_000);
        assert_eq!(config.report.harmful_db, 85.0);
        assert_eq!(config.store.max_attempts, 4);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.sampler.max_db, config.sampler.max_db);
        assert_eq!(parsed.store.max_backoff_ms, config.store.max_backoff_ms);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "store": { "max_attempts": 7 } }"#).unwrap();
        assert_eq!(parsed.store.max_attempts, 7);
        assert_eq!(parsed.store.initial_backoff_ms, 200);
        assert_eq!(parsed.report.loud_db, 70.0);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/noise_meter.json");
        assert_eq!(config.sampler.queue_capacity, 64);
    }

    #[test]
    fn test_calibration_window_samples() {
        let mut config = AppConfig::default();
        assert_eq!(config.calibration_window_samples(), 8);

        config.sampler.tick_interval_ms = 300;
        assert_eq!(config.calibration_window_samples(), 4);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let store = StoreConfig::default();
        assert_eq!(store.backoff_for(1), Duration::from_millis(200));
        assert_eq!(store.backoff_for(2), Duration::from_millis(400));
        assert_eq!(store.backoff_for(3), Duration::from_millis(800));
        assert_eq!(store.backoff_for(10), Duration::from_millis(2_000));
    }
}
