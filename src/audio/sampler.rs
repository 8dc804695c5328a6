// DecibelSampler - raw amplitude frame to calibrated reading
//
// calibrated_db = level_to_db(raw) + factor.offset_db(), clamped to the
// plausible physical range. Out-of-range values are clamped rather than dropped
// so a transient spike still occupies its tick in the session timeline.
//
// The sampler is stateless; cadence belongs to whoever feeds it.

use crate::audio::level::level_to_db;
use crate::calibration::CalibrationFactor;
use crate::config::SamplerConfig;
use crate::session::Reading;

/// Stateless converter from raw amplitude frames to readings
#[derive(Debug, Clone, Copy)]
pub struct DecibelSampler {
    min_db: f64,
    max_db: f64,
}

impl DecibelSampler {
    /// Create a sampler clamping readings to `[min_db, max_db]`
    ///
    /// Bounds given in the wrong order are swapped.
    pub fn new(min_db: f64, max_db: f64) -> Self {
        Self {
            min_db: min_db.min(max_db),
            max_db: max_db.max(min_db),
        }
    }

    pub fn from_config(config: &SamplerConfig) -> Self {
        Self::new(config.min_db, config.max_db)
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min_db, self.max_db)
    }

    /// Calibrated decibel level for one raw frame
    pub fn calibrated_db(&self, raw_frame: f64, factor: &CalibrationFactor) -> f64 {
        (level_to_db(raw_frame) + factor.offset_db()).clamp(self.min_db, self.max_db)
    }

    /// Produce a reading for one sampling tick
    pub fn sample(&self, raw_frame: f64, factor: &CalibrationFactor, now_ms: u64) -> Reading {
        Reading {
            timestamp_ms: now_ms,
            raw_level: raw_frame,
            calibrated_db: self.calibrated_db(raw_frame, factor),
        }
    }
}

impl Default for DecibelSampler {
    fn default() -> Self {
        Self::from_config(&SamplerConfig::default())
    }
}
