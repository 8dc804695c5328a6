// CalibrationFactor - device-specific gain for the decibel sampler
//
// The factor multiplies raw amplitude before decibel conversion, which is the
// same as adding `20 * log10(factor)` dB to the raw level. A factor is fixed for
// the lifetime of a session; hosts persist the last successful one as JSON so
// the next session can skip the reference measurement.

use std::fs;
use std::path::Path;

use crate::error::CalibrationError;

/// Positive finite multiplier applied to raw amplitude
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct CalibrationFactor(f64);

impl CalibrationFactor {
    /// Unity gain: calibrated dB equals dBFS of the raw amplitude
    pub const UNITY: CalibrationFactor = CalibrationFactor(1.0);

    /// Validate and wrap a factor
    ///
    /// # Errors
    /// `CalibrationError::InvalidFactor` unless `0 < value < inf`
    pub fn new(value: f64) -> Result<Self, CalibrationError> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(CalibrationError::InvalidFactor { value })
        }
    }

    /// Build the factor that adds `offset_db` decibels to every reading
    pub fn from_offset_db(offset_db: f64) -> Result<Self, CalibrationError> {
        Self::new(10f64.powf(offset_db / 20.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Decibel offset equivalent to this factor
    pub fn offset_db(&self) -> f64 {
        20.0 * self.0.log10()
    }

    /// Load a previously saved factor
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let contents =
            fs::read_to_string(&path).map_err(|_| CalibrationError::NotCalibrated)?;
        let saved: SavedCalibration =
            serde_json::from_str(&contents).map_err(|_| CalibrationError::NotCalibrated)?;
        log::info!(
            "[Calibration] Loaded factor {:.6} ({:+.2} dB) from {:?}",
            saved.factor.value(),
            saved.factor.offset_db(),
            path.as_ref()
        );
        Ok(saved.factor)
    }

    /// Save this factor so a later session can reuse it
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&SavedCalibration { factor: *self })
            .map_err(std::io::Error::other)?;
        fs::write(path, json)
    }
}

impl TryFrom<f64> for CalibrationFactor {
    type Error = CalibrationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CalibrationFactor> for f64 {
    fn from(factor: CalibrationFactor) -> Self {
        factor.0
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SavedCalibration {
    factor: CalibrationFactor,
}
