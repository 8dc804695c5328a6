// CalibrationEngine - derive a calibration factor from a reference window
//
// The window is a short run of raw amplitude frames captured while the
// environment is quiet. Its RMS is the baseline, and the factor is chosen so the
// baseline lands on the configured reference floor:
//
//   20 * log10(baseline * factor) = reference_floor_db
//
// Calibration is a pure function of its input; whether to run it at session
// start or reuse a saved factor is the caller's decision.

use crate::calibration::state::CalibrationFactor;
use crate::config::AppConfig;
use crate::error::{log_calibration_error, CalibrationError};

/// Derives calibration factors from reference windows
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    /// Minimum samples in a reference window
    required_samples: usize,
    /// Decibel level the baseline maps to
    reference_floor_db: f64,
    /// RMS at or below which the input counts as silence
    degenerate_threshold: f64,
}

impl CalibrationEngine {
    pub fn new(required_samples: usize, reference_floor_db: f64, degenerate_threshold: f64) -> Self {
        Self {
            required_samples: required_samples.max(1),
            reference_floor_db,
            degenerate_threshold,
        }
    }

    /// Build from configuration, converting the minimum window duration into a
    /// sample count at the sampler's tick cadence
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.calibration_window_samples(),
            config.calibration.reference_floor_db,
            config.calibration.degenerate_threshold,
        )
    }

    pub fn required_samples(&self) -> usize {
        self.required_samples
    }

    pub fn reference_floor_db(&self) -> f64 {
        self.reference_floor_db
    }

    /// Compute a calibration factor from a reference window
    ///
    /// # Returns
    /// * `Ok(CalibrationFactor)` - Positive factor mapping the baseline to the reference floor
    /// * `Err(CalibrationError)` - Window too short, silent, or non-finite
    pub fn calibrate(&self, window: &[f64]) -> Result<CalibrationFactor, CalibrationError> {
        self.derive_factor(window)
            .inspect_err(|err| log_calibration_error(err, "calibrate"))
    }

    fn derive_factor(&self, window: &[f64]) -> Result<CalibrationFactor, CalibrationError> {
        if window.len() < self.required_samples {
            return Err(CalibrationError::InsufficientSamples {
                required: self.required_samples,
                collected: window.len(),
            });
        }

        if let Some(idx) = window.iter().position(|sample| !sample.is_finite()) {
            return Err(CalibrationError::DegenerateSignal {
                reason: format!("sample {} is not finite", idx),
            });
        }

        let baseline = Self::baseline(window);
        if baseline <= self.degenerate_threshold {
            return Err(CalibrationError::DegenerateSignal {
                reason: format!(
                    "baseline {:.3e} at or below {:.3e} (no input?)",
                    baseline, self.degenerate_threshold
                ),
            });
        }

        let target_amplitude = 10f64.powf(self.reference_floor_db / 20.0);
        let factor = CalibrationFactor::new(target_amplitude / baseline)?;

        log::info!(
            "[CalibrationEngine] Baseline RMS {:.6} over {} samples -> factor {:.4} ({:+.2} dB)",
            baseline,
            window.len(),
            factor.value(),
            factor.offset_db()
        );

        Ok(factor)
    }

    /// RMS of the absolute amplitudes
    fn baseline(window: &[f64]) -> f64 {
        let sum_sq: f64 = window.iter().map(|s| s * s).sum();
        (sum_sq / window.len() as f64).sqrt()
    }
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::level::level_to_db;

    fn engine() -> CalibrationEngine {
        CalibrationEngine::new(8, 30.0, 1e-6)
    }

    #[test]
    fn test_insufficient_samples() {
        let result = engine().calibrate(&[0.01; 5]);
        assert_eq!(
            result,
            Err(CalibrationError::InsufficientSamples {
                required: 8,
                collected: 5
            })
        );
    }

    #[test]
    fn test_silence_is_degenerate() {
        let result = engine().calibrate(&[0.0; 8]);
        assert!(matches!(
            result,
            Err(CalibrationError::DegenerateSignal { .. })
        ));

        let result = engine().calibrate(&[1e-9; 8]);
        assert!(matches!(
            result,
            Err(CalibrationError::DegenerateSignal { .. })
        ));
    }

    #[test]
    fn test_non_finite_sample_is_degenerate() {
        let mut window = vec![0.01; 8];
        window[3] = f64::NAN;
        match engine().calibrate(&window) {
            Err(CalibrationError::DegenerateSignal { reason }) => {
                assert!(reason.contains("sample 3"));
            }
            other => panic!("Expected DegenerateSignal, got {:?}", other),
        }
    }

    #[test]
    fn test_baseline_maps_to_reference_floor() {
        let window = vec![0.002; 10];
        let factor = engine().calibrate(&window).unwrap();

        assert!(factor.value() > 0.0);
        let calibrated = level_to_db(0.002) + factor.offset_db();
        assert!((calibrated - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_is_rms_of_window() {
        // RMS of alternating +/-0.01 is 0.01 regardless of sign
        let window: Vec<f64> = (0..8)
            .map(|i| if i % 2 == 0 { 0.01 } else { -0.01 })
            .collect();
        let factor = engine().calibrate(&window).unwrap();
        let expected = 10f64.powf(30.0 / 20.0) / 0.01;
        assert!((factor.value() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_calibration_is_deterministic() {
        let window = vec![0.004, 0.005, 0.0045, 0.006, 0.0052, 0.0048, 0.0051, 0.0049];
        let first = engine().calibrate(&window).unwrap();
        let second = engine().calibrate(&window).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_from_config_uses_tick_cadence() {
        let engine = CalibrationEngine::from_config(&AppConfig::default());
        assert_eq!(engine.required_samples(), 8);
        assert_eq!(engine.reference_floor_db(), 30.0);
    }
}
