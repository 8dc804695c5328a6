// Level conversions between linear amplitude and decibels
//
// Raw frames are linear amplitudes (full scale = 1.0). Decibel values returned
// here are uncalibrated dBFS; the sampler adds the calibration offset.

/// Floor returned for silence or NaN input instead of -infinity
pub const SILENCE_DB: f64 = -200.0;

/// Convert a linear amplitude to decibels (20 * log10)
///
/// Negative amplitudes are treated by magnitude. Zero and NaN map to
/// [`SILENCE_DB`]; positive infinity stays infinite so the caller's clamp
/// treats it as a spike.
pub fn level_to_db(level: f64) -> f64 {
    let magnitude = level.abs();
    if magnitude.is_nan() || magnitude == 0.0 {
        return SILENCE_DB;
    }
    (20.0 * magnitude.log10()).max(SILENCE_DB)
}

/// Convert decibels back to a linear amplitude
pub fn db_to_level(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Root mean square of a PCM chunk, used as the raw level of one tick
pub fn frame_rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_to_db_reference_points() {
        assert!((level_to_db(1.0) - 0.0).abs() < 1e-12);
        assert!((level_to_db(0.1) + 20.0).abs() < 1e-9);
        assert!((level_to_db(0.001) + 60.0).abs() < 1e-9);
        assert!((level_to_db(-0.1) + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_level_to_db_silence_and_nan() {
        assert_eq!(level_to_db(0.0), SILENCE_DB);
        assert_eq!(level_to_db(f64::NAN), SILENCE_DB);
        assert_eq!(level_to_db(1e-300), SILENCE_DB);
        assert_eq!(level_to_db(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn test_db_to_level_inverts() {
        for db in [-60.0, -20.0, 0.0, 12.5] {
            assert!((level_to_db(db_to_level(db)) - db).abs() < 1e-9);
        }
    }

    #[test]
    fn test_frame_rms() {
        assert_eq!(frame_rms(&[]), 0.0);
        assert!((frame_rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-9);

        // Full-scale sine has RMS 1/sqrt(2)
        let sine: Vec<f32> = (0..4800)
            .map(|i| (2.0 * std::f32::consts::PI * 100.0 * i as f32 / 48_000.0).sin())
            .collect();
        assert!((frame_rms(&sine) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-3);
    }
}
