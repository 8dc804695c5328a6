// ReportAssembler - pure aggregation over a completed session's readings

use std::collections::BTreeMap;

use crate::config::ReportConfig;
use crate::error::{log_report_error, ReportError};
use crate::report::{NoiseBand, Report, Trend, Verdict};
use crate::session::{Session, SessionState};

/// Harmful share at or above which the verdict is `FrequentlyHarmful`
const FREQUENTLY_HARMFUL_SHARE: f64 = 0.25;

/// Loud-or-harmful share at or above which the verdict is `OftenLoud`
const OFTEN_LOUD_SHARE: f64 = 0.5;

/// Builds [`Report`]s from completed sessions
///
/// Holds only the band thresholds; assembling the same session twice yields
/// identical reports.
#[derive(Debug, Clone)]
pub struct ReportAssembler {
    moderate_db: f64,
    loud_db: f64,
    harmful_db: f64,
    trend_threshold_db: f64,
}

impl ReportAssembler {
    /// Create an assembler with explicit band lower bounds (dB)
    pub fn new(moderate_db: f64, loud_db: f64, harmful_db: f64, trend_threshold_db: f64) -> Self {
        Self {
            moderate_db,
            loud_db,
            harmful_db,
            trend_threshold_db: trend_threshold_db.abs(),
        }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(
            config.moderate_db,
            config.loud_db,
            config.harmful_db,
            config.trend_threshold_db,
        )
    }

    /// Band a calibrated level falls into
    pub fn band_for(&self, db: f64) -> NoiseBand {
        if db >= self.harmful_db {
            NoiseBand::Harmful
        } else if db >= self.loud_db {
            NoiseBand::Loud
        } else if db >= self.moderate_db {
            NoiseBand::Moderate
        } else {
            NoiseBand::Quiet
        }
    }

    /// Aggregate a completed session into a report
    ///
    /// # Errors
    /// * `SessionNotCompleted` - cancelled, failed or still running
    /// * `EmptySession` - completed with zero readings
    pub fn assemble(&self, session: &Session) -> Result<Report, ReportError> {
        if session.state() != SessionState::Completed {
            let err = ReportError::SessionNotCompleted {
                state: session.state(),
            };
            log_report_error(&err, "assemble");
            return Err(err);
        }

        let levels: Vec<f64> = session.readings().iter().map(|r| r.calibrated_db).collect();
        if levels.is_empty() {
            let err = ReportError::EmptySession;
            log_report_error(&err, "assemble");
            return Err(err);
        }

        let average_db = mean(&levels);
        let peak_db = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min_db = levels.iter().copied().fold(f64::INFINITY, f64::min);

        let mut distribution: BTreeMap<NoiseBand, usize> =
            NoiseBand::ALL.iter().map(|band| (*band, 0)).collect();
        for db in &levels {
            *distribution.entry(self.band_for(*db)).or_insert(0) += 1;
        }

        let verdict = verdict_for(&distribution, levels.len());
        let trend = self.trend_for(&levels);

        log::info!(
            "[ReportAssembler] Session {}: avg {:.1} dB, peak {:.1} dB, {} readings, {:?}",
            session.id(),
            average_db,
            peak_db,
            levels.len(),
            verdict
        );

        Ok(Report {
            session_id: session.id(),
            average_db,
            peak_db,
            min_db,
            duration_ms: session.duration_ms().unwrap_or(0),
            reading_count: levels.len(),
            distribution,
            trend,
            verdict,
            conclusion: verdict.conclusion().to_string(),
        })
    }

    fn trend_for(&self, levels: &[f64]) -> Trend {
        if levels.len() < 2 {
            return Trend::Stable;
        }
        let (first, second) = levels.split_at(levels.len() / 2);
        let delta = mean(second) - mean(first);
        if delta > self.trend_threshold_db {
            Trend::Rising
        } else if delta < -self.trend_threshold_db {
            Trend::Falling
        } else {
            Trend::Stable
        }
    }
}

impl Default for ReportAssembler {
    fn default() -> Self {
        Self::from_config(&ReportConfig::default())
    }
}

fn verdict_for(distribution: &BTreeMap<NoiseBand, usize>, total: usize) -> Verdict {
    let count = |band| distribution.get(&band).copied().unwrap_or(0);
    let harmful = count(NoiseBand::Harmful);
    let loud = count(NoiseBand::Loud);
    let total = total as f64;

    if harmful as f64 / total >= FREQUENTLY_HARMFUL_SHARE {
        Verdict::FrequentlyHarmful
    } else if (harmful + loud) as f64 / total >= OFTEN_LOUD_SHARE {
        Verdict::OftenLoud
    } else if harmful > 0 {
        Verdict::SafeWithPeaks
    } else {
        Verdict::MostlySafe
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::level::db_to_level;
    use crate::audio::DecibelSampler;
    use crate::calibration::{CalibrationEngine, CalibrationFactor};
    use crate::session::{CalibrationInput, SessionStateMachine, StartRequest};

    fn completed_session(levels: &[f64]) -> SessionStateMachine {
        let mut machine = SessionStateMachine::new(
            CalibrationEngine::default(),
            DecibelSampler::default(),
            0,
            8,
        );
        machine
            .start(StartRequest {
                at_ms: 0,
                calibration: CalibrationInput::Reuse(CalibrationFactor::UNITY),
            })
            .unwrap();
        for (i, db) in levels.iter().enumerate() {
            machine
                .record_tick(db_to_level(*db), (i as u64 + 1) * 125)
                .unwrap();
        }
        machine.stop((levels.len() as u64 + 1) * 125).unwrap();
        machine
    }

    fn assemble(levels: &[f64]) -> Report {
        let machine = completed_session(levels);
        ReportAssembler::default()
            .assemble(machine.completed_session().unwrap())
            .unwrap()
    }

    #[test]
    fn test_average_and_peak() {
        let report = assemble(&[40.0, 60.0, 80.0]);
        assert!((report.average_db - 60.0).abs() < 1e-6);
        assert!((report.peak_db - 80.0).abs() < 1e-6);
        assert!((report.min_db - 40.0).abs() < 1e-6);
        assert_eq!(report.reading_count, 3);
        assert_eq!(report.duration_ms, 500);
    }

    #[test]
    fn test_distribution_has_every_band() {
        let report = assemble(&[40.0, 41.0]);
        assert_eq!(report.distribution.len(), 4);
        assert_eq!(report.band_count(NoiseBand::Quiet), 2);
        assert_eq!(report.band_count(NoiseBand::Harmful), 0);
        assert_eq!(report.verdict, Verdict::MostlySafe);
        assert_eq!(report.conclusion, Verdict::MostlySafe.conclusion());
    }

    #[test]
    fn test_band_boundaries_are_lower_inclusive() {
        let assembler = ReportAssembler::default();
        assert_eq!(assembler.band_for(54.99), NoiseBand::Quiet);
        assert_eq!(assembler.band_for(55.0), NoiseBand::Moderate);
        assert_eq!(assembler.band_for(70.0), NoiseBand::Loud);
        assert_eq!(assembler.band_for(84.9), NoiseBand::Loud);
        assert_eq!(assembler.band_for(85.0), NoiseBand::Harmful);
    }

    #[test]
    fn test_single_harmful_peak() {
        let report = assemble(&[60.0, 62.0, 58.0, 90.0, 61.0]);
        assert!((report.average_db - 66.2).abs() < 1e-6);
        assert!((report.peak_db - 90.0).abs() < 1e-6);
        assert_eq!(report.band_count(NoiseBand::Harmful), 1);
        assert_eq!(report.band_count(NoiseBand::Moderate), 4);
        assert_eq!(report.band_count(NoiseBand::Quiet), 0);
        assert_eq!(report.verdict, Verdict::SafeWithPeaks);
    }

    #[test]
    fn test_verdict_rules() {
        assert_eq!(
            assemble(&[90.0, 60.0, 60.0, 60.0]).verdict,
            Verdict::FrequentlyHarmful
        );
        assert_eq!(
            assemble(&[75.0, 75.0, 60.0, 60.0]).verdict,
            Verdict::OftenLoud
        );
        assert_eq!(
            assemble(&[90.0, 60.0, 60.0, 60.0, 60.0]).verdict,
            Verdict::SafeWithPeaks
        );
    }

    #[test]
    fn test_trend() {
        assert_eq!(assemble(&[50.0, 50.0, 60.0, 60.0]).trend, Trend::Rising);
        assert_eq!(assemble(&[60.0, 60.0, 50.0, 50.0]).trend, Trend::Falling);
        assert_eq!(assemble(&[60.0, 61.0, 60.0, 62.0]).trend, Trend::Stable);
        assert_eq!(assemble(&[60.0]).trend, Trend::Stable);
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let machine = completed_session(&[55.0, 72.0, 88.0]);
        let session = machine.completed_session().unwrap();
        let assembler = ReportAssembler::default();
        assert_eq!(
            assembler.assemble(session).unwrap(),
            assembler.assemble(session).unwrap()
        );
    }

    #[test]
    fn test_empty_session() {
        let machine = completed_session(&[]);
        let result = ReportAssembler::default().assemble(machine.completed_session().unwrap());
        assert_eq!(result, Err(ReportError::EmptySession));
    }

    #[test]
    fn test_running_session_is_rejected() {
        let mut machine = completed_session(&[]);
        machine.reset(10_000).unwrap();
        machine
            .start(StartRequest {
                at_ms: 0,
                calibration: CalibrationInput::Previous,
            })
            .unwrap();
        machine.record_tick(db_to_level(60.0), 10).unwrap();

        let result = ReportAssembler::default().assemble(machine.session().unwrap());
        assert_eq!(
            result,
            Err(ReportError::SessionNotCompleted {
                state: SessionState::Active
            })
        );
    }

    #[test]
    fn test_report_json_uses_band_names() {
        let report = assemble(&[60.0, 90.0]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["distribution"]["harmful"], 1);
        assert_eq!(json["distribution"]["quiet"], 0);
        assert_eq!(json["verdict"], "frequently_harmful");

        let parsed: Report = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.session_id, report.session_id);
        assert_eq!(parsed.distribution, report.distribution);
        assert_eq!(parsed.verdict, report.verdict);
    }
}
