// ReportStore - retrying front for a ReportSink
//
// Transient failures and per-attempt timeouts are retried with capped
// exponential backoff. Rejections are final. Every attempt and every backoff
// sleep races the session token, so a cancelled session never reaches the sink
// again.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::config::StoreConfig;
use crate::error::{log_persistence_error, PersistenceError, SinkError};
use crate::report::Report;
use crate::session::SessionToken;
use crate::store::{ReportSink, SinkAck};
use crate::telemetry::{AttemptOutcome, MetricEvent, TelemetryCollector};

pub struct ReportStore {
    config: StoreConfig,
    sink: Arc<dyn ReportSink>,
    telemetry: Option<Arc<TelemetryCollector>>,
}

impl ReportStore {
    pub fn new(config: StoreConfig, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            config,
            sink,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryCollector>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn ReportSink> {
        &self.sink
    }

    /// Persist `report`, retrying per the store policy
    ///
    /// # Errors
    /// * `Cancelled` - `token` fired before or during an attempt or backoff
    /// * `Rejected` - the sink refused the report
    /// * `RetriesExhausted` - every attempt failed transiently or timed out
    pub async fn save(
        &self,
        report: &Report,
        token: &SessionToken,
    ) -> Result<SinkAck, PersistenceError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if token.is_cancelled() {
                return Err(self.cancelled(report, attempt));
            }

            if attempt > 1 {
                tracing::debug!(
                    sink = self.sink.name(),
                    session_id = %report.session_id,
                    attempt,
                    "Retrying report insert"
                );
            }

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = tokio::time::timeout(
                    self.config.attempt_timeout(),
                    self.sink.insert(report),
                ) => Some(result),
            };

            match outcome {
                None => return Err(self.cancelled(report, attempt)),
                Some(Ok(Ok(ack))) => {
                    self.record_attempt(report, attempt, AttemptOutcome::Acknowledged);
                    tracing::info!(
                        sink = self.sink.name(),
                        session_id = %report.session_id,
                        attempt,
                        created = ack.created,
                        "Report saved"
                    );
                    return Ok(ack);
                }
                Some(Ok(Err(SinkError::Rejected(reason)))) => {
                    self.record_attempt(report, attempt, AttemptOutcome::Rejected);
                    let err = PersistenceError::Rejected { reason };
                    self.report_failure(&err);
                    return Err(err);
                }
                Some(Ok(Err(SinkError::Transient(reason)))) => {
                    self.record_attempt(report, attempt, AttemptOutcome::Transient);
                    tracing::warn!(
                        sink = self.sink.name(),
                        attempt,
                        max_attempts,
                        "Transient insert failure: {}",
                        reason
                    );
                    last_error = reason;
                }
                Some(Err(_elapsed)) => {
                    self.record_attempt(report, attempt, AttemptOutcome::TimedOut);
                    last_error = format!(
                        "attempt timed out after {} ms",
                        self.config.attempt_timeout_ms
                    );
                    tracing::warn!(
                        sink = self.sink.name(),
                        attempt,
                        max_attempts,
                        "{}",
                        last_error
                    );
                }
            }

            if attempt < max_attempts {
                let delay = self.delay_for(attempt);
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(self.cancelled(report, attempt + 1)),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let err = PersistenceError::RetriesExhausted {
            attempts: max_attempts,
            last_error,
        };
        self.report_failure(&err);
        Err(err)
    }

    /// Backoff after failed attempt `attempt`, with jitter applied
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_for(attempt);
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let scale = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
        base.mul_f64(scale)
    }

    fn cancelled(&self, report: &Report, attempt: u32) -> PersistenceError {
        self.record_attempt(report, attempt, AttemptOutcome::Cancelled);
        tracing::info!(
            session_id = %report.session_id,
            attempt,
            "Session cancelled, dropping report save"
        );
        PersistenceError::Cancelled
    }

    fn record_attempt(&self, report: &Report, attempt: u32, outcome: AttemptOutcome) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.publish(MetricEvent::PersistenceAttempt {
                session_id: report.session_id,
                attempt,
                outcome,
            });
        }
    }

    fn report_failure(&self, err: &PersistenceError) {
        log_persistence_error(err, "ReportStore::save");
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_error(err, "report_store");
        }
    }
}
