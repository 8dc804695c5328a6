// SessionStateMachine - the only owner and writer of the measurement session
//
// One tagged phase replaces the recording/error/status flags a UI would
// otherwise juggle. Each phase carries exactly the data that exists in it, so
// "not recording but holding a live error" cannot be represented.
//
// Timestamps are supplied by the caller (frame timestamps or a host clock); the
// machine never reads the wall clock, which keeps every transition
// deterministic under test.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::audio::DecibelSampler;
use crate::calibration::{CalibrationEngine, CalibrationFactor};
use crate::config::AppConfig;
use crate::error::{log_session_error, CalibrationError, ErrorCode, ErrorSummary, SessionError};
use crate::session::{Reading, Session, SessionId, SessionSnapshot, SessionState, SessionToken};
use crate::telemetry::{MetricEvent, TelemetryCollector};

/// Where the session's calibration factor comes from
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationInput {
    /// Run the calibration engine on a fresh reference window
    Window(Vec<f64>),
    /// Use a factor supplied by the caller (e.g. loaded from disk)
    Reuse(CalibrationFactor),
    /// Use the last factor this machine calibrated or accepted successfully
    Previous,
}

/// Start request for [`SessionStateMachine::start`]
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub at_ms: u64,
    pub calibration: CalibrationInput,
}

/// Result of feeding one sampling tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Recorded(Reading),
    /// Tick fell past the maximum duration; the session completed instead
    TimedOut { stopped_at_ms: u64 },
}

#[derive(Debug)]
enum Phase {
    Idle,
    Starting {
        id: SessionId,
        token: SessionToken,
    },
    Active {
        session: Session,
        token: SessionToken,
    },
    Completed {
        session: Session,
        token: SessionToken,
    },
    Cancelled {
        id: SessionId,
        token: SessionToken,
    },
    Failed {
        id: SessionId,
        session: Option<Session>,
        error: SessionError,
        token: SessionToken,
    },
}

pub struct SessionStateMachine {
    phase: Phase,
    calibration: CalibrationEngine,
    sampler: DecibelSampler,
    /// Zero disables the bound
    max_duration_ms: u64,
    last_factor: Option<CalibrationFactor>,
    missed_samples: u64,
    observer: broadcast::Sender<SessionSnapshot>,
    telemetry: Option<Arc<TelemetryCollector>>,
}

impl SessionStateMachine {
    pub fn new(
        calibration: CalibrationEngine,
        sampler: DecibelSampler,
        max_duration_ms: u64,
        observer_capacity: usize,
    ) -> Self {
        let (observer, _) = broadcast::channel(observer_capacity.max(1));
        Self {
            phase: Phase::Idle,
            calibration,
            sampler,
            max_duration_ms,
            last_factor: None,
            missed_samples: 0,
            observer,
            telemetry: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            CalibrationEngine::from_config(config),
            DecibelSampler::from_config(&config.sampler),
            config.session.max_duration_ms,
            config.session.observer_capacity,
        )
    }

    /// Mirror transitions and missed samples into a telemetry collector
    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryCollector>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Seed the factor used by [`CalibrationInput::Previous`]
    pub fn with_previous_factor(mut self, factor: CalibrationFactor) -> Self {
        self.last_factor = Some(factor);
        self
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    /// `idle -> starting`
    ///
    /// Mints the session id and cancellation token. The caller then collects
    /// the reference window (if any) and calls [`finish_start`](Self::finish_start).
    ///
    /// # Errors
    /// `SessionAlreadyActive` unless idle
    pub fn begin_start(&mut self, at_ms: u64) -> Result<SessionId, SessionError> {
        if !matches!(self.phase, Phase::Idle) {
            let err = SessionError::SessionAlreadyActive {
                state: self.state(),
            };
            log_session_error(&err, "begin_start");
            return Err(err);
        }

        let id = SessionId::new();
        self.missed_samples = 0;
        self.enter(
            Phase::Starting {
                id,
                token: SessionToken::new(),
            },
            at_ms,
        );
        Ok(id)
    }

    /// `starting -> active` on calibration success, `starting -> error` otherwise
    ///
    /// `at_ms` becomes the session's `started_at_ms`.
    pub fn finish_start(
        &mut self,
        input: CalibrationInput,
        at_ms: u64,
    ) -> Result<SessionId, SessionError> {
        let (id, token) = match &self.phase {
            Phase::Starting { id, token } => (*id, token.clone()),
            _ => return Err(self.invalid("finish start")),
        };

        let factor = match input {
            CalibrationInput::Window(window) => self.calibration.calibrate(&window),
            CalibrationInput::Reuse(factor) => Ok(factor),
            CalibrationInput::Previous => self.last_factor.ok_or(CalibrationError::NotCalibrated),
        };

        match factor {
            Ok(factor) => {
                self.last_factor = Some(factor);
                self.enter(
                    Phase::Active {
                        session: Session::new(id, at_ms, factor),
                        token,
                    },
                    at_ms,
                );
                log::info!(
                    "[SessionStateMachine] Session {} active at {} ms, calibration {:+.2} dB",
                    id,
                    at_ms,
                    factor.offset_db()
                );
                Ok(id)
            }
            Err(cal_err) => {
                let err = SessionError::Calibration(cal_err);
                log_session_error(&err, "finish_start");
                self.record_error(&err);
                self.enter(
                    Phase::Failed {
                        id,
                        session: None,
                        error: err.clone(),
                        token,
                    },
                    at_ms,
                );
                Err(err)
            }
        }
    }

    /// `begin_start` followed by `finish_start` at the same timestamp
    pub fn start(&mut self, request: StartRequest) -> Result<SessionId, SessionError> {
        self.begin_start(request.at_ms)?;
        self.finish_start(request.calibration, request.at_ms)
    }

    /// Append one reading while active
    ///
    /// # Errors
    /// * `InvalidTransition` - not active
    /// * `OutOfOrderTick` - timestamp before the session start or not after the
    ///   previous reading; the tick is counted as a missed sample
    pub fn record_tick(&mut self, raw_frame: f64, at_ms: u64) -> Result<TickOutcome, SessionError> {
        let (started_at_ms, next_allowed, previous_ms, factor) = match &self.phase {
            Phase::Active { session, .. } => (
                session.started_at_ms(),
                session.next_allowed_timestamp(),
                session
                    .latest_reading()
                    .map(|r| r.timestamp_ms)
                    .unwrap_or(session.started_at_ms()),
                session.calibration_factor(),
            ),
            _ => return Err(self.invalid("record tick")),
        };

        if next_allowed.map_or(true, |allowed| at_ms < allowed) {
            self.record_missed(1);
            let err = SessionError::OutOfOrderTick {
                previous_ms,
                received_ms: at_ms,
            };
            log::debug!("[SessionStateMachine] Dropping tick: {}", err.message());
            return Err(err);
        }

        if self.max_duration_ms > 0 && at_ms - started_at_ms > self.max_duration_ms {
            let stopped_at_ms = started_at_ms + self.max_duration_ms;
            log::info!(
                "[SessionStateMachine] Maximum duration {} ms reached, completing session",
                self.max_duration_ms
            );
            self.complete(stopped_at_ms)?;
            return Ok(TickOutcome::TimedOut { stopped_at_ms });
        }

        let reading = self.sampler.sample(raw_frame, &factor, at_ms);
        if let Phase::Active { session, .. } = &mut self.phase {
            session.readings.push(reading);
        }
        self.publish(None, at_ms);
        Ok(TickOutcome::Recorded(reading))
    }

    /// `active -> stopping -> completed`
    ///
    /// `stopped_at_ms` is `at_ms`, moved forward to the last reading if needed.
    pub fn stop(&mut self, at_ms: u64) -> Result<(), SessionError> {
        if !matches!(self.phase, Phase::Active { .. }) {
            return Err(self.invalid("stop"));
        }
        self.complete(at_ms)
    }

    /// `starting | active -> cancelled`
    ///
    /// Readings are discarded and the session token is cancelled so in-flight
    /// work for this session is dropped.
    pub fn cancel(&mut self, at_ms: u64) -> Result<(), SessionError> {
        let (id, token) = match &self.phase {
            Phase::Starting { id, token } => (*id, token.clone()),
            Phase::Active { session, token } => (session.id(), token.clone()),
            _ => return Err(self.invalid("cancel")),
        };

        token.cancel();
        let discarded = self.session().map(|s| s.readings().len()).unwrap_or(0);
        self.enter(Phase::Cancelled { id, token }, at_ms);
        log::info!(
            "[SessionStateMachine] Session {} cancelled, {} readings discarded",
            id,
            discarded
        );
        Ok(())
    }

    /// Audio source failure: `starting | active -> error`
    ///
    /// Readings collected so far are kept for diagnostics; no report can be
    /// assembled from them.
    pub fn fail(&mut self, reason: impl Into<String>, at_ms: u64) -> Result<(), SessionError> {
        let err = SessionError::SourceFailed {
            reason: reason.into(),
        };

        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        let next = match phase {
            Phase::Starting { id, token } => Phase::Failed {
                id,
                session: None,
                error: err.clone(),
                token,
            },
            Phase::Active { mut session, token } => {
                session.close(SessionState::Error, at_ms);
                session.error = Some(err.clone());
                Phase::Failed {
                    id: session.id(),
                    session: Some(session),
                    error: err.clone(),
                    token,
                }
            }
            other => {
                self.phase = other;
                return Err(self.invalid("fail"));
            }
        };

        let from = if matches!(next, Phase::Failed { session: None, .. }) {
            SessionState::Starting
        } else {
            SessionState::Active
        };
        log_session_error(&err, "fail");
        self.record_error(&err);
        self.phase = next;
        self.announce(from, at_ms);
        Ok(())
    }

    /// Terminal state -> idle; clears duration, readings and last error
    ///
    /// A failed session's token is cancelled. A completed session's token is
    /// left alone so a save of its report still in flight runs to the end.
    /// A no-op when already idle.
    pub fn reset(&mut self, at_ms: u64) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Idle => Ok(()),
            state if state.is_terminal() => {
                if state == SessionState::Error {
                    if let Some(token) = self.token() {
                        token.cancel();
                    }
                }
                self.missed_samples = 0;
                self.enter(Phase::Idle, at_ms);
                Ok(())
            }
            _ => Err(self.invalid("reset")),
        }
    }

    /// Add frames dropped upstream (queue overflow) to the missed-sample count
    pub fn record_missed(&mut self, count: u64) {
        if count == 0 {
            return;
        }
        self.missed_samples += count;
        if let Some(telemetry) = &self.telemetry {
            telemetry.publish(MetricEvent::MissedSamples {
                session_id: self.session_id(),
                dropped: count,
                total: self.missed_samples,
            });
        }
    }

    // ========================================================================
    // OBSERVATION
    // ========================================================================

    pub fn state(&self) -> SessionState {
        match &self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Starting { .. } => SessionState::Starting,
            Phase::Active { .. } => SessionState::Active,
            Phase::Completed { .. } => SessionState::Completed,
            Phase::Cancelled { .. } => SessionState::Cancelled,
            Phase::Failed { .. } => SessionState::Error,
        }
    }

    /// Current session record, if one exists in this phase
    ///
    /// Cancelled sessions and calibration failures have none.
    pub fn session(&self) -> Option<&Session> {
        match &self.phase {
            Phase::Active { session, .. } | Phase::Completed { session, .. } => Some(session),
            Phase::Failed { session, .. } => session.as_ref(),
            _ => None,
        }
    }

    /// The session, only once it has completed
    pub fn completed_session(&self) -> Option<&Session> {
        match &self.phase {
            Phase::Completed { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Starting { id, .. }
            | Phase::Cancelled { id, .. }
            | Phase::Failed { id, .. } => Some(*id),
            Phase::Active { session, .. } | Phase::Completed { session, .. } => Some(session.id()),
        }
    }

    /// Cancellation token of the current (or just-ended) session
    pub fn token(&self) -> Option<SessionToken> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Starting { token, .. }
            | Phase::Active { token, .. }
            | Phase::Completed { token, .. }
            | Phase::Cancelled { token, .. }
            | Phase::Failed { token, .. } => Some(token.clone()),
        }
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        match &self.phase {
            Phase::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn last_factor(&self) -> Option<CalibrationFactor> {
        self.last_factor
    }

    pub fn missed_samples(&self) -> u64 {
        self.missed_samples
    }

    pub fn calibration_engine(&self) -> &CalibrationEngine {
        &self.calibration
    }

    /// `now - started_at` while active, the fixed span once ended, else 0
    pub fn measurement_duration(&self, now_ms: u64) -> u64 {
        match &self.phase {
            Phase::Active { session, .. } => now_ms.saturating_sub(session.started_at_ms()),
            _ => self.session().and_then(Session::duration_ms).unwrap_or(0),
        }
    }

    pub fn snapshot(&self, now_ms: u64) -> SessionSnapshot {
        let session = self.session();
        SessionSnapshot {
            state: self.state(),
            session_id: self.session_id(),
            measurement_duration_ms: self.measurement_duration(now_ms),
            latest_db: session
                .and_then(Session::latest_reading)
                .map(|r| r.calibrated_db),
            reading_count: session.map(|s| s.readings().len()).unwrap_or(0),
            missed_samples: self.missed_samples,
            error: self
                .last_error()
                .map(|err| ErrorSummary::from_error(err)),
        }
    }

    /// Push-side observer; every transition and recorded tick sends a snapshot
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSnapshot> {
        self.observer.subscribe()
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    /// Shared tail of `stop` and the duration bound
    fn complete(&mut self, at_ms: u64) -> Result<(), SessionError> {
        self.publish(Some(SessionState::Stopping), at_ms);
        self.notify_transition(SessionState::Active, SessionState::Stopping, at_ms);

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Active { mut session, token } => {
                session.close(SessionState::Completed, at_ms);
                log::info!(
                    "[SessionStateMachine] Session {} completed: {} readings over {} ms",
                    session.id(),
                    session.readings().len(),
                    session.duration_ms().unwrap_or(0)
                );
                self.phase = Phase::Completed { session, token };
                self.announce(SessionState::Stopping, at_ms);
                Ok(())
            }
            other => {
                self.phase = other;
                Err(self.invalid("stop"))
            }
        }
    }

    fn enter(&mut self, phase: Phase, at_ms: u64) {
        let from = self.state();
        self.phase = phase;
        self.announce(from, at_ms);
    }

    /// Log, record and publish the move from `from` to the current state
    fn announce(&self, from: SessionState, at_ms: u64) {
        let to = self.state();
        self.notify_transition(from, to, at_ms);
        self.publish(None, at_ms);
    }

    fn notify_transition(&self, from: SessionState, to: SessionState, at_ms: u64) {
        log::debug!("[SessionStateMachine] {} -> {}", from, to);
        if let Some(telemetry) = &self.telemetry {
            telemetry.publish(MetricEvent::StateChanged {
                session_id: self.session_id(),
                from,
                to,
                at_ms,
            });
        }
    }

    fn publish(&self, state_override: Option<SessionState>, now_ms: u64) {
        let mut snapshot = self.snapshot(now_ms);
        if let Some(state) = state_override {
            snapshot.state = state;
        }
        // No subscribers is fine
        let _ = self.observer.send(snapshot);
    }

    fn record_error(&self, err: &SessionError) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_error(err, "session");
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        let err = SessionError::InvalidTransition {
            from: self.state(),
            action,
        };
        log_session_error(&err, action);
        err
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}
