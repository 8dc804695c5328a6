// MeasurementContext: Dependency Injection Container
// Owns the session state machine, report assembler, report store and telemetry
// so hosts and the CLI drive a whole measurement through one value.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::audio::{FrameConsumer, FrameProducer, FrameQueue, SourceSignal};
use crate::config::AppConfig;
use crate::error::{log_report_error, log_session_error, PersistenceError, ReportError, SessionError};
use crate::report::{Report, ReportAssembler};
use crate::session::{
    CalibrationInput, Session, SessionId, SessionSnapshot, SessionState, SessionStateMachine,
    SessionToken, StartRequest, TickOutcome,
};
use crate::store::{ReportSink, ReportStore, SinkAck};
use crate::telemetry::TelemetryCollector;

/// Why a pumped session stopped accepting frames
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    /// Maximum duration reached; the session completed
    TimedOut,
    /// Source signalled end of input; the session completed
    SourceEnded,
    /// Source signalled a failure; the session is in the error state
    SourceFailed(String),
    /// Session left `Active` through another call (stop, cancel, fail)
    Interrupted(SessionState),
}

/// Result of one [`MeasurementContext::pump`] pass
#[derive(Debug, Clone, PartialEq)]
pub enum PumpStatus {
    Continue,
    Finished(SessionEnd),
}

/// MeasurementContext: single entry point for one measurement at a time
///
/// Cloning is cheap; clones share the same session.
///
/// - SessionStateMachine behind a mutex (lock errors map to `StatePoisoned`)
/// - ReportAssembler configured from the report bands
/// - ReportStore wrapping the injected sink
/// - TelemetryCollector shared with the machine and store
#[derive(Clone)]
pub struct MeasurementContext {
    config: Arc<AppConfig>,
    machine: Arc<Mutex<SessionStateMachine>>,
    assembler: ReportAssembler,
    store: Arc<ReportStore>,
    telemetry: Arc<TelemetryCollector>,
}

impl MeasurementContext {
    pub fn new(config: AppConfig, sink: Arc<dyn ReportSink>) -> Self {
        let telemetry = Arc::new(TelemetryCollector::default());
        let machine =
            SessionStateMachine::from_config(&config).with_telemetry(Arc::clone(&telemetry));
        let store =
            ReportStore::new(config.store.clone(), sink).with_telemetry(Arc::clone(&telemetry));

        log::info!(
            "[MeasurementContext] Initialized: tick {} ms, max duration {} ms, calibration window {} samples",
            config.sampler.tick_interval_ms,
            config.session.max_duration_ms,
            config.calibration_window_samples()
        );

        Self {
            assembler: ReportAssembler::from_config(&config.report),
            config: Arc::new(config),
            machine: Arc::new(Mutex::new(machine)),
            store: Arc::new(store),
            telemetry,
        }
    }

    // ========================================================================
    // LOCK HELPER METHODS
    // ========================================================================

    /// Safely acquire lock on the state machine
    ///
    /// Returns MutexGuard or SessionError::StatePoisoned on lock failure
    fn lock_machine(&self) -> Result<MutexGuard<'_, SessionStateMachine>, SessionError> {
        self.machine.lock().map_err(|_| {
            let err = SessionError::StatePoisoned;
            log_session_error(&err, "lock_machine");
            err
        })
    }

    // ========================================================================
    // SESSION LIFECYCLE
    // ========================================================================

    pub fn begin_start(&self, at_ms: u64) -> Result<SessionId, SessionError> {
        self.lock_machine()?.begin_start(at_ms)
    }

    pub fn finish_start(
        &self,
        input: CalibrationInput,
        at_ms: u64,
    ) -> Result<SessionId, SessionError> {
        self.lock_machine()?.finish_start(input, at_ms)
    }

    pub fn start(&self, request: StartRequest) -> Result<SessionId, SessionError> {
        self.lock_machine()?.start(request)
    }

    pub fn record_tick(&self, raw_frame: f64, at_ms: u64) -> Result<TickOutcome, SessionError> {
        self.lock_machine()?.record_tick(raw_frame, at_ms)
    }

    pub fn stop(&self, at_ms: u64) -> Result<(), SessionError> {
        self.lock_machine()?.stop(at_ms)
    }

    pub fn cancel(&self, at_ms: u64) -> Result<(), SessionError> {
        self.lock_machine()?.cancel(at_ms)
    }

    pub fn fail(&self, reason: impl Into<String>, at_ms: u64) -> Result<(), SessionError> {
        self.lock_machine()?.fail(reason, at_ms)
    }

    pub fn reset(&self, at_ms: u64) -> Result<(), SessionError> {
        self.lock_machine()?.reset(at_ms)
    }

    // ========================================================================
    // OBSERVATION
    // ========================================================================

    pub fn state(&self) -> Result<SessionState, SessionError> {
        Ok(self.lock_machine()?.state())
    }

    pub fn snapshot(&self, now_ms: u64) -> Result<SessionSnapshot, SessionError> {
        Ok(self.lock_machine()?.snapshot(now_ms))
    }

    pub fn measurement_duration(&self, now_ms: u64) -> Result<u64, SessionError> {
        Ok(self.lock_machine()?.measurement_duration(now_ms))
    }

    /// Copy of the current session record, if any
    pub fn session(&self) -> Result<Option<Session>, SessionError> {
        Ok(self.lock_machine()?.session().cloned())
    }

    /// Token of the current session; cancelling it drops in-flight saves
    pub fn session_token(&self) -> Result<Option<SessionToken>, SessionError> {
        Ok(self.lock_machine()?.token())
    }

    pub fn subscribe(&self) -> Result<broadcast::Receiver<SessionSnapshot>, SessionError> {
        Ok(self.lock_machine()?.subscribe())
    }

    /// Snapshot stream for async observers; lagged snapshots are skipped
    pub fn subscribe_stream(
        &self,
    ) -> Result<impl Stream<Item = SessionSnapshot> + Send + 'static, SessionError> {
        let rx = self.subscribe()?;
        Ok(BroadcastStream::new(rx).filter_map(|item| match item {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log::warn!("[MeasurementContext] Snapshot observer lagged: {}", err);
                None
            }
        }))
    }

    pub fn telemetry(&self) -> &Arc<TelemetryCollector> {
        &self.telemetry
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // ========================================================================
    // FRAME PUMPING
    // ========================================================================

    /// Create a frame queue sized from the sampler config
    pub fn open_frame_queue(&self) -> (FrameProducer, FrameConsumer) {
        FrameQueue::new(self.config.sampler.queue_capacity)
    }

    /// Drain the queue into the active session
    ///
    /// Each frame becomes one tick at the frame's timestamp. Out-of-order frames
    /// are counted as missed and skipped. A source `Ended` signal stops the
    /// session at its last reading; `Failed` moves it to the error state.
    pub fn pump(&self, consumer: &mut FrameConsumer) -> Result<PumpStatus, SessionError> {
        let batch = consumer.poll();
        let mut machine = self.lock_machine()?;
        machine.record_missed(consumer.take_missed());

        let state = machine.state();
        if state != SessionState::Active {
            return Ok(PumpStatus::Finished(SessionEnd::Interrupted(state)));
        }

        for frame in &batch.frames {
            match machine.record_tick(frame.amplitude, frame.timestamp_ms) {
                Ok(TickOutcome::Recorded(_)) | Err(SessionError::OutOfOrderTick { .. }) => {}
                Ok(TickOutcome::TimedOut { .. }) => {
                    return Ok(PumpStatus::Finished(SessionEnd::TimedOut));
                }
                Err(err) => return Err(err),
            }
        }

        let Some(signal) = batch.signal else {
            return Ok(PumpStatus::Continue);
        };

        let at_ms = machine
            .session()
            .map(|s| {
                s.latest_reading()
                    .map(|r| r.timestamp_ms)
                    .unwrap_or(s.started_at_ms())
            })
            .unwrap_or(0);

        match signal {
            SourceSignal::Ended => {
                machine.stop(at_ms)?;
                Ok(PumpStatus::Finished(SessionEnd::SourceEnded))
            }
            SourceSignal::Failed(reason) => {
                machine.fail(reason.clone(), at_ms)?;
                Ok(PumpStatus::Finished(SessionEnd::SourceFailed(reason)))
            }
        }
    }

    /// Pump on the configured interval until the session ends
    ///
    /// Cancelling the session token ends the loop immediately.
    pub async fn run_until_finished(
        &self,
        mut consumer: FrameConsumer,
    ) -> Result<SessionEnd, SessionError> {
        let token = self
            .session_token()?
            .ok_or(SessionError::InvalidTransition {
                from: SessionState::Idle,
                action: "run",
            })?;

        let period = Duration::from_millis(self.config.session.pump_interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!("Session token cancelled, pump stopped");
                    return Ok(SessionEnd::Interrupted(self.state()?));
                }
                _ = interval.tick() => {}
            }

            if let PumpStatus::Finished(end) = self.pump(&mut consumer)? {
                tracing::debug!(?end, "Pump finished");
                return Ok(end);
            }
        }
    }

    // ========================================================================
    // REPORTING
    // ========================================================================

    /// Assemble the report of the completed session
    pub fn finish_report(&self) -> Result<Report, ReportError> {
        let machine = self.machine.lock().map_err(|_| {
            let err = ReportError::StatePoisoned;
            log_report_error(&err, "finish_report");
            err
        })?;

        match machine.completed_session() {
            Some(session) => self.assembler.assemble(session),
            None => {
                let err = ReportError::SessionNotCompleted {
                    state: machine.state(),
                };
                log_report_error(&err, "finish_report");
                Err(err)
            }
        }
    }

    /// Persist a report through the store, racing the current session token
    ///
    /// The lock is released before the first await.
    pub async fn save_report(&self, report: &Report) -> Result<SinkAck, PersistenceError> {
        let token = match self.session_token() {
            Ok(token) => token.unwrap_or_default(),
            Err(err) => {
                // The report is independent of session state; save it anyway
                log_session_error(&err, "save_report");
                SessionToken::new()
            }
        };
        self.store.save(report, &token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::level::db_to_level;
    use crate::audio::AudioFrame;
    use crate::calibration::CalibrationFactor;
    use crate::store::MemoryReportSink;

    fn context() -> (MeasurementContext, Arc<MemoryReportSink>) {
        let mut config = AppConfig::default();
        config.store.initial_backoff_ms = 1;
        config.store.jitter = 0.0;
        config.session.pump_interval_ms = 1;
        let sink = Arc::new(MemoryReportSink::new());
        (MeasurementContext::new(config, sink.clone()), sink)
    }

    fn start_unity(ctx: &MeasurementContext) -> SessionId {
        ctx.start(StartRequest {
            at_ms: 0,
            calibration: CalibrationInput::Reuse(CalibrationFactor::UNITY),
        })
        .unwrap()
    }

    #[test]
    fn test_context_starts_idle() {
        let (ctx, _) = context();
        assert_eq!(ctx.state().unwrap(), SessionState::Idle);
        assert_eq!(ctx.snapshot(0).unwrap(), SessionSnapshot::idle());
        assert!(ctx.session_token().unwrap().is_none());
    }

    #[test]
    fn test_clones_share_session() {
        let (ctx, _) = context();
        let other = ctx.clone();
        start_unity(&ctx);
        assert_eq!(other.state().unwrap(), SessionState::Active);
    }

    #[test]
    fn test_pump_records_frames_and_missed() {
        let (ctx, _) = context();
        start_unity(&ctx);
        let (mut producer, mut consumer) = FrameQueue::new(2);

        assert!(producer.push(AudioFrame::new(db_to_level(60.0), 125)));
        assert!(producer.push(AudioFrame::new(db_to_level(62.0), 250)));
        assert!(!producer.push(AudioFrame::new(db_to_level(64.0), 375)));

        assert_eq!(ctx.pump(&mut consumer).unwrap(), PumpStatus::Continue);
        let snapshot = ctx.snapshot(400).unwrap();
        assert_eq!(snapshot.reading_count, 2);
        assert_eq!(snapshot.missed_samples, 1);
    }

    #[test]
    fn test_pump_stops_on_source_end() {
        let (ctx, _) = context();
        start_unity(&ctx);
        let (mut producer, mut consumer) = ctx.open_frame_queue();

        producer.push(AudioFrame::new(db_to_level(60.0), 125));
        producer.push(AudioFrame::new(db_to_level(70.0), 250));
        producer.finish();

        assert_eq!(
            ctx.pump(&mut consumer).unwrap(),
            PumpStatus::Finished(SessionEnd::SourceEnded)
        );
        let session = ctx.session().unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.stopped_at_ms(), Some(250));
        assert!(ctx.finish_report().is_ok());
    }

    #[test]
    fn test_pump_fails_on_source_failure() {
        let (ctx, _) = context();
        start_unity(&ctx);
        let (mut producer, mut consumer) = ctx.open_frame_queue();
        producer.push(AudioFrame::new(db_to_level(60.0), 125));
        producer.fail("device removed");

        assert_eq!(
            ctx.pump(&mut consumer).unwrap(),
            PumpStatus::Finished(SessionEnd::SourceFailed("device removed".to_string()))
        );
        assert_eq!(ctx.state().unwrap(), SessionState::Error);
        assert_eq!(ctx.session().unwrap().unwrap().readings().len(), 1);
        assert!(matches!(
            ctx.finish_report(),
            Err(ReportError::SessionNotCompleted {
                state: SessionState::Error
            })
        ));
    }

    #[test]
    fn test_pump_after_cancel_is_interrupted() {
        let (ctx, _) = context();
        start_unity(&ctx);
        let (_producer, mut consumer) = ctx.open_frame_queue();
        ctx.cancel(500).unwrap();

        assert_eq!(
            ctx.pump(&mut consumer).unwrap(),
            PumpStatus::Finished(SessionEnd::Interrupted(SessionState::Cancelled))
        );
        assert!(ctx.finish_report().is_err());
    }

    #[tokio::test]
    async fn test_run_until_finished_and_save() {
        let (ctx, sink) = context();
        let id = start_unity(&ctx);
        let (mut producer, consumer) = ctx.open_frame_queue();

        let feeder = std::thread::spawn(move || {
            for (i, db) in [60.0, 62.0, 58.0, 90.0, 61.0].iter().enumerate() {
                while !producer.push(AudioFrame::new(db_to_level(*db), (i as u64 + 1) * 125)) {
                    std::thread::yield_now();
                }
            }
            producer.finish();
        });

        let end = ctx.run_until_finished(consumer).await.unwrap();
        feeder.join().unwrap();
        assert_eq!(end, SessionEnd::SourceEnded);

        let report = ctx.finish_report().unwrap();
        assert_eq!(report.session_id, id);
        assert_eq!(report.reading_count, 5);

        let ack = ctx.save_report(&report).await.unwrap();
        assert!(ack.created);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_run_until_finished_stops_on_cancel() {
        let (ctx, _) = context();
        start_unity(&ctx);
        let (_producer, consumer) = ctx.open_frame_queue();

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel(10).unwrap();
        });

        let end = ctx.run_until_finished(consumer).await.unwrap();
        assert_eq!(end, SessionEnd::Interrupted(SessionState::Cancelled));
    }

    #[tokio::test]
    async fn test_subscribe_stream_yields_snapshots() {
        let (ctx, _) = context();
        let mut stream = Box::pin(ctx.subscribe_stream().unwrap());
        start_unity(&ctx);

        let first = stream.next().await.unwrap();
        assert_eq!(first.state, SessionState::Starting);
        let second = stream.next().await.unwrap();
        assert_eq!(second.state, SessionState::Active);
    }

    #[test]
    fn test_finish_report_requires_completed_session() {
        let (ctx, _) = context();
        assert_eq!(
            ctx.finish_report(),
            Err(ReportError::SessionNotCompleted {
                state: SessionState::Idle
            })
        );
    }
}
