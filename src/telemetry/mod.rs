//! Telemetry collector for session and persistence diagnostics.
//!
//! The collector multiplexes state transitions, missed samples, persistence
//! attempts and error events into a bounded history plus an async broadcast
//! stream. It is owned by the `MeasurementContext` and shared by `Arc` with the
//! state machine and report store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::{broadcast, mpsc};

use crate::error::ErrorCode;

pub mod events;

pub use events::{AttemptOutcome, MetricEvent};

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity: history_capacity.max(1),
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        // A poisoned history only loses diagnostics; keep publishing
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if history.len() == self.history_capacity {
            history.pop_front();
            self.dropped_history.fetch_add(1, Ordering::Relaxed);
        }
        history.push_back(event.clone());
        drop(history);

        let _ = self.tx.send(event);
    }

    /// Publish an `Error` event for any coded error
    pub fn record_error(&self, err: &dyn ErrorCode, context: impl Into<String>) {
        self.publish(MetricEvent::Error {
            code: err.code(),
            context: context.into(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    /// Forward the broadcast into an unbounded channel
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe_unbounded(&self) -> mpsc::UnboundedReceiver<MetricEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut broadcast_rx = self.tx.subscribe();

        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("[Telemetry] Unbounded subscriber lagged by {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        rx
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportError;
    use crate::session::{SessionId, SessionState};

    fn missed(dropped: u64, total: u64) -> MetricEvent {
        MetricEvent::MissedSamples {
            session_id: None,
            dropped,
            total,
        }
    }

    #[test]
    fn collector_preserves_order_within_history() {
        let collector = TelemetryCollector::new(8, 3);
        collector.publish(missed(1, 1));
        collector.publish(MetricEvent::StateChanged {
            session_id: Some(SessionId::new()),
            from: SessionState::Idle,
            to: SessionState::Starting,
            at_ms: 0,
        });
        collector.publish(missed(2, 3));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 3);
        assert_eq!(snapshot.recent[0], missed(1, 1));
        assert!(matches!(
            snapshot.recent[1],
            MetricEvent::StateChanged {
                to: SessionState::Starting,
                ..
            }
        ));
    }

    #[test]
    fn collector_drops_history_when_full() {
        let collector = TelemetryCollector::new(8, 2);
        collector.publish(missed(1, 1));
        collector.publish(missed(1, 2));
        collector.publish(missed(1, 3));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.dropped_events, 1);
        assert_eq!(snapshot.recent[0], missed(1, 2));
    }

    #[test]
    fn record_error_uses_error_code() {
        let collector = TelemetryCollector::default();
        collector.record_error(&ReportError::EmptySession, "assemble");

        let snapshot = collector.snapshot();
        assert_eq!(
            snapshot.recent,
            vec![MetricEvent::Error {
                code: 4001,
                context: "assemble".to_string()
            }]
        );
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(missed(2, 5)).unwrap();
        assert_eq!(json["type"], "missed_samples");
        assert_eq!(json["payload"]["total"], 5);
    }

    #[tokio::test]
    async fn unbounded_subscriber_receives_events() {
        let collector = TelemetryCollector::new(8, 8);
        let mut rx = collector.subscribe_unbounded();
        collector.publish(missed(1, 1));

        let event = rx.recv().await.unwrap();
        assert_eq!(event, missed(1, 1));
    }
}
