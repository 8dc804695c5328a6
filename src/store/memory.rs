// MemoryReportSink - HashMap-backed sink with scripted faults

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::SinkError;
use crate::report::Report;
use crate::session::SessionId;
use crate::store::{ReportSink, SinkAck};

/// Scripted behaviour for the next insert call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail transiently without storing anything
    TransientBeforeWrite,
    /// Store the report, then report a transient failure (lost acknowledgement)
    TransientAfterWrite,
    /// Refuse the report permanently
    Reject,
    /// Never complete; only a timeout or cancellation ends the attempt
    Stall,
}

/// In-process sink keyed by session id
///
/// Used by tests and by hosts that persist reports themselves after the
/// session ends.
#[derive(Debug, Default)]
pub struct MemoryReportSink {
    reports: Mutex<HashMap<SessionId, Report>>,
    faults: Mutex<VecDeque<Fault>>,
    insert_calls: AtomicU32,
    delay: Option<Duration>,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every insert by `delay` before it takes effect
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a fault for an upcoming insert; faults are consumed in order
    pub fn fail_next(&self, fault: Fault) {
        lock(&self.faults).push_back(fault);
    }

    pub fn insert_calls(&self) -> u32 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        lock(&self.reports).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Report> {
        lock(&self.reports).get(session_id).cloned()
    }

    fn write(&self, report: &Report) -> bool {
        lock(&self.reports)
            .insert(report.session_id, report.clone())
            .is_none()
    }
}

/// Test sink state is plain data, so a poisoned lock is still usable
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ReportSink for MemoryReportSink {
    fn insert<'a>(&'a self, report: &'a Report) -> BoxFuture<'a, Result<SinkAck, SinkError>> {
        Box::pin(async move {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            let fault = lock(&self.faults).pop_front();

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match fault {
                Some(Fault::TransientBeforeWrite) => {
                    Err(SinkError::Transient("memory sink unavailable".to_string()))
                }
                Some(Fault::TransientAfterWrite) => {
                    self.write(report);
                    Err(SinkError::Transient(
                        "acknowledgement lost after write".to_string(),
                    ))
                }
                Some(Fault::Reject) => Err(SinkError::Rejected(
                    "memory sink refused report".to_string(),
                )),
                Some(Fault::Stall) => futures::future::pending().await,
                None => Ok(SinkAck {
                    session_id: report.session_id,
                    created: self.write(report),
                }),
            }
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
