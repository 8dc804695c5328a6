//! Report persistence: the `ReportSink` seam, a retrying `ReportStore` in front
//! of it, and two sinks (in-memory and one-JSON-file-per-report).

pub mod directory;
pub mod memory;
pub mod report_store;

pub use directory::DirectoryReportSink;
pub use memory::{Fault, MemoryReportSink};
pub use report_store::ReportStore;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::report::Report;
use crate::session::SessionId;

/// Acknowledgement returned by a sink after a successful insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkAck {
    pub session_id: SessionId,
    /// `false` when a record for this session already existed and was replaced
    pub created: bool,
}

/// Durable destination for reports
///
/// Implementations must key writes on `report.session_id` so that repeating an
/// insert (after a timeout or a lost acknowledgement) leaves exactly one record.
pub trait ReportSink: Send + Sync {
    fn insert<'a>(&'a self, report: &'a Report) -> BoxFuture<'a, Result<SinkAck, SinkError>>;

    /// Short name used in logs
    fn name(&self) -> &'static str {
        "sink"
    }
}
