// DirectoryReportSink - one pretty-printed JSON file per session

use std::fs;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;

use crate::error::{PersistenceError, SinkError};
use crate::report::Report;
use crate::session::SessionId;
use crate::store::{ReportSink, SinkAck};

/// Writes `<dir>/<session_id>.json`
///
/// The file is written to a temporary sibling and renamed into place, so a
/// crash mid-write never leaves a truncated report and a repeated insert just
/// replaces the record.
#[derive(Debug, Clone)]
pub struct DirectoryReportSink {
    dir: PathBuf,
}

impl DirectoryReportSink {
    /// Open (creating if needed) the output directory
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, PersistenceError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        log::info!("[DirectoryReportSink] Writing reports to {:?}", dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }

    /// Read back a stored report, `None` if absent
    pub fn load(&self, session_id: &SessionId) -> Result<Option<Report>, PersistenceError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|err| PersistenceError::Io {
                details: format!("{:?}: {}", path, err),
            })
    }

    /// Session ids of every stored report, sorted
    pub fn list(&self) -> Result<Vec<SessionId>, PersistenceError> {
        let mut ids: Vec<SessionId> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != "json" {
                    return None;
                }
                SessionId::parse(path.file_stem()?.to_str()?)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn write(&self, report: &Report) -> Result<SinkAck, SinkError> {
        let json = serde_json::to_string_pretty(report)
            .map_err(|err| SinkError::Rejected(format!("report not serializable: {}", err)))?;

        let path = self.path_for(&report.session_id);
        // File I/O runs off the runtime threads so a stalled disk cannot hold
        // up the attempt timeout or token cancellation
        let created = tokio::task::spawn_blocking(move || write_atomically(&path, json))
            .await
            .map_err(|err| SinkError::Transient(format!("write task failed: {}", err)))??;

        Ok(SinkAck {
            session_id: report.session_id,
            created,
        })
    }
}

/// Write to a temporary sibling and rename into place
///
/// # Returns
/// `true` if no record existed at `path` before
fn write_atomically(path: &Path, json: String) -> Result<bool, SinkError> {
    let tmp = path.with_extension("json.tmp");
    let created = !path.exists();
    fs::write(&tmp, json)
        .and_then(|_| fs::rename(&tmp, path))
        .map_err(|err| SinkError::Transient(format!("{:?}: {}", path, err)))?;
    Ok(created)
}

impl ReportSink for DirectoryReportSink {
    fn insert<'a>(&'a self, report: &'a Report) -> BoxFuture<'a, Result<SinkAck, SinkError>> {
        Box::pin(self.write(report))
    }

    fn name(&self) -> &'static str {
        "directory"
    }
}
