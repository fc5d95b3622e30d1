pub mod mapper;
pub mod syncer;

use serde::Serialize;

/// Report returned after a project sync completes.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub project_key: String,
    pub status: SyncStatus,
    /// Raw records returned by the issue source.
    pub issues_fetched: u64,
    /// Records mapped and upserted.
    pub issues_synced: u64,
    /// Malformed records dropped by the mapper.
    pub issues_skipped: u64,
    pub assignees_updated: u64,
    pub error: Option<String>,
}

impl SyncReport {
    pub fn failed(project_key: &str, error: String) -> Self {
        Self {
            project_key: project_key.to_string(),
            status: SyncStatus::Failed,
            issues_fetched: 0,
            issues_synced: 0,
            issues_skipped: 0,
            assignees_updated: 0,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        }
    }
}

/// Callbacks for reporting sync progress to a front end.
pub trait SyncProgress: Send + Sync {
    fn on_project_start(&self, _project_key: &str, _index: usize, _total: usize) {}
    fn on_issues_fetched(&self, _project_key: &str, _count: usize) {}
    fn on_project_complete(&self, _report: &SyncReport) {}
}

/// Progress reporter that ignores every event.
pub struct NoopProgress;

impl SyncProgress for NoopProgress {}
