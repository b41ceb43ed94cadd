use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ErrorKind;
use crate::models::job::{JobId, JobStatus, LogEntry, StatusReport};
use crate::models::kind::JobKind;
use crate::models::output::JobOutput;

/// Where a tracked job is in its client-side lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerPhase {
    Idle,
    Submitting,
    Pending,
    Running,
    Fetching,
    Completed,
    /// The backend reported the job as failed.
    Failed,
    /// Polling stopped on a client-side fatal error (timeout, lost
    /// connection, unreadable result); the job itself may not have failed.
    Error,
    Cancelled,
}

impl TrackerPhase {
    /// Frozen phases accept no further updates until a new job starts.
    pub fn is_frozen(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Error | Self::Cancelled
        )
    }
}

/// A fatal error as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorView {
    pub kind: ErrorKind,
    pub message: String,
}

/// Observable state of the job a tracker is following.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    /// Bumped every time the tracker starts a new job.
    pub generation: u64,
    pub kind: Option<JobKind>,
    pub job_id: Option<JobId>,
    pub phase: TrackerPhase,
    pub status: Option<JobStatus>,
    pub progress: u8,
    pub stage: Option<String>,
    pub logs: Vec<LogEntry>,
    pub result: Option<JobOutput>,
    pub error: Option<ErrorView>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn idle() -> Self {
        Self {
            generation: 0,
            kind: None,
            job_id: None,
            phase: TrackerPhase::Idle,
            status: None,
            progress: 0,
            stage: None,
            logs: Vec::new(),
            result: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Fresh state for a newly started job.
    pub fn started(generation: u64, kind: JobKind, phase: TrackerPhase) -> Self {
        Self {
            generation,
            kind: Some(kind),
            phase,
            ..Self::idle()
        }
    }

    /// Fold one poll tick into the snapshot. Absent fields keep their
    /// previous values; logs are replaced wholesale.
    pub fn apply_report(&mut self, report: &StatusReport) {
        self.phase = match report.status {
            JobStatus::Pending => TrackerPhase::Pending,
            JobStatus::Completed => TrackerPhase::Fetching,
            _ => TrackerPhase::Running,
        };
        if let Some(progress) = report.progress {
            self.progress = progress;
        }
        if report.status == JobStatus::Completed {
            self.progress = 100;
        }
        if let Some(stage) = &report.stage {
            self.stage = Some(stage.clone());
        }
        if let Some(logs) = &report.logs {
            self.logs = logs.clone();
        }
        self.status = Some(report.status.clone());
    }
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_report_keeps_missing_fields() {
        let mut snapshot = JobSnapshot::started(1, JobKind::Summarize, TrackerPhase::Pending);
        let first = StatusReport::parse(json!({
            "status": "running", "progress": 40, "stage": "reading", "logs": ["a"]
        }))
        .unwrap();
        snapshot.apply_report(&first);

        let second = StatusReport::parse(json!({"status": "processing"})).unwrap();
        snapshot.apply_report(&second);

        assert_eq!(snapshot.phase, TrackerPhase::Running);
        assert_eq!(snapshot.progress, 40);
        assert_eq!(snapshot.stage.as_deref(), Some("reading"));
        assert_eq!(snapshot.logs.len(), 1);
    }

    #[test]
    fn test_progress_may_go_backwards() {
        let mut snapshot = JobSnapshot::started(1, JobKind::Writer, TrackerPhase::Pending);
        snapshot.apply_report(&StatusReport::parse(json!({"status": "running", "progress": 70})).unwrap());
        snapshot.apply_report(&StatusReport::parse(json!({"status": "running", "progress": 20})).unwrap());
        assert_eq!(snapshot.progress, 20);
    }

    #[test]
    fn test_completed_tick_moves_to_fetching() {
        let mut snapshot = JobSnapshot::started(1, JobKind::ConvertFile, TrackerPhase::Pending);
        snapshot.apply_report(&StatusReport::parse(json!({"status": "completed", "progress": 90})).unwrap());
        assert_eq!(snapshot.phase, TrackerPhase::Fetching);
        assert_eq!(snapshot.progress, 100);
        assert!(!snapshot.phase.is_frozen());
    }
}
