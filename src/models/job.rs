use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::services::envelope::{self, STATUS_ENVELOPES};

/// Opaque backend-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a backend job as reported by its status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Unrecognized status string. Treated as still in progress.
    Unknown(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "waiting" => Self::Pending,
            "running" | "processing" | "in_progress" | "started" => Self::Running,
            "completed" | "complete" | "done" | "success" | "succeeded" => Self::Completed,
            "failed" | "error" | "failure" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to poll a submitted job and fetch its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    /// Backend-provided status URL, absolute or relative to the base URL.
    pub poll_url: Option<String>,
    /// Backend-provided result URL, absolute or relative to the base URL.
    pub result_url: Option<String>,
}

impl JobHandle {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            poll_url: None,
            result_url: None,
        }
    }
}

/// One log line from a status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: Option<String>,
    pub message: String,
}

impl LogEntry {
    /// Accepts plain strings and `{level, message}` objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self {
                level: None,
                message: s.clone(),
            }),
            Value::Object(map) => {
                let message = ["message", "msg", "text"]
                    .iter()
                    .filter_map(|key| map.get(*key))
                    .find_map(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| value.to_string());
                let level = ["level", "severity"]
                    .iter()
                    .filter_map(|key| map.get(*key))
                    .find_map(|v| v.as_str().map(str::to_string));
                Some(Self { level, message })
            }
            other => Some(Self {
                level: None,
                message: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.level {
            Some(level) => write!(f, "[{}] {}", level, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// A parsed status response for one poll tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: JobStatus,
    /// Clamped to 0..=100. `None` when the response carried no progress.
    pub progress: Option<u8>,
    pub stage: Option<String>,
    /// Full log list as of this tick; `None` when the response had no logs.
    pub logs: Option<Vec<LogEntry>>,
    /// Normalized error text, present on failed jobs that explained themselves.
    pub error: Option<String>,
    /// The raw body, kept for kinds whose result rides on the status response.
    pub body: Value,
}

impl StatusReport {
    /// Parse a status body. Returns `None` when no envelope carries a status.
    ///
    /// Fields are read from the envelope that supplied the status first, then
    /// from the other envelopes. `message` only counts as the stage inside
    /// the status envelope, since wrappers use it for their own text.
    pub fn parse(body: Value) -> Option<Self> {
        let (node, status) = status_envelope(&body)?;
        let nodes: Vec<&Value> = std::iter::once(node)
            .chain(
                STATUS_ENVELOPES
                    .iter()
                    .filter_map(|path| envelope::lookup(&body, path)),
            )
            .collect();
        let field = |keys: &[&str]| envelope::first_in(&nodes, keys);

        let progress = field(&["progress", "percent"]).and_then(clamp_progress);

        let stage = envelope::first_in(&[node], &["stage", "step", "message"])
            .or_else(|| field(&["stage", "step"]))
            .and_then(Value::as_str)
            .map(str::to_string);

        let logs = field(&["logs"])
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(LogEntry::from_value).collect());

        let error = field(&["error", "error_message", "errors"]).and_then(envelope::error_message);

        Some(Self {
            status,
            progress,
            stage,
            logs,
            error,
            body,
        })
    }

    /// Message to surface for a failed job.
    pub fn failure_message(&self) -> String {
        self.error.clone().unwrap_or_else(|| "job failed".to_string())
    }
}

/// Pick the envelope whose status describes the job.
///
/// API wrappers put their own `status` (often `"success"`) at the root, so
/// nested envelopes are tried first and a recognized status beats an
/// unrecognized one.
fn status_envelope(body: &Value) -> Option<(&Value, JobStatus)> {
    let mut candidates: Vec<(&Value, JobStatus)> = STATUS_ENVELOPES
        .iter()
        .filter_map(|path| envelope::lookup(body, path))
        .filter_map(|node| {
            let raw = envelope::first_in(&[node], &["status", "state"])?.as_str()?;
            Some((node, JobStatus::parse(raw)))
        })
        .collect();

    let index = candidates
        .iter()
        .position(|(_, status)| !matches!(status, JobStatus::Unknown(_)))
        .unwrap_or(0);
    (index < candidates.len()).then(|| candidates.swap_remove(index))
}

/// Read a progress value (number or numeric string) into 0..=100.
pub fn clamp_progress(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    if raw.is_nan() {
        return None;
    }
    Some(raw.clamp(0.0, 100.0).round() as u8)
}
