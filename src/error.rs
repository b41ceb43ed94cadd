use serde::Serialize;
use std::time::Duration;
use strum::{AsRefStr, Display, IntoStaticStr};

use crate::models::job::JobId;
use crate::models::kind::JobKind;
use crate::services::backend::BackendError;

/// Category of a fatal job error, for callers that branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Submission,
    ConnectionLost,
    StuckPending,
    PollTimeout,
    JobFailed,
    ResultShape,
    Rejected,
}

/// Fatal outcomes of submitting, polling, or fetching a job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job submission failed: {reason}")]
    Submission { kind: JobKind, reason: String },

    #[error("connection lost after {attempts} attempts ({last_error}); job {job_id} may still be running")]
    ConnectionLost {
        job_id: JobId,
        attempts: u32,
        last_error: String,
    },

    #[error("job {job_id} stayed pending for {waited:?}; the backend may have dropped it")]
    StuckPending { job_id: JobId, waited: Duration },

    #[error("job {job_id} did not finish within {elapsed:?} ({ticks} status checks)")]
    PollTimeout {
        job_id: JobId,
        ticks: u32,
        elapsed: Duration,
    },

    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: JobId, message: String },

    #[error("job {job_id} completed but its {kind} result has no recognized fields")]
    ResultShape { job_id: JobId, kind: JobKind },

    #[error("backend rejected the request for job {job_id}: {message}")]
    Rejected {
        job_id: JobId,
        status: Option<u16>,
        message: String,
    },
}

impl JobError {
    /// Wrap a non-retryable backend error.
    pub fn rejected(job_id: &JobId, err: &BackendError) -> Self {
        let status = match err {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        };
        Self::Rejected {
            job_id: job_id.clone(),
            status,
            message: err.user_message(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Submission { .. } => ErrorKind::Submission,
            Self::ConnectionLost { .. } => ErrorKind::ConnectionLost,
            Self::StuckPending { .. } => ErrorKind::StuckPending,
            Self::PollTimeout { .. } => ErrorKind::PollTimeout,
            Self::JobFailed { .. } => ErrorKind::JobFailed,
            Self::ResultShape { .. } => ErrorKind::ResultShape,
            Self::Rejected { .. } => ErrorKind::Rejected,
        }
    }

    /// Human-readable text for a user notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::JobFailed { message, .. } => message.clone(),
            Self::ConnectionLost { .. } => {
                "Connection lost. The job may still be running; check back later.".to_string()
            }
            Self::StuckPending { waited, .. } => format!(
                "The job never started after {}s. Please try again.",
                waited.as_secs()
            ),
            Self::PollTimeout { elapsed, .. } => format!(
                "The job is taking longer than {}s. Please check back later.",
                elapsed.as_secs()
            ),
            Self::ResultShape { .. } => {
                "The job finished, but its result could not be read.".to_string()
            }
            Self::Submission { reason, .. } => format!("Could not start the job: {}", reason),
            Self::Rejected { message, .. } => message.clone(),
        }
    }
}
