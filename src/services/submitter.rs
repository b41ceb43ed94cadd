use serde_json::Value;
use tracing::{info, warn};

use crate::error::JobError;
use crate::models::job::{JobHandle, JobId};
use crate::models::kind::JobKind;
use crate::services::backend::JobBackend;
use crate::services::envelope::{self, JOB_ENVELOPES};

const JOB_ID_KEYS: &[&str] = &["job_id", "jobId", "id"];
const POLL_URL_KEYS: &[&str] = &["poll_url", "status_url", "pollUrl", "statusUrl"];
const RESULT_URL_KEYS: &[&str] = &["result_url", "resultUrl"];

/// Start a job and return the handle needed to follow it.
///
/// Submission is never retried: the backend may have accepted the job even
/// when the response was lost.
pub async fn submit<B: JobBackend>(
    backend: &B,
    kind: JobKind,
    payload: &Value,
) -> Result<JobHandle, JobError> {
    metrics::counter!("docjobs_submissions_total", "kind" => kind.to_string()).increment(1);

    let body = backend.submit(kind, payload).await.map_err(|e| {
        warn!(kind = %kind, error = %e, "Job submission request failed");
        JobError::Submission {
            kind,
            reason: e.user_message(),
        }
    })?;

    let handle = parse_submission(&body).ok_or_else(|| {
        let reason = envelope::find_field(&body, JOB_ENVELOPES, &["error", "message"])
            .and_then(envelope::error_message)
            .unwrap_or_else(|| "response carried no job id".to_string());
        warn!(kind = %kind, reason = %reason, "Submission response has no job id");
        JobError::Submission { kind, reason }
    })?;

    info!(
        kind = %kind,
        job_id = %handle.job_id,
        poll_url = ?handle.poll_url,
        "Job submitted"
    );
    Ok(handle)
}

/// Unwrap a job handle from whichever envelope the backend used.
pub fn parse_submission(body: &Value) -> Option<JobHandle> {
    let job_id = envelope::find_field(body, JOB_ENVELOPES, JOB_ID_KEYS)
        .and_then(envelope::scalar_string)
        .map(JobId::new)?;

    let url = |keys: &[&str]| {
        envelope::find_field(body, JOB_ENVELOPES, keys)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Some(JobHandle {
        job_id,
        poll_url: url(POLL_URL_KEYS),
        result_url: url(RESULT_URL_KEYS),
    })
}
