//! Result fetching and shape normalization.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::JobError;
use crate::models::job::{JobHandle, JobId, StatusReport};
use crate::models::kind::JobKind;
use crate::models::output::JobOutput;
use crate::services::backend::JobBackend;
use crate::services::envelope;
use crate::services::retry::{Retrier, RetryDecision, RetryPolicy};

/// Envelopes probed for the result payload, most specific first.
pub const RESULT_PATHS: &[&str] = &[
    "data.result",
    "data.data",
    "data",
    "result.data",
    "result",
    "output",
    "",
];

const SUMMARY_KEYS: &[&str] = &["summary", "content", "text", "transcript"];
const ITEM_KEYS: &[&str] = &["flashcards", "cards", "slides"];

/// Fetch and normalize the result of a completed job.
///
/// Prefers the backend-provided `result_url`, then the kind's result
/// endpoint, and falls back to the terminal status body for kinds that
/// return their result inline. Returns `Ok(None)` if cancelled mid-fetch.
pub async fn fetch_result<B: JobBackend>(
    backend: &B,
    kind: JobKind,
    handle: &JobHandle,
    terminal: &StatusReport,
    retry: &RetryPolicy,
    token: &CancellationToken,
) -> Result<Option<JobOutput>, JobError> {
    let job_id = &handle.job_id;
    let has_endpoint = handle.result_url.is_some() || kind.result_endpoint().is_some();

    if !has_endpoint {
        debug!(kind = %kind, job_id = %job_id, "Reading result from terminal status body");
        return normalize(kind, job_id, &terminal.body).map(Some);
    }

    let mut retrier = Retrier::new(retry.clone());
    loop {
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(None),
            response = backend.result(kind, handle) => response,
        };

        match response {
            Ok(body) => {
                let output = normalize(kind, job_id, &body)?;
                info!(
                    kind = %kind,
                    job_id = %job_id,
                    matched_path = %output.matched_path,
                    downloads = output.download_urls.len(),
                    "Result fetched"
                );
                return Ok(Some(output));
            }
            Err(e) if e.is_transient() => match retrier.record_failure(&e) {
                RetryDecision::Retry { attempt, delay } => {
                    warn!(kind = %kind, job_id = %job_id, attempt, error = %e, "Transient result failure, backing off");
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp { attempts } => {
                    return Err(JobError::ConnectionLost {
                        job_id: job_id.clone(),
                        attempts,
                        last_error: e.to_string(),
                    });
                }
            },
            Err(e) => return Err(JobError::rejected(job_id, &e)),
        }
    }
}

/// Locate the result payload in `body` and map it to the canonical shape.
///
/// Pure: the same body always normalizes to the same output.
pub fn normalize(kind: JobKind, job_id: &JobId, body: &Value) -> Result<JobOutput, JobError> {
    let expected = kind.expected_keys();

    let matched = RESULT_PATHS.iter().find_map(|path| {
        let candidate = envelope::lookup(body, path)?;
        let object = candidate.as_object()?;
        expected
            .iter()
            .any(|key| object.get(*key).is_some_and(envelope::is_meaningful))
            .then_some((*path, candidate))
    });

    let Some((path, payload)) = matched else {
        warn!(kind = %kind, job_id = %job_id, "Result payload shape not recognized");
        return Err(JobError::ResultShape {
            job_id: job_id.clone(),
            kind,
        });
    };

    let summary = SUMMARY_KEYS
        .iter()
        .filter_map(|key| payload.get(*key))
        .find_map(|v| v.as_str().filter(|s| !s.trim().is_empty()))
        .map(str::to_string);

    let items = ITEM_KEYS
        .iter()
        .filter_map(|key| payload.get(*key))
        .find_map(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(JobOutput {
        kind,
        job_id: job_id.clone(),
        summary,
        download_urls: download_urls(payload),
        items,
        payload: payload.clone(),
        matched_path: path.to_string(),
    })
}

/// Collect `download_url`, `download_urls[]` and `file_url`, deduplicated.
fn download_urls(payload: &Value) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut push = |candidate: &Value| {
        let url = match candidate {
            Value::String(s) => Some(s.trim()),
            Value::Object(map) => map.get("url").and_then(Value::as_str).map(str::trim),
            _ => None,
        };
        if let Some(url) = url.filter(|u| !u.is_empty()) {
            if !urls.iter().any(|existing| existing == url) {
                urls.push(url.to_string());
            }
        }
    };

    if let Some(single) = payload.get("download_url") {
        push(single);
    }
    if let Some(Value::Array(many)) = payload.get("download_urls") {
        many.iter().for_each(&mut push);
    }
    if let Some(file) = payload.get("file_url") {
        push(file);
    }
    urls
}
