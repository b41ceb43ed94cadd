//! Status polling state machine.
//!
//! PENDING → RUNNING → {COMPLETED, FAILED}, one request in flight at a time,
//! bounded by a stuck-pending guard, a wall-clock budget, and a tick budget.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::JobError;
use crate::models::job::{JobHandle, JobStatus, StatusReport};
use crate::models::kind::JobKind;
use crate::services::backend::{BackendError, JobBackend};
use crate::services::retry::{Retrier, RetryDecision, RetryPolicy};

/// Cadence and limits for polling one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Interval between ticks while the job is queued.
    pub pending_interval: Duration,
    /// Interval between ticks once the job is running.
    pub running_interval: Duration,
    /// Continuous pending time after which the job is considered dropped.
    pub stuck_pending_after: Duration,
    pub max_duration: Duration,
    pub max_ticks: u32,
    pub retry: RetryPolicy,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            pending_interval: Duration::from_millis(2000),
            running_interval: Duration::from_millis(3000),
            stuck_pending_after: Duration::from_secs(30),
            max_duration: Duration::from_secs(240),
            max_ticks: 120,
            retry: RetryPolicy::default(),
        }
    }
}

impl PollPolicy {
    pub fn interval_for(&self, status: &JobStatus) -> Duration {
        match status {
            JobStatus::Pending => self.pending_interval,
            _ => self.running_interval,
        }
    }
}

/// How a polling run ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(StatusReport),
    Cancelled,
}

/// Drives the status endpoint for one job until it reaches a terminal state.
pub struct Poller<'a, B> {
    backend: &'a B,
    policy: &'a PollPolicy,
    token: &'a CancellationToken,
}

impl<'a, B: JobBackend> Poller<'a, B> {
    pub fn new(backend: &'a B, policy: &'a PollPolicy, token: &'a CancellationToken) -> Self {
        Self {
            backend,
            policy,
            token,
        }
    }

    /// Poll until completion, failure, a budget violation, or cancellation.
    ///
    /// `on_tick` sees every successfully parsed status response before its
    /// status is acted on, including the terminal one.
    pub async fn run<F>(
        &self,
        kind: JobKind,
        handle: &JobHandle,
        mut on_tick: F,
    ) -> Result<PollOutcome, JobError>
    where
        F: FnMut(&StatusReport),
    {
        let job_id = &handle.job_id;
        let started = Instant::now();
        let mut retrier = Retrier::new(self.policy.retry.clone());
        // A freshly submitted job is pending until a tick says otherwise.
        let mut pending_since: Option<Instant> = Some(started);
        let mut ticks: u32 = 0;

        info!(kind = %kind, job_id = %job_id, "Polling job status");

        loop {
            if self.token.is_cancelled() {
                return Ok(self.cancelled(kind, handle, ticks));
            }

            let elapsed = started.elapsed();
            if ticks >= self.policy.max_ticks || elapsed >= self.policy.max_duration {
                warn!(kind = %kind, job_id = %job_id, ticks, elapsed_ms = elapsed.as_millis() as u64, "Polling budget exhausted");
                return Err(JobError::PollTimeout {
                    job_id: job_id.clone(),
                    ticks,
                    elapsed,
                });
            }

            ticks += 1;
            metrics::counter!("docjobs_poll_ticks_total", "kind" => kind.to_string()).increment(1);

            let response = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(self.cancelled(kind, handle, ticks)),
                response = self.backend.status(kind, handle) => response,
            };

            let report = match response.and_then(parse_report) {
                Ok(report) => {
                    retrier.record_success();
                    report
                }
                Err(e) if e.is_transient() => {
                    match retrier.record_failure(&e) {
                        RetryDecision::Retry { attempt, delay } => {
                            metrics::counter!("docjobs_poll_retries_total", "kind" => kind.to_string())
                                .increment(1);
                            warn!(
                                kind = %kind,
                                job_id = %job_id,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Transient status failure, backing off"
                            );
                            if !self.pause(delay).await {
                                return Ok(self.cancelled(kind, handle, ticks));
                            }
                            continue;
                        }
                        RetryDecision::GiveUp { attempts } => {
                            warn!(kind = %kind, job_id = %job_id, attempts, error = %e, "Retry budget exhausted");
                            return Err(JobError::ConnectionLost {
                                job_id: job_id.clone(),
                                attempts,
                                last_error: e.to_string(),
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!(kind = %kind, job_id = %job_id, error = %e, "Status request rejected");
                    return Err(JobError::rejected(job_id, &e));
                }
            };

            debug!(
                kind = %kind,
                job_id = %job_id,
                tick = ticks,
                status = %report.status,
                progress = ?report.progress,
                stage = ?report.stage,
                "Status tick"
            );
            on_tick(&report);

            match &report.status {
                JobStatus::Completed => {
                    info!(kind = %kind, job_id = %job_id, ticks, "Job completed");
                    return Ok(PollOutcome::Completed(report));
                }
                JobStatus::Failed => {
                    let message = report.failure_message();
                    info!(kind = %kind, job_id = %job_id, message = %message, "Job reported failure");
                    return Err(JobError::JobFailed {
                        job_id: job_id.clone(),
                        message,
                    });
                }
                JobStatus::Pending => {
                    // Measured up to the next tick.
                    let since = *pending_since.get_or_insert_with(Instant::now);
                    let waited = since.elapsed() + self.policy.pending_interval;
                    if waited > self.policy.stuck_pending_after {
                        warn!(kind = %kind, job_id = %job_id, waited_ms = waited.as_millis() as u64, "Job stuck in pending");
                        return Err(JobError::StuckPending {
                            job_id: job_id.clone(),
                            waited,
                        });
                    }
                }
                JobStatus::Running | JobStatus::Unknown(_) => pending_since = None,
            }

            if !self.pause(self.policy.interval_for(&report.status)).await {
                return Ok(self.cancelled(kind, handle, ticks));
            }
        }
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }

    fn cancelled(&self, kind: JobKind, handle: &JobHandle, ticks: u32) -> PollOutcome {
        info!(kind = %kind, job_id = %handle.job_id, ticks, "Polling cancelled");
        PollOutcome::Cancelled
    }
}

/// A body without any status field is treated like a garbled response.
fn parse_report(body: serde_json::Value) -> Result<StatusReport, BackendError> {
    StatusReport::parse(body).ok_or_else(|| {
        BackendError::Decode(serde::de::Error::custom("status response has no status field"))
    })
}
