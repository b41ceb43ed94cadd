//! Job context object: one tracker per consumer (a page, a CLI command).
//!
//! A tracker follows at most one job at a time. It runs submit → poll →
//! fetch on a spawned task and publishes a [`JobSnapshot`] through a watch
//! channel. Every write to the snapshot is checked, under the channel lock,
//! against the job's generation and cancellation token, so a response that
//! lands after `cancel()` or after a newer job started is discarded.

use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::JobError;
use crate::models::job::{JobHandle, JobStatus};
use crate::models::kind::JobKind;
use crate::models::output::JobOutput;
use crate::models::snapshot::{ErrorView, JobSnapshot, TrackerPhase};
use crate::services::backend::JobBackend;
use crate::services::poller::{PollOutcome, PollPolicy, Poller};
use crate::services::{result, submitter};

/// Final outcome of a tracked job that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(JobOutput),
    Cancelled,
}

pub struct JobTracker<B> {
    backend: Arc<B>,
    policy: PollPolicy,
    state: Arc<watch::Sender<JobSnapshot>>,
    active: Mutex<Option<JobContext>>,
}

impl<B: JobBackend> JobTracker<B> {
    pub fn new(backend: Arc<B>, policy: PollPolicy) -> Self {
        let (state, _) = watch::channel(JobSnapshot::idle());
        Self {
            backend,
            policy,
            state: Arc::new(state),
            active: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Receive every snapshot change of the jobs this tracker follows.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.state.borrow().clone()
    }

    /// Submit a new job and follow it. Cancels any job already being followed.
    pub fn start(&self, kind: JobKind, payload: Value) -> TrackedJob {
        let ctx = self.begin(kind, TrackerPhase::Submitting, None);
        self.spawn(kind, Start::Submit(payload), ctx)
    }

    /// Follow a job that was submitted elsewhere.
    pub fn attach(&self, kind: JobKind, handle: JobHandle) -> TrackedJob {
        let ctx = self.begin(kind, TrackerPhase::Pending, Some(&handle));
        self.spawn(kind, Start::Attach(handle), ctx)
    }

    /// Stop following the current job. Safe to call at any time; a no-op
    /// once the job is terminal.
    pub fn cancel(&self) {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ctx) = active.as_ref() {
            ctx.cancel();
        }
    }

    fn begin(&self, kind: JobKind, phase: TrackerPhase, handle: Option<&JobHandle>) -> JobContext {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            previous.token.cancel();
        }

        let generation = self.state.borrow().generation + 1;
        let mut snapshot = JobSnapshot::started(generation, kind, phase);
        if let Some(handle) = handle {
            snapshot.job_id = Some(handle.job_id.clone());
            snapshot.status = Some(JobStatus::Pending);
        }
        self.state.send_replace(snapshot);

        let ctx = JobContext {
            state: Arc::clone(&self.state),
            token: CancellationToken::new(),
            generation,
        };
        *active = Some(ctx.clone());
        ctx
    }

    fn spawn(&self, kind: JobKind, start: Start, ctx: JobContext) -> TrackedJob {
        let task = tokio::spawn(run_job(
            Arc::clone(&self.backend),
            self.policy.clone(),
            kind,
            start,
            ctx.clone(),
        ));
        TrackedJob { ctx, task }
    }
}

/// Handle to one spawned job run.
pub struct TrackedJob {
    ctx: JobContext,
    task: JoinHandle<Result<JobOutcome, JobError>>,
}

impl TrackedJob {
    pub fn generation(&self) -> u64 {
        self.ctx.generation
    }

    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.ctx.token.is_cancelled()
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<JobOutcome, JobError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Ok(JobOutcome::Cancelled),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

enum Start {
    Submit(Value),
    Attach(JobHandle),
}

/// Write access to the snapshot for one generation of one tracker.
#[derive(Clone)]
struct JobContext {
    state: Arc<watch::Sender<JobSnapshot>>,
    token: CancellationToken,
    generation: u64,
}

impl JobContext {
    /// Apply `update` unless this run was cancelled, superseded, or already
    /// frozen. Returns whether the snapshot changed.
    fn apply(&self, update: impl FnOnce(&mut JobSnapshot)) -> bool {
        self.state.send_if_modified(|snapshot| {
            if self.token.is_cancelled()
                || snapshot.generation != self.generation
                || snapshot.phase.is_frozen()
            {
                return false;
            }
            update(snapshot);
            snapshot.updated_at = Utc::now();
            true
        })
    }

    fn cancel(&self) {
        self.token.cancel();
        self.state.send_if_modified(|snapshot| {
            if snapshot.generation != self.generation || snapshot.phase.is_frozen() {
                return false;
            }
            snapshot.phase = TrackerPhase::Cancelled;
            snapshot.updated_at = Utc::now();
            true
        });
    }
}

async fn run_job<B: JobBackend>(
    backend: Arc<B>,
    policy: PollPolicy,
    kind: JobKind,
    start: Start,
    ctx: JobContext,
) -> Result<JobOutcome, JobError> {
    let started = Instant::now();
    let result = drive(backend.as_ref(), &policy, kind, start, &ctx).await;

    // A result that can no longer be published belongs to a cancelled run.
    let result = match result {
        Ok(JobOutcome::Completed(output)) => {
            let published = ctx.apply(|snapshot| {
                snapshot.phase = TrackerPhase::Completed;
                snapshot.progress = 100;
                snapshot.result = Some(output.clone());
            });
            if published {
                Ok(JobOutcome::Completed(output))
            } else {
                Ok(JobOutcome::Cancelled)
            }
        }
        Ok(JobOutcome::Cancelled) => Ok(JobOutcome::Cancelled),
        Err(e) => {
            let phase = match e {
                JobError::JobFailed { .. } => TrackerPhase::Failed,
                _ => TrackerPhase::Error,
            };
            let view = ErrorView {
                kind: e.kind(),
                message: e.user_message(),
            };
            let published = ctx.apply(|snapshot| {
                snapshot.phase = phase;
                snapshot.error = Some(view);
            });
            if published {
                error!(kind = %kind, error = %e, error_kind = %e.kind(), "Job ended with error");
                Err(e)
            } else {
                Ok(JobOutcome::Cancelled)
            }
        }
    };

    let outcome: &'static str = match &result {
        Ok(JobOutcome::Completed(_)) => "completed",
        Ok(JobOutcome::Cancelled) => "cancelled",
        Err(e) => e.kind().into(),
    };
    metrics::counter!(
        "docjobs_outcomes_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!("docjobs_job_duration_seconds", "kind" => kind.to_string())
        .record(started.elapsed().as_secs_f64());

    result
}

async fn drive<B: JobBackend>(
    backend: &B,
    policy: &PollPolicy,
    kind: JobKind,
    start: Start,
    ctx: &JobContext,
) -> Result<JobOutcome, JobError> {
    let handle = match start {
        Start::Submit(payload) => {
            let handle = tokio::select! {
                biased;
                _ = ctx.token.cancelled() => return Ok(JobOutcome::Cancelled),
                handle = submitter::submit(backend, kind, &payload) => handle?,
            };
            let published = ctx.apply(|snapshot| {
                snapshot.job_id = Some(handle.job_id.clone());
                snapshot.phase = TrackerPhase::Pending;
                snapshot.status = Some(JobStatus::Pending);
            });
            if !published {
                return Ok(JobOutcome::Cancelled);
            }
            handle
        }
        Start::Attach(handle) => {
            info!(kind = %kind, job_id = %handle.job_id, "Attaching to existing job");
            handle
        }
    };

    let poller = Poller::new(backend, policy, &ctx.token);
    let outcome = poller
        .run(kind, &handle, |report| {
            ctx.apply(|snapshot| snapshot.apply_report(report));
        })
        .await?;

    let terminal = match outcome {
        PollOutcome::Completed(report) => report,
        PollOutcome::Cancelled => return Ok(JobOutcome::Cancelled),
    };

    match result::fetch_result(backend, kind, &handle, &terminal, &policy.retry, &ctx.token).await? {
        Some(output) => Ok(JobOutcome::Completed(output)),
        None => Ok(JobOutcome::Cancelled),
    }
}
