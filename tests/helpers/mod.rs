//! Test helper utilities: a scripted in-memory backend

#![allow(dead_code)]

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use docjobs::models::job::JobHandle;
use docjobs::{BackendError, JobBackend, JobKind};

/// One scripted status response.
pub enum Step {
    Respond(Value),
    Fail(BackendError),
    /// Signal `entered`, then hold the request open until `release` fires.
    Gated {
        entered: Arc<Notify>,
        release: Arc<Notify>,
        body: Value,
    },
}

/// Handles for a gated status call.
#[derive(Clone)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// Backend whose responses are scripted in order.
///
/// When the status script runs out, `repeat_status` (if set) is served
/// forever; otherwise the call panics so a test cannot poll by accident.
#[derive(Default)]
pub struct ScriptedBackend {
    submits: Mutex<VecDeque<Result<Value, BackendError>>>,
    statuses: Mutex<VecDeque<Step>>,
    repeat_status: Mutex<Option<Value>>,
    results: Mutex<VecDeque<Result<Value, BackendError>>>,
    repeat_result: Mutex<Option<Value>>,
    pub submitted: Mutex<Vec<(JobKind, Value)>>,
    pub polled: Mutex<Vec<JobHandle>>,
    submit_calls: AtomicUsize,
    status_calls: AtomicUsize,
    result_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(self, response: Result<Value, BackendError>) -> Self {
        self.submits.lock().unwrap().push_back(response);
        self
    }

    pub fn then_status(self, body: Value) -> Self {
        self.statuses.lock().unwrap().push_back(Step::Respond(body));
        self
    }

    pub fn then_statuses(self, body: Value, times: usize) -> Self {
        {
            let mut statuses = self.statuses.lock().unwrap();
            for _ in 0..times {
                statuses.push_back(Step::Respond(body.clone()));
            }
        }
        self
    }

    pub fn then_status_error(self, err: BackendError) -> Self {
        self.statuses.lock().unwrap().push_back(Step::Fail(err));
        self
    }

    pub fn then_gated_status(self, body: Value) -> (Self, Gate) {
        let gate = Gate {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        self.statuses.lock().unwrap().push_back(Step::Gated {
            entered: Arc::clone(&gate.entered),
            release: Arc::clone(&gate.release),
            body,
        });
        (self, gate)
    }

    pub fn repeat_status(self, body: Value) -> Self {
        *self.repeat_status.lock().unwrap() = Some(body);
        self
    }

    pub fn then_result(self, response: Result<Value, BackendError>) -> Self {
        self.results.lock().unwrap().push_back(response);
        self
    }

    pub fn repeat_result(self, body: Value) -> Self {
        *self.repeat_result.lock().unwrap() = Some(body);
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn result_calls(&self) -> usize {
        self.result_calls.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl JobBackend for ScriptedBackend {
    async fn submit(&self, kind: JobKind, payload: &Value) -> Result<Value, BackendError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push((kind, payload.clone()));
        let next = self.submits.lock().unwrap().pop_front();
        next.expect("unexpected submit call")
    }

    async fn status(&self, _kind: JobKind, handle: &JobHandle) -> Result<Value, BackendError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.polled.lock().unwrap().push(handle.clone());
        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(Step::Respond(body)) => Ok(body),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Gated {
                entered,
                release,
                body,
            }) => {
                entered.notify_one();
                release.notified().await;
                Ok(body)
            }
            None => {
                let repeat = self.repeat_status.lock().unwrap().clone();
                Ok(repeat.expect("unexpected status call"))
            }
        }
    }

    async fn result(&self, _kind: JobKind, _handle: &JobHandle) -> Result<Value, BackendError> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.results.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            None => {
                let repeat = self.repeat_result.lock().unwrap().clone();
                Ok(repeat.expect("unexpected result call"))
            }
        }
    }
}

/// A 503 from the backend.
pub fn unavailable() -> BackendError {
    BackendError::Status {
        status: 503,
        message: "service unavailable".to_string(),
        retry_after: None,
    }
}

/// A 404 from the backend.
pub fn not_found(message: &str) -> BackendError {
    BackendError::Status {
        status: 404,
        message: message.to_string(),
        retry_after: None,
    }
}
