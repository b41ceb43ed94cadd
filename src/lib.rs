//! Document Dashboard Job Client
//!
//! This library provides the job orchestration layer of the document
//! dashboard: submitting processing jobs to the backend, polling them to a
//! terminal state, and normalizing their results and errors.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use error::{ErrorKind, JobError};
pub use models::job::{JobHandle, JobId, JobStatus};
pub use models::kind::JobKind;
pub use models::output::JobOutput;
pub use models::snapshot::{JobSnapshot, TrackerPhase};
pub use services::backend::{BackendError, HttpBackend, JobBackend};
pub use services::poller::PollPolicy;
pub use services::tracker::{JobOutcome, JobTracker, TrackedJob};
