use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::backend::{BackendError, HttpBackend};
use crate::services::poller::PollPolicy;
use crate::services::tracker::JobTracker;

/// Shared client state built once from configuration.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<HttpBackend>,
    pub policy: PollPolicy,
}

impl AppState {
    pub fn new(backend: HttpBackend, policy: PollPolicy) -> Self {
        Self {
            backend: Arc::new(backend),
            policy,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, BackendError> {
        let backend = HttpBackend::new(
            &config.backend_url,
            config.api_token.clone(),
            config.request_timeout(),
        )?;
        Ok(Self::new(backend, config.poll_policy()))
    }

    /// A fresh tracker, one per followed job stream.
    pub fn tracker(&self) -> JobTracker<HttpBackend> {
        JobTracker::new(Arc::clone(&self.backend), self.policy.clone())
    }
}
