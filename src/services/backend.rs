use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

use crate::models::job::{JobHandle, JobId};
use crate::models::kind::JobKind;
use crate::services::envelope;

/// Transport seam between the polling protocol and the processing backend.
///
/// Every call returns the raw JSON body; envelope interpretation belongs to
/// the submitter, poller and result fetcher.
pub trait JobBackend: Send + Sync + 'static {
    /// Start a job of `kind` with a free-form payload.
    fn submit(
        &self,
        kind: JobKind,
        payload: &Value,
    ) -> impl Future<Output = Result<Value, BackendError>> + Send;

    /// Fetch the current status body for a job.
    fn status(
        &self,
        kind: JobKind,
        handle: &JobHandle,
    ) -> impl Future<Output = Result<Value, BackendError>> + Send;

    /// Fetch the result body of a completed job.
    fn result(
        &self,
        kind: JobKind,
        handle: &JobHandle,
    ) -> impl Future<Output = Result<Value, BackendError>> + Send;
}

/// reqwest-backed client for the dashboard's processing backend.
pub struct HttpBackend {
    http: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        Url::parse(base_url).map_err(|e| BackendError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let http = Client::builder()
            .user_agent(concat!("docjobs/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a backend-supplied URL or an endpoint path against the base URL.
    pub fn resolve(&self, path_or_url: &str) -> Result<Url, BackendError> {
        let candidate = if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else if path_or_url.starts_with('/') {
            format!("{}{}", self.base_url, path_or_url)
        } else {
            format!("{}/{}", self.base_url, path_or_url)
        };
        Url::parse(&candidate).map_err(|e| BackendError::InvalidUrl(format!("{}: {}", candidate, e)))
    }

    /// `endpoint` with the job id appended as one percent-encoded segment.
    fn job_url(&self, endpoint: &str, job_id: &JobId) -> Result<Url, BackendError> {
        let mut url = self.resolve(endpoint)?;
        match url.path_segments_mut() {
            Ok(mut segments) => {
                segments.pop_if_empty().push(job_id.as_str());
            }
            Err(()) => {
                return Err(BackendError::InvalidUrl(format!(
                    "{}{} cannot hold a job id",
                    self.base_url, endpoint
                )))
            }
        }
        Ok(url)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Value, BackendError> {
        let request = match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(BackendError::from_response(response).await);
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(BackendError::Decode)
    }
}

impl JobBackend for HttpBackend {
    async fn submit(&self, kind: JobKind, payload: &Value) -> Result<Value, BackendError> {
        let url = self.resolve(kind.submit_path())?;
        tracing::debug!(kind = %kind, url = %url, "Submitting job");
        self.execute(self.http.post(url).json(payload)).await
    }

    async fn status(&self, kind: JobKind, handle: &JobHandle) -> Result<Value, BackendError> {
        let url = match &handle.poll_url {
            Some(poll_url) => self.resolve(poll_url)?,
            None => self.job_url(kind.status_endpoint(), &handle.job_id)?,
        };
        self.execute(self.http.get(url)).await
    }

    async fn result(&self, kind: JobKind, handle: &JobHandle) -> Result<Value, BackendError> {
        let url = match (&handle.result_url, kind.result_endpoint()) {
            (Some(result_url), _) => self.resolve(result_url)?,
            (None, Some(endpoint)) => self.job_url(endpoint, &handle.job_id)?,
            (None, None) => return Err(BackendError::NoResultEndpoint(kind)),
        };
        self.execute(self.http.get(url)).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("backend response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid backend URL {0}")]
    InvalidUrl(String),

    #[error("{0} jobs have no result endpoint")]
    NoResultEndpoint(JobKind),
}

impl BackendError {
    pub async fn from_response(response: Response) -> BackendError {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| envelope::error_message(&body))
            .unwrap_or_else(|| {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    "empty response body".to_string()
                } else {
                    trimmed.chars().take(200).collect()
                }
            });

        BackendError::Status {
            status,
            message,
            retry_after,
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Decode(_) => true,
            Self::InvalidUrl(_) | Self::NoResultEndpoint(_) => false,
        }
    }

    /// Server-requested delay from a `Retry-After` header.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Message for the user, without transport framing.
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: u16) -> BackendError {
        BackendError::Status {
            status,
            message: "x".to_string(),
            retry_after: None,
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(status_error(503).is_transient());
        assert!(status_error(429).is_transient());
        assert!(status_error(408).is_transient());
        assert!(!status_error(404).is_transient());
        assert!(!status_error(422).is_transient());
        assert!(!BackendError::InvalidUrl("::".into()).is_transient());
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let backend =
            HttpBackend::new("http://backend.local:8080/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            backend.resolve("/api/jobs/1").unwrap().as_str(),
            "http://backend.local:8080/api/jobs/1"
        );
        assert_eq!(
            backend.resolve("api/jobs/1").unwrap().as_str(),
            "http://backend.local:8080/api/jobs/1"
        );
        assert_eq!(
            backend.resolve("https://cdn.example.com/r/1").unwrap().as_str(),
            "https://cdn.example.com/r/1"
        );
    }

    #[test]
    fn test_job_id_is_one_encoded_segment() {
        let backend =
            HttpBackend::new("http://backend.local:8080/", None, Duration::from_secs(5)).unwrap();
        let url = backend
            .job_url("/api/convert/status", &JobId::new("a/b?c#d"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://backend.local:8080/api/convert/status/a%2Fb%3Fc%23d"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let err = HttpBackend::new("not a url", None, Duration::from_secs(1)).err().unwrap();
        assert!(matches!(err, BackendError::InvalidUrl(_)));
    }
}
