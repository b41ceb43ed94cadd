use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::job::JobId;
use crate::models::kind::JobKind;

/// Canonical result of a completed job, whatever envelope the backend used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub kind: JobKind,
    pub job_id: JobId,
    /// Summary or generated text, when the job produces text.
    pub summary: Option<String>,
    /// Download links, primary first.
    pub download_urls: Vec<String>,
    /// Generated items (flashcards, slides).
    pub items: Vec<Value>,
    /// The matched result object, untouched.
    pub payload: Value,
    /// Envelope path the payload was found under (`""` for the root).
    pub matched_path: String,
}

impl JobOutput {
    pub fn primary_download_url(&self) -> Option<&str> {
        self.download_urls.first().map(String::as_str)
    }
}
