//! Backend response bodies observed across job types

#![allow(dead_code)]

use serde_json::{json, Value};

pub fn submitted(job_id: &str) -> Value {
    json!({"job_id": job_id})
}

/// Submission wrapped in a `data` envelope with a numeric id and poll URL.
pub fn submitted_nested(job_id: u64) -> Value {
    json!({
        "success": true,
        "data": {
            "job_id": job_id,
            "poll_url": format!("/api/jobs/{}/status", job_id)
        }
    })
}

pub fn pending() -> Value {
    json!({"status": "pending", "progress": 0})
}

pub fn running(progress: u64, stage: &str) -> Value {
    json!({
        "status": "running",
        "progress": progress,
        "stage": stage,
        "logs": [format!("{} started", stage)]
    })
}

/// The older envelope some endpoints still return.
pub fn processing_nested(progress: u64) -> Value {
    json!({"data": {"status": "processing", "progress": progress}})
}

pub fn completed() -> Value {
    json!({"status": "completed", "progress": 100})
}

/// Job status wrapped by an API envelope that reports its own `status`.
pub fn wrapped(inner: Value) -> Value {
    json!({"status": "success", "message": "Job status retrieved", "data": inner})
}

pub fn failed_with(error: Value) -> Value {
    json!({"status": "failed", "error": error})
}

pub fn download_under_data_result(url: &str) -> Value {
    json!({"success": true, "data": {"result": {"download_url": url}}})
}

pub fn download_under_data(url: &str) -> Value {
    json!({"success": true, "data": {"download_url": url}})
}

pub fn summary_result(summary: &str) -> Value {
    json!({"result": {"summary": summary, "key_points": ["a", "b"]}})
}

/// Completed status that carries its result inline (PDF editor).
pub fn completed_with_inline_download(url: &str) -> Value {
    json!({
        "status": "completed",
        "progress": 100,
        "data": {"result": {"download_urls": [url]}}
    })
}

pub fn unrecognized_result() -> Value {
    json!({"data": {"output_file": "report.pdf"}})
}
