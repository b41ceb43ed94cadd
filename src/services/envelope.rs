//! Probing helpers for backend response envelopes.
//!
//! The backend wraps the same fields at different depths depending on the
//! endpoint (`{job_id}`, `{data: {job_id}}`, `{data: {result: {...}}}`), so
//! every reader here walks a list of candidate paths instead of assuming one.

use serde_json::Value;

/// Envelopes that may hold job metadata (ids, status, progress).
pub const JOB_ENVELOPES: &[&str] = &["", "data", "job", "data.job"];

/// Envelopes that may carry a job's status, most deeply nested first.
pub const STATUS_ENVELOPES: &[&str] = &["data.job", "data", "job", ""];

/// Keys an error object may carry its human-readable text under, in order.
const ERROR_MESSAGE_KEYS: &[&str] = &["message", "error", "detail", "msg", "reason"];

/// Resolve a dotted path like `data.result`. The empty path is the root.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |node, segment| node.get(segment))
}

/// First non-null value found under any `envelope.key` combination,
/// envelopes taking precedence over keys.
pub fn find_field<'a>(value: &'a Value, envelopes: &[&str], keys: &[&str]) -> Option<&'a Value> {
    envelopes
        .iter()
        .filter_map(|envelope| lookup(value, envelope))
        .find_map(|node| {
            keys.iter()
                .filter_map(|key| node.get(*key))
                .find(|v| !v.is_null())
        })
}

/// First non-null value under any of `keys` in the given nodes, nodes
/// taking precedence over keys.
pub fn first_in<'a>(nodes: &[&'a Value], keys: &[&str]) -> Option<&'a Value> {
    nodes.iter().find_map(|node| {
        keys.iter()
            .filter_map(|key| node.get(*key))
            .find(|v| !v.is_null())
    })
}

/// Read an identifier-like scalar. Numbers are accepted because some
/// endpoints return numeric job ids.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Whether a value carries something usable (not null, not blank, not empty).
pub fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items.iter().any(is_meaningful),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

/// Normalize an error payload to a user-facing message.
///
/// Strings pass through. Objects are searched for a message key, recursing
/// into nested error objects; an object without one is rendered as compact
/// JSON so nothing is lost.
pub fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Object(map) => {
            if map.is_empty() {
                return None;
            }
            ERROR_MESSAGE_KEYS
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(error_message)
                .or_else(|| Some(value.to_string()))
        }
        Value::Array(items) => items.iter().find_map(error_message),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_paths() {
        let body = json!({"data": {"result": {"summary": "hi"}}});
        assert_eq!(lookup(&body, "data.result.summary"), Some(&json!("hi")));
        assert_eq!(lookup(&body, ""), Some(&body));
        assert_eq!(lookup(&body, "data.missing"), None);
    }

    #[test]
    fn test_find_field_prefers_outer_envelope() {
        let body = json!({"job_id": "outer", "data": {"job_id": "inner"}});
        let found = find_field(&body, JOB_ENVELOPES, &["job_id"]);
        assert_eq!(found, Some(&json!("outer")));

        let nested = json!({"data": {"jobId": 42}});
        let found = find_field(&nested, JOB_ENVELOPES, &["job_id", "jobId"]);
        assert_eq!(found.and_then(scalar_string).as_deref(), Some("42"));
    }

    #[test]
    fn test_find_field_skips_nulls() {
        let body = json!({"job_id": null, "data": {"job_id": "x1"}});
        let found = find_field(&body, JOB_ENVELOPES, &["job_id"]);
        assert_eq!(found, Some(&json!("x1")));
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(&json!("disk full")).as_deref(), Some("disk full"));
        assert_eq!(
            error_message(&json!({"message": "corrupt file"})).as_deref(),
            Some("corrupt file")
        );
        assert_eq!(
            error_message(&json!({"error": {"detail": "bad page range"}})).as_deref(),
            Some("bad page range")
        );
        assert_eq!(
            error_message(&json!({"code": 7})).as_deref(),
            Some(r#"{"code":7}"#)
        );
        assert_eq!(error_message(&json!("  ")), None);
        assert_eq!(error_message(&json!({})), None);
        assert_eq!(error_message(&Value::Null), None);
    }

    #[test]
    fn test_meaningful_values() {
        assert!(!is_meaningful(&json!("")));
        assert!(!is_meaningful(&json!([])));
        assert!(!is_meaningful(&json!([null, ""])));
        assert!(is_meaningful(&json!(["https://cdn/x.pdf"])));
        assert!(is_meaningful(&json!(0)));
    }
}
