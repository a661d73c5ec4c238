//! Operation record types persisted by the ledger.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of the `operations` table.
///
/// Records are immutable once written; `id` is assigned by SQLite and is
/// strictly increasing in write order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationRecord {
    pub id: i64,

    /// RFC 3339 UTC capture time, millisecond precision
    pub timestamp: String,

    pub tool_name: String,

    /// JSON text of the parameters the handler received
    pub parameters: String,

    /// JSON text of the handler output on success, the error message as a
    /// JSON string on failure
    pub result: Option<String>,

    pub success: bool,

    pub duration_ms: i64,
}

impl OperationRecord {
    /// Parameters decoded back into JSON. Falls back to a string for legacy rows.
    pub fn parameters_value(&self) -> Value {
        serde_json::from_str(&self.parameters).unwrap_or_else(|_| Value::String(self.parameters.clone()))
    }

    /// Result decoded back into JSON. Rows that do not parse come back as raw text.
    pub fn result_value(&self) -> Value {
        match &self.result {
            Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone())),
            None => Value::Null,
        }
    }
}

/// An operation outcome waiting to be appended.
///
/// `id` and `timestamp` are assigned by the ledger at write time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOperation {
    pub tool_name: String,
    pub parameters: String,
    pub result: Option<String>,
    pub success: bool,
    pub duration_ms: i64,
}

impl NewOperation {
    /// Outcome of a handler that returned a value.
    pub fn succeeded(tool_name: impl Into<String>, parameters: &Value, result: &Value, duration_ms: u64) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters: parameters.to_string(),
            result: Some(result.to_string()),
            success: true,
            duration_ms: clamp_duration(duration_ms),
        }
    }

    /// Outcome of a handler that signalled failure.
    ///
    /// The detail is stored as a JSON string so it never decodes as another type.
    pub fn failed(tool_name: impl Into<String>, parameters: &Value, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters: parameters.to_string(),
            result: Some(Value::String(detail.into()).to_string()),
            success: false,
            duration_ms: clamp_duration(duration_ms),
        }
    }
}

fn clamp_duration(duration_ms: u64) -> i64 {
    i64::try_from(duration_ms).unwrap_or(i64::MAX)
}

/// Format a timestamp the way the ledger stores it.
///
/// Fixed-width UTC with a `Z` suffix, so lexical order matches time order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in ledger format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Shorten `text` to at most `max_chars` characters, never splitting a char.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_succeeded_serializes_result() {
        let op = NewOperation::succeeded("organize_downloads", &json!({"type": "pdf"}), &json!({"moved": 12}), 5);
        assert!(op.success);
        assert_eq!(op.parameters, r#"{"type":"pdf"}"#);
        assert_eq!(op.result.as_deref(), Some(r#"{"moved":12}"#));
        assert_eq!(op.duration_ms, 5);
    }

    #[test]
    fn test_failed_stores_detail_as_json_string() {
        let op = NewOperation::failed("extract_tax_documents", &json!({}), "OCR engine crashed", 0);
        assert!(!op.success);
        assert_eq!(op.result.as_deref(), Some(r#""OCR engine crashed""#));
        assert_eq!(op.parameters, "{}");
    }

    #[test]
    fn test_failure_detail_that_looks_like_json_stays_a_string() {
        for detail in ["null", "42", r#"{"moved": 1}"#, "true"] {
            let op = NewOperation::failed("t", &json!({}), detail, 0);
            let record = OperationRecord {
                id: 1,
                timestamp: now_timestamp(),
                tool_name: op.tool_name,
                parameters: op.parameters,
                result: op.result,
                success: false,
                duration_ms: 0,
            };
            assert_eq!(record.result_value(), json!(detail));
        }
    }

    #[test]
    fn test_duration_clamped() {
        let op = NewOperation::succeeded("t", &json!({}), &json!(null), u64::MAX);
        assert_eq!(op.duration_ms, i64::MAX);
    }

    #[test]
    fn test_result_value_parses_json() {
        let record = OperationRecord {
            id: 1,
            timestamp: now_timestamp(),
            tool_name: "t".into(),
            parameters: "{}".into(),
            result: Some(r#"{"moved":12}"#.into()),
            success: true,
            duration_ms: 3,
        };
        assert_eq!(record.result_value(), json!({"moved": 12}));
        assert_eq!(record.parameters_value(), json!({}));
    }

    #[test]
    fn test_result_value_falls_back_to_text() {
        let record = OperationRecord {
            id: 1,
            timestamp: now_timestamp(),
            tool_name: "t".into(),
            parameters: "{}".into(),
            result: Some("plain failure".into()),
            success: false,
            duration_ms: 0,
        };
        assert_eq!(record.result_value(), json!("plain failure"));
    }

    #[test]
    fn test_format_timestamp_is_sortable() {
        let early = Utc.with_ymd_and_hms(2025, 1, 9, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 1, 10, 7, 0, 0).unwrap();
        assert_eq!(format_timestamp(early), "2025-01-09T08:00:00.000Z");
        assert!(format_timestamp(early) < format_timestamp(late));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 0), "");
    }
}
