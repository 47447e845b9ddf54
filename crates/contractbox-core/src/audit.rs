//! Audit record parser.
//!
//! Captured run output is a single raw text stream in which machine-readable
//! audit records and human-readable print lines interleave. The parser is
//! deliberately permissive: a line is an audit event only when it parses as a
//! JSON object carrying a truthy schema-version marker and a non-empty
//! action; every other non-blank line passes through as text, untrimmed.
//! Decode failures never raise.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Actions with a fixed presentation mapping. The wire set is open; unknown
/// actions are kept verbatim on the event.
pub const ACTION_CALL_DENIED: &str = "call_denied";
pub const ACTION_CALL_WOULD_DENY: &str = "call_would_deny";
pub const ACTION_CALL_ALLOWED: &str = "call_allowed";
pub const ACTION_CALL_EXECUTED: &str = "call_executed";
pub const ACTION_CALL_FAILED: &str = "call_failed";
pub const ACTION_POSTCONDITION_WARNING: &str = "postcondition_warning";

/// One contract evaluated while deciding a call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractCheck {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub passed: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// One decoded enforcement decision.
///
/// Immutable once decoded; a pure projection of one line of output with no
/// identity beyond its position in the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub schema_version: Value,
    pub action: String,
    pub tool_name: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub decision_source: Option<String>,
    #[serde(default)]
    pub decision_name: Option<String>,
    #[serde(default)]
    pub tool_success: Option<bool>,
    #[serde(default)]
    pub contracts_evaluated: Vec<ContractCheck>,
}

/// One classified line of run output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputLine {
    Audit { event: AuditEvent },
    /// Original, untrimmed line.
    Text { text: String },
}

/// Parse one trimmed line as JSON and verify the audit markers.
///
/// Both marker fields must be usable, not merely present: a falsy
/// `schema_version` (`null`, `0`, `""`, `false`) or an empty `action`
/// demotes the line to plain text.
pub(crate) fn audit_value(trimmed: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(trimmed).ok()?;
    if !marker_is_usable(value.get("schema_version")?) {
        return None;
    }
    let action = value.get("action")?.as_str()?;
    if action.is_empty() {
        return None;
    }
    Some(value)
}

fn marker_is_usable(marker: &Value) -> bool {
    match marker {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Attempt to decode one trimmed line as an audit record.
fn decode_audit(trimmed: &str) -> Option<AuditEvent> {
    serde_json::from_value(audit_value(trimmed)?).ok()
}

/// Split raw output into ordered, classified lines.
///
/// Blank lines are dropped; everything else survives in input order, so
/// concatenating the lines' textual renderings reproduces every informative
/// line of the original output.
pub fn parse_lines(raw: &str) -> Vec<OutputLine> {
    let mut result = Vec::new();

    for line in raw.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('{') {
            if let Some(event) = decode_audit(trimmed) {
                result.push(OutputLine::Audit { event });
                continue;
            }
        }
        result.push(OutputLine::Text {
            text: line.to_string(),
        });
    }

    result
}
