//! Presentation formatter.
//!
//! Two pure renderings of the same output stream: a grouped view of labeled,
//! severity-bucketed cards interleaved with plain text in input order, and a
//! raw view that pretty-prints each structured record and colorizes it with a
//! single regex scan. Stripping the styling from the raw view reproduces the
//! pretty-printed text byte-for-byte.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::audit::{
    self, AuditEvent, OutputLine, ACTION_CALL_ALLOWED, ACTION_CALL_DENIED, ACTION_CALL_EXECUTED,
    ACTION_CALL_FAILED, ACTION_CALL_WOULD_DENY, ACTION_POSTCONDITION_WARNING,
};

/// Visual severity bucket of an audit card.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Deny,
    Warn,
    Ok,
}

impl Severity {
    /// Bucket for an action string.
    pub fn for_action(action: &str) -> Self {
        match action {
            ACTION_CALL_DENIED | ACTION_CALL_WOULD_DENY => Severity::Deny,
            ACTION_POSTCONDITION_WARNING => Severity::Warn,
            _ => Severity::Ok,
        }
    }
}

/// Fixed action label table; unknown actions render upper-cased verbatim.
pub fn action_label(action: &str) -> String {
    match action {
        ACTION_CALL_DENIED => "DENIED".to_string(),
        ACTION_CALL_WOULD_DENY => "WOULD DENY".to_string(),
        ACTION_CALL_ALLOWED => "ALLOWED".to_string(),
        ACTION_CALL_EXECUTED => "EXECUTED".to_string(),
        ACTION_CALL_FAILED => "FAILED".to_string(),
        ACTION_POSTCONDITION_WARNING => "WARNING".to_string(),
        other => other.to_uppercase(),
    }
}

/// One labeled card in the grouped view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditCard {
    pub label: String,
    pub severity: Severity,
    pub tool_name: String,
    pub decision_name: Option<String>,
    pub reason: Option<String>,
}

impl From<&AuditEvent> for AuditCard {
    fn from(event: &AuditEvent) -> Self {
        Self {
            label: action_label(&event.action),
            severity: Severity::for_action(&event.action),
            tool_name: event.tool_name.clone(),
            decision_name: event.decision_name.clone(),
            reason: event.reason.clone(),
        }
    }
}

/// One block of the grouped view, in input order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputBlock {
    Card(AuditCard),
    Text(String),
}

/// Render the parsed stream as grouped cards and preformatted text lines.
///
/// Ordering between audit and text blocks exactly matches input order; no
/// reordering, no bucketing by type.
pub fn grouped_view(lines: &[OutputLine]) -> Vec<OutputBlock> {
    lines
        .iter()
        .map(|line| match line {
            OutputLine::Audit { event } => OutputBlock::Card(AuditCard::from(event)),
            OutputLine::Text { text } => OutputBlock::Text(text.clone()),
        })
        .collect()
}

/// Token class of one colorized span.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Key,
    Str,
    Number,
    Bool,
    Null,
    Punct,
    Plain,
}

/// One styled span. Concatenating span texts in order reproduces the
/// colorized input exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Span {
    pub kind: TokenKind,
    pub text: String,
}

impl Span {
    fn new(kind: TokenKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
        }
    }
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"("(?:[^"\\]|\\.)*")\s*:|("(?:[^"\\]|\\.)*")|(-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)\b|(true|false)|(null)|([{}\[\],:])"#,
        )
        .expect("token regex is valid")
    })
}

/// Classify JSON text into styled spans with one regex scan.
///
/// Whitespace and anything unmatched become `Plain` spans, and a key's
/// trailing `:` (plus any interior whitespace) becomes a `Punct` span, so the
/// spans always concatenate back to the input byte-for-byte.
pub fn colorize(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut last = 0;

    for caps in token_regex().captures_iter(text) {
        let full = caps.get(0).expect("group 0 always present");
        if full.start() > last {
            spans.push(Span::new(TokenKind::Plain, &text[last..full.start()]));
        }

        if let Some(key) = caps.get(1) {
            spans.push(Span::new(TokenKind::Key, key.as_str()));
            spans.push(Span::new(TokenKind::Punct, &text[key.end()..full.end()]));
        } else if let Some(s) = caps.get(2) {
            spans.push(Span::new(TokenKind::Str, s.as_str()));
        } else if let Some(n) = caps.get(3) {
            spans.push(Span::new(TokenKind::Number, n.as_str()));
        } else if let Some(b) = caps.get(4) {
            spans.push(Span::new(TokenKind::Bool, b.as_str()));
        } else if let Some(u) = caps.get(5) {
            spans.push(Span::new(TokenKind::Null, u.as_str()));
        } else {
            spans.push(Span::new(TokenKind::Punct, full.as_str()));
        }

        last = full.end();
    }

    if last < text.len() {
        spans.push(Span::new(TokenKind::Plain, &text[last..]));
    }

    spans
}

/// One line of the raw view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawLine {
    /// A structured record, pretty-printed and colorized.
    Json { spans: Vec<Span> },
    /// Any other line, verbatim.
    Text { text: String },
}

/// Render raw output: structured records pretty-printed with stable
/// indentation and colorized; everything else passes through verbatim.
pub fn raw_view(raw: &str) -> Vec<RawLine> {
    let mut result = Vec::new();

    for line in raw.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('{') {
            if let Some(value) = audit::audit_value(trimmed) {
                let pretty =
                    serde_json::to_string_pretty(&value).unwrap_or_else(|_| trimmed.to_string());
                result.push(RawLine::Json {
                    spans: colorize(&pretty),
                });
                continue;
            }
        }
        result.push(RawLine::Text {
            text: line.to_string(),
        });
    }

    result
}

/// Strip styling: concatenate span texts.
pub fn strip_spans(spans: &[Span]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::parse_lines;

    const DENIED_LINE: &str = r#"{"schema_version": 1, "action": "call_denied", "tool_name": "read_file", "reason": "Sensitive file '/app/.env' blocked.", "decision_source": "contract", "decision_name": "block-sensitive-reads", "tool_success": null, "contracts_evaluated": []}"#;

    #[test]
    fn test_action_labels() {
        assert_eq!(action_label("call_denied"), "DENIED");
        assert_eq!(action_label("call_would_deny"), "WOULD DENY");
        assert_eq!(action_label("call_allowed"), "ALLOWED");
        assert_eq!(action_label("call_executed"), "EXECUTED");
        assert_eq!(action_label("call_failed"), "FAILED");
        assert_eq!(action_label("postcondition_warning"), "WARNING");
        assert_eq!(action_label("call_quarantined"), "CALL_QUARANTINED");
    }

    #[test]
    fn test_severity_buckets() {
        assert_eq!(Severity::for_action("call_denied"), Severity::Deny);
        assert_eq!(Severity::for_action("call_would_deny"), Severity::Deny);
        assert_eq!(Severity::for_action("postcondition_warning"), Severity::Warn);
        assert_eq!(Severity::for_action("call_allowed"), Severity::Ok);
        assert_eq!(Severity::for_action("call_executed"), Severity::Ok);
        assert_eq!(Severity::for_action("something_new"), Severity::Ok);
    }

    #[test]
    fn test_grouped_view_preserves_order() {
        let raw = format!("plain first\n{DENIED_LINE}\nplain last");
        let blocks = grouped_view(&parse_lines(&raw));
        assert_eq!(blocks.len(), 3);
        assert!(matches!(&blocks[0], OutputBlock::Text(t) if t == "plain first"));
        match &blocks[1] {
            OutputBlock::Card(card) => {
                assert_eq!(card.label, "DENIED");
                assert_eq!(card.severity, Severity::Deny);
                assert_eq!(card.tool_name, "read_file");
                assert_eq!(card.decision_name.as_deref(), Some("block-sensitive-reads"));
            }
            other => panic!("expected card, got {other:?}"),
        }
        assert!(matches!(&blocks[2], OutputBlock::Text(t) if t == "plain last"));
    }

    #[test]
    fn test_colorize_round_trips_pretty_json() {
        let value: serde_json::Value = serde_json::from_str(DENIED_LINE).unwrap();
        let pretty = serde_json::to_string_pretty(&value).unwrap();
        let spans = colorize(&pretty);
        assert_eq!(strip_spans(&spans), pretty);
    }

    #[test]
    fn test_colorize_classifies_tokens() {
        let spans = colorize(r#"{"count": -1.5e3, "on": true, "off": false, "gone": null}"#);
        let kind_of = |text: &str| {
            spans
                .iter()
                .find(|s| s.text == text)
                .unwrap_or_else(|| panic!("no span for {text}"))
                .kind
        };
        assert_eq!(kind_of(r#""count""#), TokenKind::Key);
        assert_eq!(kind_of("-1.5e3"), TokenKind::Number);
        assert_eq!(kind_of("true"), TokenKind::Bool);
        assert_eq!(kind_of("false"), TokenKind::Bool);
        assert_eq!(kind_of("null"), TokenKind::Null);
        assert_eq!(kind_of("{"), TokenKind::Punct);
    }

    #[test]
    fn test_colorize_keyword_inside_string_stays_string() {
        let spans = colorize(r#"{"note": "this is true and null"}"#);
        let s = spans
            .iter()
            .find(|s| s.text.contains("this is true"))
            .unwrap();
        assert_eq!(s.kind, TokenKind::Str);
    }

    #[test]
    fn test_colorize_escaped_quotes_round_trip() {
        let input = r#"{"msg": "she said \"no\""}"#;
        assert_eq!(strip_spans(&colorize(input)), input);
    }

    #[test]
    fn test_raw_view_mixes_json_and_text() {
        let raw = format!("DENIED: .env\n{DENIED_LINE}\n");
        let lines = raw_view(&raw);
        assert_eq!(lines.len(), 2);
        assert!(matches!(&lines[0], RawLine::Text { text } if text == "DENIED: .env"));
        match &lines[1] {
            RawLine::Json { spans } => {
                let stripped = strip_spans(spans);
                assert!(stripped.contains("call_denied"));
                // Pretty-printed, multi-line, stable indentation.
                assert!(stripped.contains("\n  "));
            }
            other => panic!("expected json line, got {other:?}"),
        }
    }

    #[test]
    fn test_raw_view_round_trip_invariant() {
        let lines = raw_view(DENIED_LINE);
        match &lines[0] {
            RawLine::Json { spans } => {
                let value: serde_json::Value = serde_json::from_str(DENIED_LINE).unwrap();
                let pretty = serde_json::to_string_pretty(&value).unwrap();
                assert_eq!(strip_spans(spans), pretty);
            }
            other => panic!("expected json line, got {other:?}"),
        }
    }

    #[test]
    fn test_raw_view_non_audit_json_is_text() {
        let lines = raw_view(r#"{"just": "json"}"#);
        assert!(matches!(&lines[0], RawLine::Text { .. }));
    }
}
