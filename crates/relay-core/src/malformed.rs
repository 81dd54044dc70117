// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Recovers response text from a `MALFORMED_FUNCTION_CALL` turn: some models
//! occasionally emit Python-like `print("...")` statements instead of plain
//! text when the finish reason is malformed. We pull the literal string
//! arguments back out line by line rather than dropping the turn.
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn print_quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"print\s*\(\s*['"](.+?)['"]\s*\)"#).unwrap())
}

/// Scans `raw_response.candidates[*]` for a `finish_reason ==
/// "MALFORMED_FUNCTION_CALL"` candidate and extracts text from its
/// `finish_message`. Returns `None` if no malformed candidate is present.
pub fn extract_from_malformed_function_call(raw_response: &Value) -> Option<String> {
    let candidates = raw_response.get("candidates")?.as_array()?;
    for candidate in candidates {
        let finish_reason = candidate.get("finish_reason").and_then(Value::as_str);
        if finish_reason != Some("MALFORMED_FUNCTION_CALL") {
            continue;
        }
        let content = candidate.get("finish_message").and_then(Value::as_str)?;
        if let Some(text) = extract_from_print_statements(content) {
            return Some(text);
        }
    }
    None
}

/// Extracts the string arguments of `print(...)` calls from `content`, one
/// per line. Falls back to returning `content` unchanged if it contains no
/// `print(` calls at all, or if nothing could be extracted from lines that
/// do look like print calls.
fn extract_from_print_statements(content: &str) -> Option<String> {
    if content.is_empty() {
        return None;
    }
    if !content.contains("print(") {
        return Some(content.to_string());
    }

    let mut result = Vec::new();
    for raw_line in content.trim().lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = print_quoted_re().captures(line) {
            result.push(caps[1].to_string());
            continue;
        }

        if let Some(inner) = line.strip_prefix("print(").and_then(|s| s.strip_suffix(')')) {
            let inner = inner.trim();
            result.push(strip_matching_quotes(inner).to_string());
        }
    }

    if result.is_empty() {
        Some(content.to_string())
    } else {
        Some(result.join("\n"))
    }
}

fn strip_matching_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_from_quoted_print_statements() {
        let raw = serde_json::json!({
            "candidates": [{
                "finish_reason": "MALFORMED_FUNCTION_CALL",
                "finish_message": "print(\"Hello there\")\nprint('second line')",
            }]
        });
        let text = extract_from_malformed_function_call(&raw).unwrap();
        assert_eq!(text, "Hello there\nsecond line");
    }

    #[test]
    fn returns_none_when_no_malformed_candidate() {
        let raw = serde_json::json!({
            "candidates": [{ "finish_reason": "STOP" }]
        });
        assert!(extract_from_malformed_function_call(&raw).is_none());
    }

    #[test]
    fn falls_back_to_original_content_without_print_calls() {
        let raw = serde_json::json!({
            "candidates": [{
                "finish_reason": "MALFORMED_FUNCTION_CALL",
                "finish_message": "just some text",
            }]
        });
        assert_eq!(
            extract_from_malformed_function_call(&raw).unwrap(),
            "just some text"
        );
    }
}
