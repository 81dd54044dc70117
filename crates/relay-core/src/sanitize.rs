// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Defence-in-depth against prompt-injected control sequences. Applied to
//! every piece of content that enters the pipeline from outside: scheduler
//! prompts, reminder messages, memory search results, MCP tool outputs.
//! Never raises — the worst case is a truncated or stripped string.
use serde_json::Value;

/// Strips control characters (other than tab/newline) and caps length to
/// `max_len` characters. `source` is carried only for tracing context.
pub fn sanitize(text: &str, source: &str, max_len: usize) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| *c == '\t' || *c == '\n' || !c.is_control())
        .collect();

    if cleaned.chars().count() > max_len {
        tracing::debug!(source, original_len = cleaned.len(), max_len, "sanitize: truncating");
        cleaned.chars().take(max_len).collect()
    } else {
        cleaned
    }
}

/// Recursively sanitizes every string leaf of a JSON value in place.
/// Used for memory search hits and MCP tool outputs, which may carry
/// nested payloads rather than a single string.
pub fn sanitize_json(value: &mut Value, source: &str, max_len: usize) {
    match value {
        Value::String(s) => *s = sanitize(s, source, max_len),
        Value::Array(items) => {
            for item in items {
                sanitize_json(item, source, max_len);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                sanitize_json(v, source, max_len);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters_except_tab_and_newline() {
        let input = "hello\x07world\ttab\nline";
        let out = sanitize(input, "test", 1000);
        assert_eq!(out, "helloworld\ttab\nline");
    }

    #[test]
    fn caps_length_to_budget() {
        let input = "x".repeat(100);
        let out = sanitize(&input, "test", 10);
        assert_eq!(out.chars().count(), 10);
    }

    #[test]
    fn never_panics_on_empty_input() {
        assert_eq!(sanitize("", "test", 10), "");
    }

    #[test]
    fn sanitize_json_cleans_nested_strings() {
        let mut v = serde_json::json!({
            "a": "bad\x07char",
            "b": ["also\x01bad", {"c": "fine"}],
        });
        sanitize_json(&mut v, "test", 1000);
        assert_eq!(v["a"], "badchar");
        assert_eq!(v["b"][0], "alsobad");
        assert_eq!(v["b"][1]["c"], "fine");
    }
}
