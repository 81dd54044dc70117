// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wraps JSON payloads embedded in a response in `<pre data-content-type="...">`
//! markers so the client can render them distinctly from prose. Applied once
//! to the final response text of a turn, never to intermediate events.
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

const SPECIAL_MARKERS: &[&str] = &[
    r#"{"call_search_agent_response":"#,
    r#"{"call_web_search_response":"#,
    r#"{"function_call_response":"#,
];

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap())
}

fn json_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(\{.*\})").unwrap())
}

/// Post-processes a final response: recognized JSON is wrapped for the
/// client, plain prose passes through untouched. Already-wrapped text is
/// returned as-is to avoid double-processing.
pub fn render_response_text(text: &str) -> String {
    if text.contains("<pre data-content-type=") {
        return text.to_string();
    }

    if let Some(wrapped) = wrap_special_json(text) {
        return wrapped;
    }

    wrap_json_code_blocks(text)
}

fn is_special(text: &str) -> bool {
    SPECIAL_MARKERS.iter().any(|m| text.contains(m))
}

fn wrap_special_json(text: &str) -> Option<String> {
    if !is_special(text) {
        return None;
    }

    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') && serde_json::from_str::<Value>(trimmed).is_ok() {
        return Some(wrap_pre("json-raw", text));
    }

    let caps = json_object_re().captures(text)?;
    let json_str = caps.get(1)?.as_str();
    if serde_json::from_str::<Value>(json_str).is_err() {
        return None;
    }
    Some(text.replacen(json_str, &wrap_pre("json-raw", json_str), 1))
}

fn wrap_json_code_blocks(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_end = 0;

    for caps in code_block_re().captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let block = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");

        let looks_like_json = (block.starts_with('{') && block.ends_with('}'))
            || (block.starts_with('[') && block.ends_with(']'));
        if !looks_like_json {
            continue;
        }

        let Ok(parsed) = serde_json::from_str::<Value>(block) else {
            continue;
        };

        result.push_str(&text[last_end..whole.start()]);
        if is_special(block) {
            result.push_str(&wrap_pre("json-raw", block));
        } else {
            let formatted = serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| block.to_string());
            result.push_str(&wrap_pre("json-formatted", &formatted));
        }
        last_end = whole.end();
    }
    result.push_str(&text[last_end..]);
    result
}

fn wrap_pre(content_type: &str, content: &str) -> String {
    format!(
        r#"<pre data-content-type="{content_type}" class="content-{content_type}">{}</pre>"#,
        html_escape(content)
    )
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_plain_prose_unchanged() {
        assert_eq!(render_response_text("just some text"), "just some text");
    }

    #[test]
    fn wraps_whole_special_json_response() {
        let input = r#"{"call_search_agent_response": {"q": "rust"}}"#;
        let out = render_response_text(input);
        assert!(out.starts_with(r#"<pre data-content-type="json-raw""#));
        assert!(out.ends_with("</pre>"));
    }

    #[test]
    fn wraps_json_code_block_as_formatted() {
        let input = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        let out = render_response_text(input);
        assert!(out.contains(r#"data-content-type="json-formatted""#));
        assert!(out.starts_with("Here you go:"));
        assert!(out.ends_with("Done."));
    }

    #[test]
    fn leaves_non_json_code_blocks_untouched() {
        let input = "```rust\nfn main() {}\n```";
        assert_eq!(render_response_text(input), input);
    }

    #[test]
    fn skips_reprocessing_already_wrapped_text() {
        let input = r#"<pre data-content-type="json-raw">{"a": 1}</pre>"#;
        assert_eq!(render_response_text(input), input);
    }
}
