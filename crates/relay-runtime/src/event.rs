// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One part of a piece of content: plain text, or a function call/response
/// embedded inline the way a tool-using model turn represents them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    FunctionCall { name: String, args: Value },
    FunctionResponse { name: String, response: Value },
}

/// A role-tagged bundle of parts, mirroring the `Content`/`Part` shape the
/// adapted third-party agent library hands back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<ContentPart>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            parts: vec![ContentPart::Text { text: text.into() }],
        }
    }

    /// Concatenates every text part. Non-text parts are ignored.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Agent actions attached to an event — currently just the transfer-to-agent
/// signal the adapter forwards verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Actions {
    pub transfer_to_agent: Option<String>,
}

/// A single raw event produced by a runtime turn. The adapter does not
/// interpret the contents — it only forwards whatever the underlying agent
/// library emitted, tagged with enough shape for the Session Runner to
/// classify it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentEvent {
    pub author: Option<String>,
    pub content: Option<Content>,
    pub actions: Option<Actions>,
    pub plan: Option<Value>,
    pub plan_step: Option<Value>,
    /// True once the runtime considers this the final event of the turn.
    pub is_final: bool,
    /// The raw, unprocessed response body for this event, kept around so the
    /// caller can attempt malformed-function-call recovery when no usable
    /// text was found anywhere else.
    pub raw_response: Option<Value>,
}

impl AgentEvent {
    pub fn model_response(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            author: None,
            content: Some(Content {
                role: "model".into(),
                parts: vec![ContentPart::Text { text: text.into() }],
            }),
            actions: None,
            plan: None,
            plan_step: None,
            is_final,
            raw_response: None,
        }
    }

    pub fn transfer(from_agent: &str, to_agent: &str) -> Self {
        let _ = from_agent;
        Self {
            actions: Some(Actions {
                transfer_to_agent: Some(to_agent.to_string()),
            }),
            is_final: false,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_text_concatenates_only_text_parts() {
        let c = Content {
            role: "model".into(),
            parts: vec![
                ContentPart::Text { text: "a".into() },
                ContentPart::FunctionCall {
                    name: "f".into(),
                    args: Value::Null,
                },
                ContentPart::Text { text: "b".into() },
            ],
        };
        assert_eq!(c.text(), "ab");
    }

    #[test]
    fn model_response_marks_final_flag() {
        let e = AgentEvent::model_response("hi", true);
        assert!(e.is_final);
        assert_eq!(e.content.unwrap().text(), "hi");
    }
}
