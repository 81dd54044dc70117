// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Classifies a raw `relay_runtime::AgentEvent` into the shape persisted in
//! the per-session event log and returned to the client.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use relay_runtime::{AgentEvent, ContentPart};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    ToolCall,
    AgentTransfer,
    Planner,
    ModelResponse,
    Other,
}

/// A compact record appended to the per-session event log. Deduplicated on
/// `(category, summary, timestamp)` by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub category: EventCategory,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
    /// Extracted text, present only for `ModelResponse`.
    pub text: Option<String>,
    /// Only meaningful for `ModelResponse`: whether the runtime marked this
    /// as the final event of the turn.
    pub is_final: bool,
    pub details: Value,
}

/// Classifies one raw event. `agent_models` maps agent name → model name,
/// used to annotate `AgentTransfer` and `ModelResponse` events when the
/// target agent's model is known from config.
pub fn classify(event: &AgentEvent, agent_models: &HashMap<String, String>) -> ClassifiedEvent {
    let now = Utc::now();

    if let Some(to_agent) = event
        .actions
        .as_ref()
        .and_then(|a| a.transfer_to_agent.as_ref())
    {
        let from_agent = event.author.clone();
        let model = agent_models.get(to_agent).cloned();
        let mut details = serde_json::json!({
            "from_agent": from_agent,
            "to_agent": to_agent,
        });
        if let Some(model) = &model {
            details["model"] = Value::String(model.clone());
        }
        return ClassifiedEvent {
            category: EventCategory::AgentTransfer,
            summary: format!("Transfer to: {to_agent}"),
            timestamp: now,
            text: None,
            is_final: false,
            details,
        };
    }

    if let Some(content) = &event.content {
        for part in &content.parts {
            match part {
                ContentPart::FunctionCall { name, args } => {
                    return ClassifiedEvent {
                        category: EventCategory::ToolCall,
                        summary: format!("Tool Call: {name}"),
                        timestamp: now,
                        text: None,
                        is_final: false,
                        details: serde_json::json!({ "tool_name": name, "input": args }),
                    };
                }
                ContentPart::FunctionResponse { name, response } => {
                    return ClassifiedEvent {
                        category: EventCategory::ToolCall,
                        summary: format!("Tool Response: {name}"),
                        timestamp: now,
                        text: None,
                        is_final: false,
                        details: serde_json::json!({ "tool_name": name, "output": response }),
                    };
                }
                ContentPart::Text { .. } => {}
            }
        }
    }

    if let Some(plan) = &event.plan {
        return ClassifiedEvent {
            category: EventCategory::Planner,
            summary: "Plan Created".into(),
            timestamp: now,
            text: None,
            is_final: false,
            details: serde_json::json!({ "plan": plan }),
        };
    }
    if let Some(plan_step) = &event.plan_step {
        return ClassifiedEvent {
            category: EventCategory::Planner,
            summary: format!("Plan Step: {}", plan_step_summary(plan_step)),
            timestamp: now,
            text: None,
            is_final: false,
            details: serde_json::json!({ "plan_step": plan_step }),
        };
    }

    if event.is_final || event.content.is_some() {
        let text = event.content.as_ref().map(|c| c.text()).unwrap_or_default();
        let summary = if event.is_final {
            "Final Response"
        } else {
            "Intermediate Response"
        };
        return ClassifiedEvent {
            category: EventCategory::ModelResponse,
            summary: summary.into(),
            timestamp: now,
            text: Some(text),
            is_final: event.is_final,
            details: serde_json::json!({ "author": event.author }),
        };
    }

    ClassifiedEvent {
        category: EventCategory::Other,
        summary: "Other Event".into(),
        timestamp: now,
        text: None,
        is_final: false,
        details: serde_json::json!({ "author": event.author }),
    }
}

fn plan_step_summary(plan_step: &Value) -> String {
    plan_step
        .get("description")
        .or_else(|| plan_step.get("action"))
        .and_then(Value::as_str)
        .unwrap_or("Plan Step")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_runtime::{Actions, Content};

    #[test]
    fn transfer_takes_priority_over_everything_else() {
        let event = AgentEvent {
            author: Some("beto".into()),
            actions: Some(Actions {
                transfer_to_agent: Some("scout".into()),
            }),
            content: Some(Content::user_text("ignored")),
            ..Default::default()
        };
        let models = HashMap::from([("scout".to_string(), "claude-3".to_string())]);
        let classified = classify(&event, &models);
        assert_eq!(classified.category, EventCategory::AgentTransfer);
        assert_eq!(classified.details["model"], "claude-3");
    }

    #[test]
    fn function_call_part_classifies_as_tool_call() {
        let event = AgentEvent {
            content: Some(Content {
                role: "model".into(),
                parts: vec![ContentPart::FunctionCall {
                    name: "search".into(),
                    args: serde_json::json!({"q": "rust"}),
                }],
            }),
            ..Default::default()
        };
        let classified = classify(&event, &HashMap::new());
        assert_eq!(classified.category, EventCategory::ToolCall);
        assert_eq!(classified.summary, "Tool Call: search");
    }

    #[test]
    fn final_text_event_classifies_as_model_response() {
        let event = AgentEvent::model_response("done", true);
        let classified = classify(&event, &HashMap::new());
        assert_eq!(classified.category, EventCategory::ModelResponse);
        assert!(classified.is_final);
        assert_eq!(classified.text.as_deref(), Some("done"));
    }

    #[test]
    fn bare_event_with_no_signal_classifies_as_other() {
        let event = AgentEvent::default();
        let classified = classify(&event, &HashMap::new());
        assert_eq!(classified.category, EventCategory::Other);
    }
}
