//! Tool registry exposed to the model during a step
//!
//! The set is closed: a tool call is only executed after its name resolved to
//! one of these variants and the variant is enabled for the running step.

use roster_llm::{ToolSpec, SUBMIT_TOOL};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Tools a step can offer to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    /// Read-only catalog query for capabilities
    FetchCapabilities,
    /// Read-only catalog query for triggers
    FetchTriggers,
    /// Question to the human; suspends the step
    AskHuman,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::FetchCapabilities => "fetch_capabilities",
            Tool::FetchTriggers => "fetch_triggers",
            Tool::AskHuman => "ask_human",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "fetch_capabilities" => Some(Tool::FetchCapabilities),
            "fetch_triggers" => Some(Tool::FetchTriggers),
            "ask_human" => Some(Tool::AskHuman),
            _ => None,
        }
    }

    pub fn spec(&self) -> ToolSpec {
        match self {
            Tool::FetchCapabilities => ToolSpec {
                name: self.name().to_string(),
                description: "List the capabilities available to this organization, grouped by \
                              provider. Returns [{providerId, capabilities: [{id, description, \
                              paramsSchema, risk}]}]."
                    .to_string(),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            Tool::FetchTriggers => ToolSpec {
                name: self.name().to_string(),
                description: "List the triggers that can activate an agent. Returns \
                              [{id, providerId, description}]."
                    .to_string(),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            Tool::AskHuman => ToolSpec {
                name: self.name().to_string(),
                description: "Ask the human one question. Use only when the answer changes \
                              the result and was not given before."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "required": ["question"],
                    "properties": {"question": {"type": "string"}}
                }),
            },
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The reserved tool carrying a step's final answer
pub fn submit_spec(response_schema: Value) -> ToolSpec {
    ToolSpec {
        name: SUBMIT_TOOL.to_string(),
        description: "Submit the final answer. The input must follow the schema exactly."
            .to_string(),
        input_schema: response_schema,
    }
}

/// Question text of an `ask_human` call
pub fn question_of(input: &Value) -> Option<String> {
    input
        .get("question")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for tool in [Tool::FetchCapabilities, Tool::FetchTriggers, Tool::AskHuman] {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
            assert_eq!(tool.spec().name, tool.name());
        }
        assert_eq!(Tool::from_name("delete_everything"), None);
        assert_eq!(Tool::from_name(SUBMIT_TOOL), None);
    }

    #[test]
    fn test_question_of() {
        assert_eq!(
            question_of(&json!({"question": " Which store? "})),
            Some("Which store?".to_string())
        );
        assert_eq!(question_of(&json!({"question": ""})), None);
        assert_eq!(question_of(&json!({"q": "x"})), None);
    }

    #[test]
    fn test_submit_spec_uses_schema() {
        let spec = submit_spec(json!({"type": "object", "required": ["prompt"]}));
        assert_eq!(spec.name, "submit_result");
        assert_eq!(spec.input_schema["required"][0], "prompt");
    }
}
