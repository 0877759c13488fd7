//! Type definitions for model interactions

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved tool through which a model submits its final structured answer
pub const SUBMIT_TOOL: &str = "submit_result";

/// Claude model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Opus,
    #[default]
    Sonnet,
    Haiku,
}

impl Model {
    /// Get the API model name
    pub fn api_name(&self) -> &'static str {
        match self {
            Model::Opus => "claude-opus-4-20250514",
            Model::Sonnet => "claude-sonnet-4-5-20250929",
            Model::Haiku => "claude-3-5-haiku-20241022",
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::Opus => write!(f, "opus"),
            Model::Sonnet => write!(f, "sonnet"),
            Model::Haiku => write!(f, "haiku"),
        }
    }
}

impl std::str::FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "opus" => Ok(Model::Opus),
            "sonnet" => Ok(Model::Sonnet),
            "haiku" => Ok(Model::Haiku),
            _ => Err(format!("Invalid model: {}. Use opus, sonnet, or haiku.", s)),
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Content block, in the Anthropic Messages wire shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "is_false")]
        is_error: bool,
    },
    /// Block types the engine does not interpret (thinking, citations, ...)
    #[serde(other)]
    Unsupported,
}

/// A requested tool invocation extracted from a model reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// One message of a conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// User message carrying tool results
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: results,
        }
    }

    /// Tool calls requested in this message, in order
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Tool made available to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A single completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Caller-supplied label used for logging (not sent to the provider)
    pub tag: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
}

impl CompletionRequest {
    /// Text of the first user message
    pub fn first_user_text(&self) -> String {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(Message::text)
            .unwrap_or_default()
    }

    /// Results already returned for the tool named `name`
    pub fn results_for(&self, name: &str) -> Vec<&str> {
        let ids: Vec<&str> = self
            .messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name: n, .. } if n == name => Some(id.as_str()),
                _ => None,
            })
            .collect();

        self.messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|block| match block {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } if ids.contains(&tool_use_id.as_str()) => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// What a model returned for one completion call
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

impl ModelReply {
    pub fn new(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            stop_reason: None,
            usage: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![ContentBlock::Text { text: text.into() }])
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::new(vec![ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }])
    }

    /// Final structured answer through the reserved submit tool
    pub fn submit(id: impl Into<String>, answer: Value) -> Self {
        Self::tool_call(id, SUBMIT_TOOL, answer)
    }

    /// The reply as an assistant history message, dropping uninterpreted blocks
    pub fn into_message(self) -> Message {
        Message::assistant(
            self.content
                .into_iter()
                .filter(|block| !matches!(block, ContentBlock::Unsupported))
                .collect(),
        )
    }
}

fn is_blank(system: &&str) -> bool {
    system.is_empty()
}

fn no_tools(tools: &&[ToolSpec]) -> bool {
    tools.is_empty()
}

/// Anthropic API request format
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest<'a> {
    pub model: String,
    pub max_tokens: usize,
    #[serde(skip_serializing_if = "is_blank")]
    pub system: &'a str,
    pub messages: &'a [Message],
    #[serde(skip_serializing_if = "no_tools")]
    pub tools: &'a [ToolSpec],
}

/// Anthropic API response format
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicResponse {
    #[allow(dead_code)]
    pub id: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_from_str() {
        assert_eq!("opus".parse::<Model>().unwrap(), Model::Opus);
        assert_eq!("SONNET".parse::<Model>().unwrap(), Model::Sonnet);
        assert!("invalid".parse::<Model>().is_err());
        assert_eq!(Model::default(), Model::Sonnet);
    }

    #[test]
    fn test_content_block_wire_shape() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "call_1".to_string(),
            content: "[]".to_string(),
            is_error: false,
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert!(value.get("is_error").is_none());
    }

    #[test]
    fn test_response_with_tool_use_and_unknown_block() {
        let response: AnthropicResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "tool_use", "id": "toolu_1", "name": "fetch_triggers", "input": {}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 3}
        }))
        .unwrap();

        let reply = ModelReply::new(response.content);
        let message = reply.into_message();
        assert_eq!(message.content.len(), 1);
        assert_eq!(message.tool_calls()[0].name, "fetch_triggers");
    }

    #[test]
    fn test_results_for() {
        let request = CompletionRequest {
            tag: "matcher".to_string(),
            system: String::new(),
            messages: vec![
                Message::user_text("workflow"),
                Message::assistant(vec![ContentBlock::ToolUse {
                    id: "a".to_string(),
                    name: "ask_human".to_string(),
                    input: json!({"question": "Which store?"}),
                }]),
                Message::tool_results(vec![ContentBlock::ToolResult {
                    tool_use_id: "a".to_string(),
                    content: "The EU store".to_string(),
                    is_error: false,
                }]),
            ],
            tools: vec![],
        };
        assert_eq!(request.results_for("ask_human"), vec!["The EU store"]);
        assert!(request.results_for("fetch_triggers").is_empty());
        assert_eq!(request.first_user_text(), "workflow");
    }
}
