//! LLM provider layer: request shapes, typed responses and the client seam.
//!
//! Two call shapes exist. [`LlmClient::chat`] is a plain system + user
//! completion returning text. [`LlmClient::respond`] takes a full
//! [`ResponseRequest`] (tools, reasoning effort, token cap) built by
//! [`profile::ProfileBuilder`] and returns a typed [`Response`].

pub mod batch;
pub mod mock;
pub mod openai;
pub mod profile;
pub mod retry;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{LlmError, PipelineError};

pub use batch::{BatchApi, BatchJob, BatchOutcome, BatchRunner};
pub use mock::{CallKind, MockCall, MockLlm};
pub use openai::OpenAiClient;
pub use profile::{CapabilityProfile, ProfileBuilder};
pub use retry::{RetryPolicy, RetryingClient};

/// Named capability tiers of the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Chat model with an output-token cap.
    Chat,
    /// Chat model forced to use web search.
    Find,
    /// Reasoning model with high-context web search.
    Search,
    /// Reasoning model with explicit medium effort.
    Reasoner,
    /// Deep-research model with web search.
    Research,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Chat,
        Capability::Find,
        Capability::Search,
        Capability::Reasoner,
        Capability::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Chat => "chat",
            Capability::Find => "find",
            Capability::Search => "search",
            Capability::Reasoner => "reasoner",
            Capability::Research => "research",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| PipelineError::UnknownCapability(s.to_string()))
    }
}

// ------------------------------------------------------------
// Request shape (Responses API)
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponseRequest {
    pub model: String,
    pub input: Vec<InputMessage>,
    pub text: TextOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
}

impl ResponseRequest {
    /// Text of the first input block with the given role.
    pub fn input_text(&self, role: &str) -> Option<&str> {
        self.input
            .iter()
            .find(|m| m.role == role)
            .and_then(|m| m.content.first())
            .map(|c| c.text.as_str())
    }

    pub fn uses_web_search(&self) -> bool {
        self.tools
            .iter()
            .any(|t| matches!(t, Tool::WebSearchPreview { .. }))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InputMessage {
    pub role: String,
    pub content: Vec<InputContent>,
}

impl InputMessage {
    pub fn new(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            content: vec![InputContent {
                kind: "input_text".to_string(),
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InputContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextOptions {
    pub format: TextFormat,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            format: TextFormat {
                kind: "text".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
    WebSearchPreview {
        search_context_size: SearchContextSize,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_location: Option<UserLocation>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchContextSize {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserLocation {
    #[serde(rename = "type")]
    pub kind: String,
}

impl UserLocation {
    pub fn approximate() -> Self {
        Self {
            kind: "approximate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Required,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Reasoning {
    pub effort: ReasoningEffort,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

// ------------------------------------------------------------
// Response shape
// ------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Response {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub output: Vec<ResponseItem>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseItem {
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    WebSearchCall {
        #[serde(default)]
        status: Option<String>,
    },
    FunctionCall {
        #[serde(default)]
        name: String,
        #[serde(default)]
        arguments: String,
    },
    Reasoning {
        #[serde(default)]
        summary: Vec<serde_json::Value>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    OutputText {
        text: String,
    },
    Refusal {
        refusal: String,
    },
    #[serde(other)]
    Other,
}

impl Response {
    /// Wrap plain text as a single assistant message (mocks, batch fixtures).
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            output: vec![ResponseItem::Message {
                content: vec![ContentPart::OutputText { text: text.into() }],
            }],
        }
    }

    /// Concatenated output text of the first assistant message.
    pub fn first_message_text(&self) -> Result<String, LlmError> {
        let content = self
            .output
            .iter()
            .find_map(|item| match item {
                ResponseItem::Message { content } => Some(content),
                _ => None,
            })
            .ok_or(LlmError::NoMessage)?;

        let text: String = content
            .iter()
            .filter_map(|part| match part {
                ContentPart::OutputText { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        if text.is_empty() {
            return Err(LlmError::NoMessage);
        }
        Ok(text)
    }
}

// ------------------------------------------------------------
// Client seam
// ------------------------------------------------------------

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// System + user prompt against the chat model; returns the first completion.
    async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError>;

    /// Full response call.
    async fn respond(&self, request: &ResponseRequest) -> Result<Response, LlmError>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capability_names_parse_case_insensitively() {
        assert_eq!("find".parse::<Capability>().unwrap(), Capability::Find);
        assert_eq!(" Reasoner ".parse::<Capability>().unwrap(), Capability::Reasoner);
        assert!(matches!(
            "turbo".parse::<Capability>(),
            Err(PipelineError::UnknownCapability(name)) if name == "turbo"
        ));
    }

    #[test]
    fn first_message_skips_tool_items() {
        let raw = json!({
            "id": "resp_1",
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "web_search_call", "id": "ws_1", "status": "completed"},
                {"type": "message", "role": "assistant", "content": [
                    {"type": "output_text", "text": "Hello ", "annotations": []},
                    {"type": "output_text", "text": "world"}
                ]},
                {"type": "message", "content": [{"type": "output_text", "text": "second"}]}
            ]
        });
        let resp: Response = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.first_message_text().unwrap(), "Hello world");
    }

    #[test]
    fn unknown_item_types_are_tolerated() {
        let raw = json!({"output": [{"type": "image_generation_call", "result": "..."}]});
        let resp: Response = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.output, vec![ResponseItem::Other]);
        assert!(matches!(resp.first_message_text(), Err(LlmError::NoMessage)));
    }

    #[test]
    fn refusal_only_message_is_no_message() {
        let raw = json!({"output": [{"type": "message", "content": [
            {"type": "refusal", "refusal": "no"}
        ]}]});
        let resp: Response = serde_json::from_value(raw).unwrap();
        assert!(matches!(resp.first_message_text(), Err(LlmError::NoMessage)));
    }
}
