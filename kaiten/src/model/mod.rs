//! Model transport boundary.
//!
//! This module defines the contract between the engine and the underlying
//! language model: a [`ModelRequest`] carrying the serialized history, tool
//! and handoff schemas, and sampling settings, and a [`ModelResponse`] whose
//! ordered [`OutputElement`]s the work classifier partitions into actionable
//! groups.
//!
//! The transport itself is a black box behind [`ModelProvider`]. The engine
//! never retries transport calls; retry policy, timeouts, and streaming
//! reassembly belong to the provider implementation.

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::agent::OutputSchema;
use crate::computer::ComputerAction;
use crate::error::Result;
use crate::items::RunItem;
use crate::tool::ToolDefinition;
use crate::usage::Usage;

/// Controls how the model uses tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides whether to call tools.
    Auto,
    /// The model must call at least one tool.
    Required,
    /// The model must not call tools.
    None,
    /// The model must call the named tool.
    Tool(String),
}

/// Sampling and tool-use settings attached to every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tool-use constraint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Whether the model may issue several tool calls in one response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

/// Completion status of a hosted tool call element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostedCallStatus {
    /// The provider completed the call server-side.
    Completed,
    /// The provider requires an approval decision before proceeding.
    NeedsApproval,
}

/// One element of a model response, in response order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputElement {
    /// Assistant message text.
    Message {
        /// The message text.
        content: String,
    },
    /// A function tool call.
    FunctionCall {
        /// Provider-assigned call identifier.
        call_id: String,
        /// The tool name.
        name: String,
        /// The raw argument payload.
        arguments: Value,
    },
    /// A hosted (provider-side) tool call.
    HostedToolCall {
        /// Provider-assigned call identifier, when one exists.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        /// The hosted tool name.
        name: String,
        /// Completion status of the call.
        status: HostedCallStatus,
        /// The raw provider payload.
        #[serde(default)]
        payload: Value,
    },
    /// A computer-control action.
    ComputerCall {
        /// Provider-assigned call identifier.
        call_id: String,
        /// The requested action.
        action: ComputerAction,
    },
    /// A reasoning block.
    Reasoning {
        /// The reasoning text.
        content: String,
    },
}

/// A complete model response for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Provider-assigned response identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Ordered output elements.
    #[serde(default)]
    pub output: Vec<OutputElement>,

    /// Token usage for this response.
    #[serde(default)]
    pub usage: Usage,
}

impl ModelResponse {
    /// Create a response from its output elements.
    #[must_use]
    pub fn new(output: Vec<OutputElement>) -> Self {
        Self {
            id: None,
            output,
            usage: Usage::zero(),
        }
    }

    /// Create a plain assistant text response.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(vec![OutputElement::Message {
            content: content.into(),
        }])
    }

    /// Set the provider response id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the usage for this response.
    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// The last assistant message in the response, if any.
    #[must_use]
    pub fn message_text(&self) -> Option<&str> {
        self.output.iter().rev().find_map(|element| match element {
            OutputElement::Message { content } => Some(content.as_str()),
            _ => None,
        })
    }
}

/// A request for one model response.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    /// The model identifier passed through to the provider.
    pub model: String,

    /// Resolved system instructions for the current agent.
    pub system_instructions: Option<String>,

    /// The user input that started the run.
    pub original_input: String,

    /// The full ordered run history accumulated so far.
    pub items: Vec<RunItem>,

    /// Function tool schemas (including hosted and computer surfaces).
    pub tools: Vec<ToolDefinition>,

    /// Handoff tool schemas.
    pub handoffs: Vec<ToolDefinition>,

    /// Declared output shape, when the agent expects structured output.
    pub output_schema: Option<OutputSchema>,

    /// Sampling and tool-use settings.
    pub settings: ModelSettings,
}

/// The language-model transport consumed by the engine.
///
/// Implementations own connection management, retries, and streaming
/// reassembly; the engine calls [`get_response`](Self::get_response) once per
/// turn and treats any error as fatal for the run.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Request one complete response for the given request.
    async fn get_response(&self, request: &ModelRequest) -> Result<ModelResponse>;

    /// Provider name for diagnostics.
    fn name(&self) -> &str {
        "model"
    }
}

/// A shared, reference-counted model provider.
pub type SharedModelProvider = Arc<dyn ModelProvider>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_text_returns_last_message() {
        let response = ModelResponse::new(vec![
            OutputElement::Message {
                content: "first".into(),
            },
            OutputElement::FunctionCall {
                call_id: "c1".into(),
                name: "lookup".into(),
                arguments: json!({}),
            },
            OutputElement::Message {
                content: "second".into(),
            },
        ]);
        assert_eq!(response.message_text(), Some("second"));
    }

    #[test]
    fn message_text_none_without_messages() {
        let response = ModelResponse::new(vec![OutputElement::Reasoning {
            content: "thinking".into(),
        }]);
        assert_eq!(response.message_text(), None);
    }

    #[test]
    fn output_element_serde_round_trip() {
        let element = OutputElement::HostedToolCall {
            call_id: Some("h1".into()),
            name: "web_search".into(),
            status: HostedCallStatus::NeedsApproval,
            payload: json!({"q": "rust"}),
        };
        let encoded = serde_json::to_string(&element).unwrap();
        let decoded: OutputElement = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, element);
    }

    #[test]
    fn response_builder_sets_fields() {
        let response = ModelResponse::text("hi")
            .with_id("resp_1")
            .with_usage(Usage::new(10, 5));
        assert_eq!(response.id.as_deref(), Some("resp_1"));
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[test]
    fn tool_choice_serde() {
        let choice = ToolChoice::Tool("lookup".into());
        let encoded = serde_json::to_string(&choice).unwrap();
        let decoded: ToolChoice = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, choice);
    }
}
