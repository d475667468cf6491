//! Run history items.
//!
//! A [`RunItem`] is an immutable, ordered, append-only record of one thing
//! that happened during a run: a message the model produced, a tool call and
//! its output, a handoff, a reasoning block, or a pending approval request.
//! Items are appended in the order work completes, never mutated afterwards;
//! corrections are new items.
//!
//! Every item carries the producing agent identity and exposes a stable
//! [`identity`](RunItem::identity) string derived from the provider-assigned
//! call identifier (with a content-hash fallback). Identities are what the
//! streaming and persistence layers deduplicate on, and what approval
//! decisions are correlated by across a suspend/resume cycle.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// The originating element kind of a tool call item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallKind {
    /// A function tool call.
    Function,
    /// A hosted (provider-side) tool call.
    Hosted,
    /// A computer-control action.
    Computer,
}

impl ToolCallKind {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Hosted => "hosted",
            Self::Computer => "computer",
        }
    }
}

impl fmt::Display for ToolCallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of call a pending approval gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    /// Approval for a function tool call.
    Function,
    /// Approval for a hosted tool call.
    Hosted,
    /// Approval for a computer action.
    Computer,
}

impl ApprovalKind {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function_approval",
            Self::Hosted => "hosted_approval",
            Self::Computer => "computer_approval",
        }
    }
}

impl fmt::Display for ApprovalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a completed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Plain text output.
    Text {
        /// The text content.
        text: String,
    },
    /// Structured JSON output.
    Json {
        /// The JSON value.
        value: Value,
    },
    /// Image output (base64-encoded), used for computer screenshots.
    Image {
        /// Base64-encoded image data; empty when the capture failed.
        data: String,
    },
}

impl ToolOutput {
    /// Build an output payload from a tool's JSON return value.
    ///
    /// String values become [`ToolOutput::Text`]; everything else is kept as
    /// structured JSON.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text { text },
            other => Self::Json { value: other },
        }
    }

    /// Build an image output from raw bytes, base64-encoding them.
    #[must_use]
    pub fn image_from_bytes(bytes: &[u8]) -> Self {
        use base64::Engine as _;
        Self::Image {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Render the output as text, the form tool-use completion policies and
    /// the model-facing history use.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Json { value } => value.to_string(),
            Self::Image { data } => data.clone(),
        }
    }
}

/// An assistant message produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageOutputItem {
    /// The agent whose turn produced the message.
    pub agent: String,
    /// The message text.
    pub content: String,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallItem {
    /// The agent whose turn produced the call.
    pub agent: String,
    /// The originating element kind.
    pub kind: ToolCallKind,
    /// Provider-assigned call identifier, when one exists.
    pub call_id: Option<String>,
    /// The tool name.
    pub name: String,
    /// The raw argument payload.
    pub arguments: Value,
}

/// The recorded output of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutputItem {
    /// The agent whose turn produced the output.
    pub agent: String,
    /// The call this output answers.
    pub call_id: String,
    /// The tool name.
    pub name: String,
    /// The output payload.
    pub output: ToolOutput,
}

/// A handoff requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffCallItem {
    /// The agent requesting the handoff.
    pub agent: String,
    /// Provider-assigned call identifier.
    pub call_id: String,
    /// The handoff tool name.
    pub name: String,
    /// The raw argument payload.
    pub arguments: Value,
}

/// The recorded outcome of a handoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffOutputItem {
    /// The agent that requested the handoff.
    pub agent: String,
    /// The call this outcome answers.
    pub call_id: String,
    /// The agent control transferred from.
    pub from_agent: String,
    /// The agent control transferred to.
    pub to_agent: String,
}

/// A reasoning block emitted by the model. Informational, never actionable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningItem {
    /// The agent whose turn produced the reasoning.
    pub agent: String,
    /// The reasoning text.
    pub content: String,
}

/// A pending approval request gating a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolApprovalItem {
    /// The agent whose turn raised the request.
    pub agent: String,
    /// The kind of call being gated.
    pub kind: ApprovalKind,
    /// Provider-assigned call identifier, when one exists.
    pub call_id: Option<String>,
    /// The tool name.
    pub name: String,
    /// The raw argument payload of the gated call.
    pub arguments: Value,
    /// When the request came from a nested agent-as-tool run, the parent
    /// function call that owns the nested run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_call_id: Option<String>,
}

impl ToolApprovalItem {
    /// The identity a decision on this request is recorded under.
    ///
    /// Stable across serialize/deserialize: derived from the call kind and
    /// the provider-assigned call id, falling back to a content hash of the
    /// tool name and arguments when no identifier exists.
    #[must_use]
    pub fn approval_identity(&self) -> String {
        match &self.call_id {
            Some(id) => format!("{}:{id}", self.kind),
            None => format!("{}:{}", self.kind, content_digest(&self.name, &self.arguments)),
        }
    }
}

/// An immutable record of one thing that happened in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunItem {
    /// An assistant message.
    MessageOutput(MessageOutputItem),
    /// A tool call requested by the model.
    ToolCall(ToolCallItem),
    /// The output of a completed tool call.
    ToolCallOutput(ToolCallOutputItem),
    /// A handoff requested by the model.
    HandoffCall(HandoffCallItem),
    /// The outcome of a handoff.
    HandoffOutput(HandoffOutputItem),
    /// A reasoning block.
    Reasoning(ReasoningItem),
    /// A pending approval request.
    ToolApprovalRequest(ToolApprovalItem),
}

impl RunItem {
    /// Construct an assistant message item.
    #[must_use]
    pub fn message(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self::MessageOutput(MessageOutputItem {
            agent: agent.into(),
            content: content.into(),
        })
    }

    /// Construct a function tool call item.
    #[must_use]
    pub fn function_call(
        agent: impl Into<String>,
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self::ToolCall(ToolCallItem {
            agent: agent.into(),
            kind: ToolCallKind::Function,
            call_id: Some(call_id.into()),
            name: name.into(),
            arguments,
        })
    }

    /// Construct a tool output item.
    #[must_use]
    pub fn tool_output(
        agent: impl Into<String>,
        call_id: impl Into<String>,
        name: impl Into<String>,
        output: ToolOutput,
    ) -> Self {
        Self::ToolCallOutput(ToolCallOutputItem {
            agent: agent.into(),
            call_id: call_id.into(),
            name: name.into(),
            output,
        })
    }

    /// Construct a reasoning item.
    #[must_use]
    pub fn reasoning(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Reasoning(ReasoningItem {
            agent: agent.into(),
            content: content.into(),
        })
    }

    /// The agent identity that produced this item.
    #[must_use]
    pub fn agent(&self) -> &str {
        match self {
            Self::MessageOutput(item) => &item.agent,
            Self::ToolCall(item) => &item.agent,
            Self::ToolCallOutput(item) => &item.agent,
            Self::HandoffCall(item) => &item.agent,
            Self::HandoffOutput(item) => &item.agent,
            Self::Reasoning(item) => &item.agent,
            Self::ToolApprovalRequest(item) => &item.agent,
        }
    }

    /// A stable identity string for deduplication across suspend/resume.
    ///
    /// Items with a provider-assigned call id derive their identity from it;
    /// items without one fall back to a content hash. Two items of different
    /// variants never share an identity.
    #[must_use]
    pub fn identity(&self) -> String {
        match self {
            Self::MessageOutput(item) => {
                format!(
                    "message:{}",
                    content_digest(&item.agent, &Value::String(item.content.clone()))
                )
            }
            Self::ToolCall(item) => match &item.call_id {
                Some(id) => format!("tool_call:{id}"),
                None => format!("tool_call:{}", content_digest(&item.name, &item.arguments)),
            },
            Self::ToolCallOutput(item) => format!("tool_call_output:{}", item.call_id),
            Self::HandoffCall(item) => format!("handoff_call:{}", item.call_id),
            Self::HandoffOutput(item) => format!("handoff_output:{}", item.call_id),
            Self::Reasoning(item) => {
                format!(
                    "reasoning:{}",
                    content_digest(&item.agent, &Value::String(item.content.clone()))
                )
            }
            Self::ToolApprovalRequest(item) => item.approval_identity(),
        }
    }
}

/// Hex SHA-256 digest of a name plus a canonically serialized JSON payload.
///
/// `serde_json` sorts object keys, so the digest is stable across a
/// serialize/deserialize round trip.
fn content_digest(name: &str, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b"\x00");
    hasher.update(payload.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
