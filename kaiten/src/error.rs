//! Unified error types for the kaiten engine.
//!
//! The taxonomy separates the ways a run can go wrong:
//! - [`ModelBehaviorError`]: the model referenced something that does not
//!   exist or produced an unparseable payload. Fatal, never retried.
//! - [`ToolError`]: a tool handler failed. Fatal for the turn when raised
//!   during execution, except argument-validation failures which are
//!   recorded as failed tool output.
//! - Configuration and turn-limit errors raised by the orchestrator.
//!
//! Approval rejections and interruptions are *not* errors; they surface as
//! ordinary history items and the `Interruption` verdict respectively.

use serde_json::Value;

/// Result type alias for kaiten operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the kaiten engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The model produced output the engine cannot honor.
    #[error("Model behavior error: {0}")]
    ModelBehavior(#[from] ModelBehaviorError),

    /// Tool execution error without call context.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Tool execution error wrapped with the originating call for diagnostics.
    #[error("Tool '{tool}' failed with arguments {arguments}: {source}")]
    ToolCall {
        /// Name of the tool whose handler failed.
        tool: String,
        /// The argument payload the model supplied.
        arguments: Value,
        /// The underlying failure.
        #[source]
        source: ToolError,
    },

    /// Invalid engine or agent configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Maximum turns reached without a terminal verdict.
    #[error("Maximum turns ({max_turns}) reached without a final output")]
    MaxTurns {
        /// The configured turn limit.
        max_turns: usize,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error with a message.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a max turns error.
    #[must_use]
    pub const fn max_turns(max_turns: usize) -> Self {
        Self::MaxTurns { max_turns }
    }

    /// Wrap a tool failure with the originating call for diagnostics.
    #[must_use]
    pub fn tool_call(tool: impl Into<String>, arguments: Value, source: ToolError) -> Self {
        Self::ToolCall {
            tool: tool.into(),
            arguments,
            source,
        }
    }
}

/// Errors caused by the model referencing things that do not exist or
/// producing payloads the engine cannot parse.
///
/// These abort the run and are surfaced to the caller; the engine never
/// retries them.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ModelBehaviorError {
    /// The model called a tool name that is not registered on the agent.
    #[error("Model called unknown tool '{0}'")]
    UnknownTool(String),

    /// The model referenced a hosted tool that is not registered.
    #[error("Model requested approval for unknown hosted tool '{0}'")]
    UnknownHostedTool(String),

    /// The model issued a computer action but no computer is configured.
    #[error("Model issued a computer call but agent '{0}' has no computer configured")]
    MissingComputer(String),

    /// The final text did not satisfy the agent's declared output shape.
    #[error("Final output does not satisfy output schema '{schema}': {message}")]
    InvalidStructuredOutput {
        /// Name of the violated output schema.
        schema: String,
        /// Parse failure detail.
        message: String,
    },
}

/// Error type for tool execution failures.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ToolError {
    /// Error raised by the tool handler.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The call's argument payload could not be coerced to the declared shape.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Tool not found.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// The tool does not support resuming a suspended nested run.
    #[error("Tool '{0}' cannot be resumed")]
    NotResumable(String),

    /// Generic error.
    #[error("Tool error: {0}")]
    Other(String),
}

impl ToolError {
    /// Create an execution error.
    #[must_use]
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create an invalid arguments error.
    #[must_use]
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }
}

impl From<String> for ToolError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for ToolError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}
