//! Tool traits and approval gating.
//!
//! Tools come in two layers, following the typed-trait-plus-object-safe
//! pattern: implement [`Tool`] with concrete `Args`/`Output` types, and the
//! blanket [`DynTool`] impl makes it dispatchable by name from an agent's
//! tool set.
//!
//! A tool invocation normally returns [`ToolOutcome::Success`]. Tools that
//! wrap a nested agent run (see `Agent::as_tool`) may instead return
//! [`ToolOutcome::Interrupted`], carrying the nested run's serialized state
//! and its pending approvals so the suspension propagates to the caller.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ToolError;
use crate::items::{ToolApprovalItem, ToolOutput};

/// A type alias for `Result<T, ToolError>`.
pub type ToolResult<T> = Result<T, ToolError>;

/// Definition of a tool surface for the model request.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    /// Name of the tool (snake_case).
    pub name: String,

    /// Description of what the tool does.
    pub description: String,

    /// JSON schema for the tool's parameters.
    pub parameters: Value,

    /// Whether to request strict schema validation from the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl ToolDefinition {
    /// Create a new tool definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            strict: None,
        }
    }

    /// Create a definition whose parameter schema is generated from a Rust
    /// argument type via `schemars`.
    #[must_use]
    pub fn typed<A: schemars::JsonSchema>(
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(name, description, schema_for::<A>())
    }

    /// Returns the tool name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Generate the JSON schema for a Rust type, without the `$schema` meta field.
#[must_use]
pub fn schema_for<A: schemars::JsonSchema>() -> Value {
    let root = schemars::schema_for!(A);
    let mut value = serde_json::to_value(&root).unwrap_or_default();
    if let Value::Object(ref mut map) = value {
        map.remove("$schema");
    }
    value
}

/// Per-call context handed to tool handlers and approval predicates.
#[derive(Debug, Clone)]
pub struct ToolContext {
    run_id: String,
    agent: String,
    turn: usize,
}

impl ToolContext {
    /// Create a context for one run step.
    #[must_use]
    pub fn new(run_id: impl Into<String>, agent: impl Into<String>, turn: usize) -> Self {
        Self {
            run_id: run_id.into(),
            agent: agent.into(),
            turn,
        }
    }

    /// The run identifier.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The agent currently in control.
    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// The current turn number (1-based).
    #[must_use]
    pub const fn turn(&self) -> usize {
        self.turn
    }
}

/// Result of invoking a tool.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// The tool completed and produced a value.
    Success(Value),
    /// A nested agent run inside the tool suspended for approvals.
    Interrupted {
        /// The nested run's serialized state, to be resumed later.
        state: Value,
        /// The nested run's pending approval requests.
        approvals: Vec<ToolApprovalItem>,
    },
}

/// The core trait for typed tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static name of the tool.
    const NAME: &'static str;

    /// Arguments type for the tool.
    type Args: DeserializeOwned + Send;

    /// Output type of the tool.
    type Output: Serialize + Send;

    /// Error type for tool execution.
    type Error: Into<ToolError> + Send;

    /// Get the name of the tool.
    fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Get the description of the tool.
    fn description(&self) -> String;

    /// Get the JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn call(&self, ctx: &ToolContext, args: Self::Args)
    -> Result<Self::Output, Self::Error>;

    /// Get the tool definition for the model request.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }

    /// Call the tool with a raw JSON argument payload.
    ///
    /// Accepts both object payloads and JSON-encoded strings, the two forms
    /// providers deliver arguments in.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] when the payload cannot be
    /// coerced to [`Self::Args`], or the handler's own error.
    async fn call_json(&self, ctx: &ToolContext, args: Value) -> ToolResult<Value>
    where
        Self::Output: 'static,
    {
        let typed_args: Self::Args = match &args {
            Value::String(s) => {
                serde_json::from_str(s).map_err(|e| ToolError::InvalidArguments(e.to_string()))?
            }
            _ => serde_json::from_value(args)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?,
        };

        let result = self.call(ctx, typed_args).await.map_err(Into::into)?;
        serde_json::to_value(result).map_err(|e| ToolError::Execution(e.to_string()))
    }
}

/// Object-safe tool interface for dynamic dispatch.
#[async_trait]
pub trait DynTool: Send + Sync {
    /// Get the name of the tool.
    fn name(&self) -> &str;

    /// Get the description of the tool.
    fn description(&self) -> String;

    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Invoke the tool with a raw JSON argument payload.
    async fn invoke(&self, ctx: &ToolContext, args: Value) -> ToolResult<ToolOutcome>;

    /// Resume a previously interrupted nested run with approval decisions.
    ///
    /// Only tools that wrap a nested agent run support this; the default
    /// reports the tool as not resumable.
    async fn resume(
        &self,
        ctx: &ToolContext,
        state: Value,
        decisions: &HashMap<String, bool>,
    ) -> ToolResult<ToolOutcome> {
        let _ = (ctx, state, decisions);
        Err(ToolError::NotResumable(self.name().to_owned()))
    }
}

#[async_trait]
impl<T: Tool + 'static> DynTool for T
where
    T::Output: 'static,
{
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn description(&self) -> String {
        Tool::description(self)
    }

    fn definition(&self) -> ToolDefinition {
        Tool::definition(self)
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> ToolResult<ToolOutcome> {
        Tool::call_json(self, ctx, args).await.map(ToolOutcome::Success)
    }
}

/// A shared, reference-counted tool.
pub type SharedTool = Arc<dyn DynTool>;

/// Approval predicate: `(context, arguments, call id)` → whether this call
/// requires an approval decision.
pub type SharedApprovalPredicate = Arc<dyn Fn(&ToolContext, &Value, &str) -> bool + Send + Sync>;

/// Approval gate applied to a tool before execution.
#[derive(Clone, Default)]
pub enum ToolApprovalPolicy {
    /// The tool executes without approval.
    #[default]
    Auto,
    /// Every call requires an approval decision.
    RequireApproval,
    /// A predicate decides per call whether approval is required.
    Predicate(SharedApprovalPredicate),
}

impl ToolApprovalPolicy {
    /// Whether the given call requires an approval decision.
    #[must_use]
    pub fn needs_approval(&self, ctx: &ToolContext, arguments: &Value, call_id: &str) -> bool {
        match self {
            Self::Auto => false,
            Self::RequireApproval => true,
            Self::Predicate(predicate) => predicate(ctx, arguments, call_id),
        }
    }
}

impl fmt::Debug for ToolApprovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("Auto"),
            Self::RequireApproval => f.write_str("RequireApproval"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Synchronous approval callback for a hosted tool.
pub type SharedHostedApproval = Arc<dyn Fn(&ToolApprovalItem) -> bool + Send + Sync>;

/// A provider-side tool the engine does not execute itself.
///
/// The optional `on_approval` callback is a capability flag: when present,
/// approval requests for this tool resolve synchronously within the turn;
/// when absent, they defer to an external decision and suspend the run.
#[derive(Clone, Default)]
pub struct HostedTool {
    name: String,
    description: String,
    on_approval: Option<SharedHostedApproval>,
}

impl HostedTool {
    /// Register a hosted tool by name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            on_approval: None,
        }
    }

    /// Set the description advertised to the model.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach a synchronous approval callback.
    #[must_use]
    pub fn on_approval(mut self, callback: SharedHostedApproval) -> Self {
        self.on_approval = Some(callback);
        self
    }

    /// The hosted tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether approval requests resolve synchronously within the turn.
    #[must_use]
    pub const fn resolves_synchronously(&self) -> bool {
        self.on_approval.is_some()
    }

    /// Invoke the synchronous approval callback, if one is attached.
    #[must_use]
    pub fn approve(&self, request: &ToolApprovalItem) -> Option<bool> {
        self.on_approval.as_ref().map(|callback| callback(request))
    }

    /// The tool surface advertised to the model.
    #[must_use]
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            &self.name,
            &self.description,
            serde_json::json!({"type": "object", "properties": {}}),
        )
    }
}

impl fmt::Debug for HostedTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedTool")
            .field("name", &self.name)
            .field("synchronous", &self.resolves_synchronously())
            .finish()
    }
}

/// The resolved result of one function tool call within a turn.
///
/// Consumed by tool-use completion policies; never persisted.
#[derive(Debug, Clone)]
pub struct FunctionCallResult {
    /// The call identifier.
    pub call_id: String,
    /// The tool name.
    pub name: String,
    /// The recorded output.
    pub output: ToolOutput,
}
