//! Agent configuration.
//!
//! An [`Agent`] is a self-contained unit of behavior: identity, instructions,
//! its own model provider, the tools and handoff targets it may use, the
//! approval policies gating those tools, and the shape its final output must
//! take. Agents are configured with builder methods and shared as
//! `Arc<Agent>` so handoff graphs and nested runs can reference them.
//!
//! Each agent owns its provider, so a handoff can move a conversation onto a
//! different model mid-run.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::computer::SharedComputer;
use crate::error::{ModelBehaviorError, Result, ToolError};
use crate::handoff::Handoff;
use crate::model::{ModelSettings, SharedModelProvider};
use crate::run::{RunConfig, Runner, RunState};
use crate::tool::{
    DynTool, FunctionCallResult, HostedTool, SharedTool, ToolApprovalPolicy, ToolContext,
    ToolDefinition, ToolOutcome, ToolResult,
};

/// Schema specification for structured agent output.
///
/// When set on an [`Agent`], every model request carries the schema and the
/// final text is parsed as JSON before being accepted as the run's output;
/// a parse failure is a fatal model-behavior error, never retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    name: String,
    schema: Value,
    strict: bool,
}

impl OutputSchema {
    /// Creates a new output schema with strict mode enabled.
    #[must_use]
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            strict: true,
        }
    }

    /// Creates an output schema by generating JSON Schema from a Rust type.
    #[must_use]
    pub fn from_type<T: schemars::JsonSchema>() -> Self {
        let name = <T as schemars::JsonSchema>::schema_name();
        Self {
            name: name.into_owned(),
            schema: crate::tool::schema_for::<T>(),
            strict: true,
        }
    }

    /// Returns the schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the JSON Schema definition.
    #[must_use]
    pub const fn schema(&self) -> &Value {
        &self.schema
    }

    /// Returns whether strict mode is enabled.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Parse final text against this schema's expected shape.
    ///
    /// # Errors
    ///
    /// Returns [`ModelBehaviorError::InvalidStructuredOutput`] when the text
    /// is not valid JSON.
    pub fn parse(&self, text: &str) -> Result<Value> {
        serde_json::from_str(text).map_err(|e| {
            ModelBehaviorError::InvalidStructuredOutput {
                schema: self.name.clone(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

/// Decides what a turn's tool results mean for run completion.
///
/// The resolver form receives the per-call results of the turn and returns
/// `Some(final_output)` to finish the run or `None` to run the model again;
/// its verdict is authoritative.
pub type SharedToolUseResolver = Arc<
    dyn Fn(ToolContext, Vec<FunctionCallResult>) -> BoxFuture<'static, Result<Option<Value>>>
        + Send
        + Sync,
>;

/// Completion policy applied after a turn that executed function tools.
#[derive(Clone, Default)]
pub enum ToolUseBehavior {
    /// Feed tool results back to the model and run again.
    #[default]
    RunLlmAgain,
    /// The first tool output of the turn becomes the final output.
    StopOnFirstTool,
    /// Like `StopOnFirstTool`, but only for the listed tool names.
    StopAtTools(Vec<String>),
    /// Delegate the decision entirely to a custom resolver.
    Custom(SharedToolUseResolver),
}

impl fmt::Debug for ToolUseBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunLlmAgain => f.write_str("RunLlmAgain"),
            Self::StopOnFirstTool => f.write_str("StopOnFirstTool"),
            Self::StopAtTools(names) => f.debug_tuple("StopAtTools").field(names).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A configured agent.
pub struct Agent {
    name: String,
    instructions: String,
    model: String,
    provider: Option<SharedModelProvider>,
    tools: Vec<SharedTool>,
    hosted_tools: Vec<HostedTool>,
    computer: Option<SharedComputer>,
    handoffs: Vec<Handoff>,
    approval_policies: HashMap<String, ToolApprovalPolicy>,
    output_schema: Option<OutputSchema>,
    tool_use_behavior: ToolUseBehavior,
    reset_tool_choice: bool,
    model_settings: ModelSettings,
    max_turns: usize,
}

impl Agent {
    /// Default maximum turns per run.
    pub const DEFAULT_MAX_TURNS: usize = 10;

    /// Create an agent with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: String::new(),
            model: String::new(),
            provider: None,
            tools: Vec::new(),
            hosted_tools: Vec::new(),
            computer: None,
            handoffs: Vec::new(),
            approval_policies: HashMap::new(),
            output_schema: None,
            tool_use_behavior: ToolUseBehavior::default(),
            reset_tool_choice: true,
            model_settings: ModelSettings::default(),
            max_turns: Self::DEFAULT_MAX_TURNS,
        }
    }

    /// Set the system instructions.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Set the model identifier passed through to the provider.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the model provider this agent runs on.
    #[must_use]
    pub fn provider(mut self, provider: SharedModelProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Register a function tool.
    #[must_use]
    pub fn tool(mut self, tool: SharedTool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Register a function tool with an approval policy.
    #[must_use]
    pub fn tool_with_policy(mut self, tool: SharedTool, policy: ToolApprovalPolicy) -> Self {
        self.approval_policies.insert(tool.name().to_owned(), policy);
        self.tools.push(tool);
        self
    }

    /// Register a hosted tool.
    #[must_use]
    pub fn hosted_tool(mut self, tool: HostedTool) -> Self {
        self.hosted_tools.push(tool);
        self
    }

    /// Attach a controllable computer.
    #[must_use]
    pub fn computer(mut self, computer: SharedComputer) -> Self {
        self.computer = Some(computer);
        self
    }

    /// Register a handoff target.
    #[must_use]
    pub fn handoff(mut self, handoff: Handoff) -> Self {
        self.handoffs.push(handoff);
        self
    }

    /// Set the approval policy for a tool name.
    #[must_use]
    pub fn approval_policy(
        mut self,
        tool_name: impl Into<String>,
        policy: ToolApprovalPolicy,
    ) -> Self {
        self.approval_policies.insert(tool_name.into(), policy);
        self
    }

    /// Constrain the final output to a JSON schema.
    #[must_use]
    pub fn output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Set the tool-use completion policy.
    #[must_use]
    pub fn tool_use_behavior(mut self, behavior: ToolUseBehavior) -> Self {
        self.tool_use_behavior = behavior;
        self
    }

    /// Control whether a forced `tool_choice` resets to auto after tool use.
    #[must_use]
    pub const fn reset_tool_choice(mut self, reset: bool) -> Self {
        self.reset_tool_choice = reset;
        self
    }

    /// Set sampling and tool-use settings for every request.
    #[must_use]
    pub fn model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = settings;
        self
    }

    /// Set the maximum number of turns per run.
    #[must_use]
    pub const fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// The agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The system instructions, when non-empty.
    #[must_use]
    pub fn resolved_instructions(&self) -> Option<&str> {
        (!self.instructions.is_empty()).then_some(self.instructions.as_str())
    }

    /// The model identifier.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model
    }

    /// The configured provider, when one is set.
    #[must_use]
    pub fn model_provider(&self) -> Option<&SharedModelProvider> {
        self.provider.as_ref()
    }

    /// The configured computer, when one is set.
    #[must_use]
    pub fn computer_target(&self) -> Option<&SharedComputer> {
        self.computer.as_ref()
    }

    /// Look up a registered function tool by name.
    #[must_use]
    pub fn find_tool(&self, name: &str) -> Option<&SharedTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Look up a registered hosted tool by name.
    #[must_use]
    pub fn find_hosted_tool(&self, name: &str) -> Option<&HostedTool> {
        self.hosted_tools.iter().find(|t| t.name() == name)
    }

    /// Look up a handoff by the tool name the model calls.
    #[must_use]
    pub fn find_handoff(&self, tool_name: &str) -> Option<&Handoff> {
        self.handoffs.iter().find(|h| h.tool_name() == tool_name)
    }

    /// The registered handoffs.
    #[must_use]
    pub fn handoffs(&self) -> &[Handoff] {
        &self.handoffs
    }

    /// The approval policy for a tool name (`Auto` when none is registered).
    #[must_use]
    pub fn approval_policy_for(&self, tool_name: &str) -> ToolApprovalPolicy {
        self.approval_policies
            .get(tool_name)
            .cloned()
            .unwrap_or_default()
    }

    /// The declared output shape, when one is set.
    #[must_use]
    pub const fn declared_output_schema(&self) -> Option<&OutputSchema> {
        self.output_schema.as_ref()
    }

    /// The tool-use completion policy.
    #[must_use]
    pub const fn tool_use_policy(&self) -> &ToolUseBehavior {
        &self.tool_use_behavior
    }

    /// Whether a forced `tool_choice` resets to auto after tool use.
    #[must_use]
    pub const fn resets_tool_choice(&self) -> bool {
        self.reset_tool_choice
    }

    /// Sampling and tool-use settings.
    #[must_use]
    pub const fn settings(&self) -> &ModelSettings {
        &self.model_settings
    }

    /// The maximum number of turns per run.
    #[must_use]
    pub const fn turn_limit(&self) -> usize {
        self.max_turns
    }

    /// All tool surfaces advertised to the model: function tools, hosted
    /// tools, and the computer surface when one is attached.
    #[must_use]
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.tools.iter().map(|t| t.definition()).collect();
        definitions.extend(self.hosted_tools.iter().map(HostedTool::definition));
        if let Some(computer) = &self.computer {
            let (width, height) = computer.dimensions();
            definitions.push(ToolDefinition::new(
                computer.name(),
                "Control the attached computer with pointer, keyboard, and scroll actions.",
                serde_json::json!({
                    "type": "object",
                    "properties": {"action": {"type": "object"}},
                    "required": ["action"],
                    "display_width": width,
                    "display_height": height
                }),
            ));
        }
        definitions
    }

    /// Handoff tool surfaces advertised to the model.
    #[must_use]
    pub fn handoff_definitions(&self) -> Vec<ToolDefinition> {
        self.handoffs.iter().map(Handoff::definition).collect()
    }

    /// Wrap this agent as a function tool that runs it as a nested run.
    ///
    /// The wrapping tool takes a single `input` string. When the nested run
    /// suspends for approvals, the interruption propagates to the outer run
    /// and the nested state is kept in an owned slot on the outer
    /// [`RunState`](crate::run::RunState) until resumed.
    #[must_use]
    pub fn as_tool(
        self: &Arc<Self>,
        tool_name: impl Into<String>,
        description: impl Into<String>,
    ) -> SharedTool {
        Arc::new(AgentTool {
            agent: Arc::clone(self),
            name: tool_name.into(),
            description: description.into(),
        })
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field(
                "hosted_tools",
                &self.hosted_tools.iter().map(HostedTool::name).collect::<Vec<_>>(),
            )
            .field("computer", &self.computer.is_some())
            .field(
                "handoffs",
                &self.handoffs.iter().map(Handoff::tool_name).collect::<Vec<_>>(),
            )
            .field("output_schema", &self.output_schema.as_ref().map(OutputSchema::name))
            .field("tool_use_behavior", &self.tool_use_behavior)
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

/// Collect every agent reachable from `root` through static handoff targets.
///
/// Used on resumption to map the persisted current-agent name back to a live
/// agent. Dynamic handoff targets cannot be enumerated and are skipped.
#[must_use]
pub(crate) fn collect_agents(root: &Arc<Agent>) -> HashMap<String, Arc<Agent>> {
    let mut registry = HashMap::new();
    let mut queue = vec![Arc::clone(root)];
    while let Some(agent) = queue.pop() {
        if registry.contains_key(agent.name()) {
            continue;
        }
        registry.insert(agent.name().to_owned(), Arc::clone(&agent));
        for handoff in agent.handoffs() {
            if let Some(target) = handoff.static_target() {
                queue.push(Arc::clone(target));
            }
        }
    }
    registry
}

/// A function tool that runs another agent as a nested run.
struct AgentTool {
    agent: Arc<Agent>,
    name: String,
    description: String,
}

impl AgentTool {
    fn map_result(&self, result: crate::run::RunResult) -> ToolOutcome {
        if result.is_interrupted() {
            let state = serde_json::to_value(&result.state).unwrap_or(Value::Null);
            ToolOutcome::Interrupted {
                state,
                approvals: result.interruptions,
            }
        } else {
            ToolOutcome::Success(result.final_output.unwrap_or(Value::Null))
        }
    }
}

#[async_trait]
impl DynTool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            &self.name,
            &self.description,
            serde_json::json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "The request to forward to the agent."
                    }
                },
                "required": ["input"]
            }),
        )
    }

    async fn invoke(&self, _ctx: &ToolContext, args: Value) -> ToolResult<ToolOutcome> {
        let input = args
            .get("input")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let result = Runner::run(&self.agent, input, RunConfig::default())
            .await
            .map_err(|e| {
                ToolError::Execution(format!("nested agent '{}' failed: {e}", self.agent.name()))
            })?;
        Ok(self.map_result(result))
    }

    async fn resume(
        &self,
        _ctx: &ToolContext,
        state: Value,
        decisions: &HashMap<String, bool>,
    ) -> ToolResult<ToolOutcome> {
        let state: RunState = serde_json::from_value(state)
            .map_err(|e| ToolError::Execution(format!("invalid nested run state: {e}")))?;
        let result = Runner::resume_with_decisions(
            &self.agent,
            state,
            decisions.clone(),
            RunConfig::default(),
        )
        .await
        .map_err(|e| {
            ToolError::Execution(format!("nested agent '{}' failed: {e}", self.agent.name()))
        })?;
        Ok(self.map_result(result))
    }
}
