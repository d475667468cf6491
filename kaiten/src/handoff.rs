//! Handoffs: directed transfer of conversational control between agents.
//!
//! A [`Handoff`] is advertised to the model as an ordinary function tool;
//! when the model calls it, the engine transfers control to the target
//! agent instead of executing a handler. Targets are usually static, but can
//! be resolved dynamically from the call arguments. An optional input filter
//! lets the handing-off side rewrite or trim the accumulated history before
//! the new agent sees it.

use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::agent::Agent;
use crate::error::Result;
use crate::items::RunItem;
use crate::tool::ToolDefinition;

/// Resolves a handoff target from the raw call arguments.
pub type SharedHandoffResolver =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Arc<Agent>>> + Send + Sync>;

/// Rewrites the history a handoff target receives.
pub type SharedHandoffInputFilter = Arc<dyn Fn(HandoffInputData) -> HandoffInputData + Send + Sync>;

/// The history a handoff input filter may rewrite.
#[derive(Debug, Clone)]
pub struct HandoffInputData {
    /// History accumulated before the current turn.
    pub history: Vec<RunItem>,
    /// Items produced during the current turn, up to the handoff.
    pub new_items: Vec<RunItem>,
}

#[derive(Clone)]
enum HandoffTarget {
    Static(Arc<Agent>),
    Dynamic {
        name: String,
        resolver: SharedHandoffResolver,
    },
}

/// A directed transfer of control to another agent.
#[derive(Clone)]
pub struct Handoff {
    tool_name: String,
    tool_description: String,
    parameters: Value,
    target: HandoffTarget,
    input_filter: Option<SharedHandoffInputFilter>,
}

impl Handoff {
    /// Create a handoff to a statically known agent.
    ///
    /// The tool surface defaults to `transfer_to_<agent>` with an empty
    /// argument object.
    #[must_use]
    pub fn to_agent(agent: Arc<Agent>) -> Self {
        let tool_name = format!("transfer_to_{}", agent.name());
        let tool_description = format!(
            "Handoff to the {} agent to handle the request.",
            agent.name()
        );
        Self {
            tool_name,
            tool_description,
            parameters: empty_object_schema(),
            target: HandoffTarget::Static(agent),
            input_filter: None,
        }
    }

    /// Create a handoff whose target is computed from the call arguments.
    #[must_use]
    pub fn dynamic(
        tool_name: impl Into<String>,
        target_name: impl Into<String>,
        resolver: SharedHandoffResolver,
    ) -> Self {
        let tool_name = tool_name.into();
        let target_name = target_name.into();
        Self {
            tool_description: format!("Handoff to the {target_name} agent to handle the request."),
            tool_name,
            parameters: empty_object_schema(),
            target: HandoffTarget::Dynamic {
                name: target_name,
                resolver,
            },
            input_filter: None,
        }
    }

    /// Override the tool name advertised to the model.
    #[must_use]
    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = name.into();
        self
    }

    /// Override the tool description advertised to the model.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.tool_description = description.into();
        self
    }

    /// Override the argument schema advertised to the model.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Attach an input filter that rewrites the history the target sees.
    #[must_use]
    pub fn with_input_filter(mut self, filter: SharedHandoffInputFilter) -> Self {
        self.input_filter = Some(filter);
        self
    }

    /// The tool name the model calls to trigger this handoff.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// The target agent name.
    #[must_use]
    pub fn target_name(&self) -> &str {
        match &self.target {
            HandoffTarget::Static(agent) => agent.name(),
            HandoffTarget::Dynamic { name, .. } => name,
        }
    }

    /// The statically known target, when there is one.
    #[must_use]
    pub fn static_target(&self) -> Option<&Arc<Agent>> {
        match &self.target {
            HandoffTarget::Static(agent) => Some(agent),
            HandoffTarget::Dynamic { .. } => None,
        }
    }

    /// Resolve the target agent for a concrete call.
    ///
    /// # Errors
    ///
    /// Propagates the resolver's failure for dynamic targets.
    pub async fn resolve(&self, arguments: &Value) -> Result<Arc<Agent>> {
        match &self.target {
            HandoffTarget::Static(agent) => Ok(Arc::clone(agent)),
            HandoffTarget::Dynamic { resolver, .. } => resolver(arguments.clone()).await,
        }
    }

    /// Apply the input filter, when one is attached.
    #[must_use]
    pub fn filter_input(&self, data: HandoffInputData) -> HandoffInputData {
        match &self.input_filter {
            Some(filter) => filter(data),
            None => data,
        }
    }

    /// Whether an input filter is attached.
    #[must_use]
    pub const fn has_input_filter(&self) -> bool {
        self.input_filter.is_some()
    }

    /// The tool surface advertised to the model.
    #[must_use]
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            &self.tool_name,
            &self.tool_description,
            self.parameters.clone(),
        )
    }
}

impl fmt::Debug for Handoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff")
            .field("tool_name", &self.tool_name)
            .field("target", &self.target_name())
            .field("input_filter", &self.input_filter.is_some())
            .finish()
    }
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}
