//! Work classification.
//!
//! Walks a single model response and partitions it into typed, actionable
//! groups — handoff requests, function tool requests, computer actions, and
//! hosted approval requests — plus the flat ordered list of history items.
//!
//! Classification is pure: no tool executes and no state mutates here. That
//! separation is what makes replay-safety on resumption tractable, because
//! classification can be redone without side effects.

use serde_json::Value;
use std::sync::Arc;

use crate::agent::Agent;
use crate::computer::{ComputerAction, SharedComputer};
use crate::error::{ModelBehaviorError, Result};
use crate::handoff::Handoff;
use crate::items::{
    ApprovalKind, RunItem, ToolApprovalItem, ToolCallItem, ToolCallKind,
};
use crate::model::{HostedCallStatus, ModelResponse, OutputElement};
use crate::tool::{HostedTool, SharedTool};

/// A function tool request awaiting execution. One turn only, never persisted.
#[derive(Clone)]
pub(crate) struct FunctionRun {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
    pub tool: SharedTool,
}

/// A computer action awaiting execution.
#[derive(Clone)]
pub(crate) struct ComputerRun {
    pub call_id: String,
    pub action: ComputerAction,
    pub computer: SharedComputer,
}

/// A handoff request awaiting processing.
#[derive(Clone)]
pub(crate) struct HandoffRun {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub handoff: Handoff,
}

/// A hosted approval request awaiting resolution.
#[derive(Clone)]
pub(crate) struct HostedApprovalRun {
    pub item: ToolApprovalItem,
    pub tool: HostedTool,
}

/// The classified groups produced from one model response.
#[derive(Default)]
pub(crate) struct ProcessedResponse {
    /// History items in classification order.
    pub new_items: Vec<RunItem>,
    pub handoffs: Vec<HandoffRun>,
    pub functions: Vec<FunctionRun>,
    pub computer_actions: Vec<ComputerRun>,
    pub hosted_approvals: Vec<HostedApprovalRun>,
}

impl std::fmt::Debug for ProcessedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedResponse")
            .field("new_items", &self.new_items)
            .field("handoffs_count", &self.handoffs.len())
            .field("functions_count", &self.functions.len())
            .field("computer_actions_count", &self.computer_actions.len())
            .field("hosted_approvals_count", &self.hosted_approvals.len())
            .finish()
    }
}

impl ProcessedResponse {
    /// Whether the response contains anything actionable.
    #[must_use]
    pub fn has_work(&self) -> bool {
        !self.handoffs.is_empty()
            || !self.functions.is_empty()
            || !self.computer_actions.is_empty()
            || !self.hosted_approvals.is_empty()
    }
}

/// Partition a model response into actionable groups and history items.
///
/// # Errors
///
/// Fails with a [`ModelBehaviorError`] when the model references an
/// unregistered tool or hosted tool, or issues a computer call while the
/// agent has no computer configured. These are fatal for the turn and never
/// retried.
pub(crate) fn process_model_response(
    agent: &Agent,
    response: &ModelResponse,
) -> Result<ProcessedResponse> {
    let mut processed = ProcessedResponse::default();
    let agent_name = agent.name();

    for element in &response.output {
        match element {
            OutputElement::Message { content } => {
                processed
                    .new_items
                    .push(RunItem::message(agent_name, content.clone()));
            }
            OutputElement::Reasoning { content } => {
                processed
                    .new_items
                    .push(RunItem::reasoning(agent_name, content.clone()));
            }
            OutputElement::FunctionCall {
                call_id,
                name,
                arguments,
            } => {
                if let Some(handoff) = agent.find_handoff(name) {
                    processed
                        .new_items
                        .push(RunItem::HandoffCall(crate::items::HandoffCallItem {
                            agent: agent_name.to_owned(),
                            call_id: call_id.clone(),
                            name: name.clone(),
                            arguments: arguments.clone(),
                        }));
                    processed.handoffs.push(HandoffRun {
                        call_id: call_id.clone(),
                        tool_name: name.clone(),
                        arguments: arguments.clone(),
                        handoff: handoff.clone(),
                    });
                } else if let Some(tool) = agent.find_tool(name) {
                    processed.new_items.push(RunItem::function_call(
                        agent_name,
                        call_id.clone(),
                        name.clone(),
                        arguments.clone(),
                    ));
                    processed.functions.push(FunctionRun {
                        call_id: call_id.clone(),
                        name: name.clone(),
                        arguments: arguments.clone(),
                        tool: Arc::clone(tool),
                    });
                } else {
                    return Err(ModelBehaviorError::UnknownTool(name.clone()).into());
                }
            }
            OutputElement::ComputerCall { call_id, action } => {
                let Some(computer) = agent.computer_target() else {
                    return Err(ModelBehaviorError::MissingComputer(agent_name.to_owned()).into());
                };
                processed.new_items.push(RunItem::ToolCall(ToolCallItem {
                    agent: agent_name.to_owned(),
                    kind: ToolCallKind::Computer,
                    call_id: Some(call_id.clone()),
                    name: computer.name().to_owned(),
                    arguments: serde_json::to_value(action).unwrap_or(Value::Null),
                }));
                processed.computer_actions.push(ComputerRun {
                    call_id: call_id.clone(),
                    action: action.clone(),
                    computer: Arc::clone(computer),
                });
            }
            OutputElement::HostedToolCall {
                call_id,
                name,
                status,
                payload,
            } => {
                processed.new_items.push(RunItem::ToolCall(ToolCallItem {
                    agent: agent_name.to_owned(),
                    kind: ToolCallKind::Hosted,
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments: payload.clone(),
                }));
                if *status == HostedCallStatus::NeedsApproval {
                    let Some(tool) = agent.find_hosted_tool(name) else {
                        return Err(ModelBehaviorError::UnknownHostedTool(name.clone()).into());
                    };
                    let item = ToolApprovalItem {
                        agent: agent_name.to_owned(),
                        kind: ApprovalKind::Hosted,
                        call_id: call_id.clone(),
                        name: name.clone(),
                        arguments: payload.clone(),
                        source_call_id: None,
                    };
                    // Synchronous-resolve tools never surface the request as
                    // a history item; only the resolution is appended later.
                    if !tool.resolves_synchronously() {
                        processed
                            .new_items
                            .push(RunItem::ToolApprovalRequest(item.clone()));
                    }
                    processed.hosted_approvals.push(HostedApprovalRun {
                        item,
                        tool: tool.clone(),
                    });
                }
            }
        }
    }

    Ok(processed)
}
