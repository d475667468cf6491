//! Tool execution and handoff control.
//!
//! Executes the classified work of one turn with the required concurrency
//! shape: independent function calls fan out and join, computer actions run
//! strictly sequentially against the shared device, hosted approvals resolve
//! synchronously or defer, and at most one handoff is honored per turn.
//!
//! A handoff short-circuits tool execution: the two are mutually exclusive
//! within a turn.

use futures::StreamExt as _;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{Instrument as _, info, info_span, warn};

use crate::agent::Agent;
use crate::computer::{Computer, ComputerAction, action_label, perform};
use crate::error::{Error, Result, ToolError};
use crate::handoff::HandoffInputData;
use crate::items::{ApprovalKind, RunItem, ToolApprovalItem, ToolOutput};
use crate::tool::{FunctionCallResult, SharedTool, ToolContext, ToolOutcome};

use super::classify::{ComputerRun, FunctionRun, HandoffRun, ProcessedResponse};
use super::state::RunState;

/// Fixed output recorded for a rejected tool call.
pub(crate) const REJECTION_TEXT: &str = "Tool execution was not approved.";

/// Fixed output recorded for every handoff after the first in a turn.
pub(crate) const MULTIPLE_HANDOFFS_TEXT: &str = "Multiple handoffs detected, ignoring this one.";

/// What one turn's execution produced, beyond the items appended to state.
#[derive(Default)]
pub(crate) struct TurnOutput {
    /// Approval requests raised this turn that are still unresolved.
    pub interruptions: Vec<ToolApprovalItem>,
    /// The agent to hand control to, when a handoff was honored.
    pub handoff: Option<Arc<Agent>>,
    /// Per-call results of this turn's function tools, for completion policies.
    pub function_results: Vec<FunctionCallResult>,
    /// Names of tools this turn used, for the tool-choice reset tracker.
    pub tools_used: Vec<String>,
}

enum FunctionDone {
    Output {
        call_id: String,
        name: String,
        output: ToolOutput,
    },
    Invalid {
        call_id: String,
        name: String,
        message: String,
    },
    Nested {
        call_id: String,
        name: String,
        state: Value,
        approvals: Vec<ToolApprovalItem>,
    },
    Fatal(Error),
}

/// Execute the classified work of one turn.
///
/// Items are appended to `state` as work completes: call items were already
/// appended in classification order, outputs append in completion order.
/// `turn_start` is the history index where this turn's items begin.
pub(crate) async fn execute_turn(
    agent: &Agent,
    ctx: &ToolContext,
    state: &mut RunState,
    processed: ProcessedResponse,
    turn_start: usize,
) -> Result<TurnOutput> {
    if !processed.handoffs.is_empty() {
        return execute_handoffs(agent, state, processed.handoffs, turn_start).await;
    }

    let mut output = TurnOutput::default();

    execute_functions(agent, ctx, state, processed.functions, &mut output).await?;
    execute_computer_actions(agent, ctx, state, processed.computer_actions, &mut output).await;
    resolve_hosted_approvals(agent, state, processed.hosted_approvals, &mut output);

    Ok(output)
}

/// Honor the first handoff of the turn; reject the rest with synthetic
/// output items. Never fatal: extra handoffs are a model quirk, not an error.
async fn execute_handoffs(
    agent: &Agent,
    state: &mut RunState,
    mut handoffs: Vec<HandoffRun>,
    turn_start: usize,
) -> Result<TurnOutput> {
    let first = handoffs.remove(0);

    for extra in handoffs {
        warn!(
            agent = %agent.name(),
            handoff = %extra.tool_name,
            "Multiple handoffs in one turn, ignoring extra"
        );
        state.append_items(vec![RunItem::tool_output(
            agent.name(),
            extra.call_id,
            extra.tool_name,
            ToolOutput::Text {
                text: MULTIPLE_HANDOFFS_TEXT.to_owned(),
            },
        )]);
    }

    let new_agent = first.handoff.resolve(&first.arguments).await?;
    info!(
        from_agent = %agent.name(),
        to_agent = %new_agent.name(),
        "Handoff"
    );
    state.append_items(vec![RunItem::HandoffOutput(crate::items::HandoffOutputItem {
        agent: agent.name().to_owned(),
        call_id: first.call_id,
        from_agent: agent.name().to_owned(),
        to_agent: new_agent.name().to_owned(),
    })]);

    if first.handoff.has_input_filter() {
        let data = HandoffInputData {
            history: state.history()[..turn_start.min(state.history().len())].to_vec(),
            new_items: state.history()[turn_start.min(state.history().len())..].to_vec(),
        };
        let filtered = first.handoff.filter_input(data);
        let mut replacement = filtered.history;
        replacement.extend(filtered.new_items);
        state.replace_history(replacement);
    }

    Ok(TurnOutput {
        handoff: Some(new_agent),
        ..TurnOutput::default()
    })
}

/// Run the turn's function calls with the approval gate applied, fanning out
/// all approved calls concurrently and joining before returning.
async fn execute_functions(
    agent: &Agent,
    ctx: &ToolContext,
    state: &mut RunState,
    functions: Vec<FunctionRun>,
    output: &mut TurnOutput,
) -> Result<()> {
    let mut to_execute = Vec::with_capacity(functions.len());

    for run in functions {
        output.tools_used.push(run.name.clone());
        let policy = agent.approval_policy_for(&run.name);
        if !policy.needs_approval(ctx, &run.arguments, &run.call_id) {
            to_execute.push(run);
            continue;
        }

        let item = ToolApprovalItem {
            agent: agent.name().to_owned(),
            kind: ApprovalKind::Function,
            call_id: Some(run.call_id.clone()),
            name: run.name.clone(),
            arguments: run.arguments.clone(),
            source_call_id: None,
        };
        match state.decision(&item.approval_identity()) {
            Some(true) => to_execute.push(run),
            Some(false) => {
                record_rejection(agent.name(), state, &run.call_id, &run.name, output);
            }
            None => {
                state.append_items(vec![RunItem::ToolApprovalRequest(item.clone())]);
                output.interruptions.push(item);
            }
        }
    }

    // Fan out and join; outputs land in completion order, always after the
    // call items appended during classification.
    let mut in_flight: FuturesUnordered<_> = to_execute
        .into_iter()
        .map(|run| run_function(ctx, run))
        .collect();

    let mut first_error = None;
    while let Some(done) = in_flight.next().await {
        match done {
            FunctionDone::Output {
                call_id,
                name,
                output: tool_output,
            } => {
                state.append_items(vec![RunItem::tool_output(
                    agent.name(),
                    &call_id,
                    &name,
                    tool_output.clone(),
                )]);
                output.function_results.push(FunctionCallResult {
                    call_id,
                    name,
                    output: tool_output,
                });
            }
            FunctionDone::Invalid {
                call_id,
                name,
                message,
            } => {
                let text = format!("Invalid arguments: {message}");
                state.append_items(vec![RunItem::tool_output(
                    agent.name(),
                    &call_id,
                    &name,
                    ToolOutput::Text { text: text.clone() },
                )]);
                output.function_results.push(FunctionCallResult {
                    call_id,
                    name,
                    output: ToolOutput::Text { text },
                });
            }
            FunctionDone::Nested {
                call_id,
                name,
                state: nested_state,
                approvals,
            } => {
                state.set_nested(&call_id, &name, nested_state);
                for mut item in approvals {
                    item.source_call_id = Some(call_id.clone());
                    state.append_items(vec![RunItem::ToolApprovalRequest(item.clone())]);
                    output.interruptions.push(item);
                }
            }
            // Let the remaining in-flight calls finish before failing the
            // batch, so no partial write hits the history mid-flight.
            FunctionDone::Fatal(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn run_function(ctx: &ToolContext, run: FunctionRun) -> FunctionDone {
    let span = info_span!(
        "tool",
        tool.name = %run.name,
        tool.call_id = %run.call_id,
    );
    async {
        match run.tool.invoke(ctx, run.arguments.clone()).await {
            Ok(ToolOutcome::Success(value)) => FunctionDone::Output {
                call_id: run.call_id,
                name: run.name,
                output: ToolOutput::from_value(value),
            },
            Ok(ToolOutcome::Interrupted { state, approvals }) => FunctionDone::Nested {
                call_id: run.call_id,
                name: run.name,
                state,
                approvals,
            },
            Err(ToolError::InvalidArguments(message)) => {
                warn!(tool = %run.name, %message, "Tool arguments failed validation");
                FunctionDone::Invalid {
                    call_id: run.call_id,
                    name: run.name,
                    message,
                }
            }
            Err(err) => FunctionDone::Fatal(Error::tool_call(run.name, run.arguments, err)),
        }
    }
    .instrument(span)
    .await
}

/// Run computer actions one at a time: the device is shared and stateful, so
/// concurrent actions would race on its state. Every action yields a
/// screenshot; failures are swallowed into an empty capture.
async fn execute_computer_actions(
    agent: &Agent,
    ctx: &ToolContext,
    state: &mut RunState,
    actions: Vec<ComputerRun>,
    output: &mut TurnOutput,
) {
    for run in actions {
        let name = run.computer.name().to_owned();
        output.tools_used.push(name.clone());

        let arguments = serde_json::to_value(&run.action).unwrap_or(Value::Null);
        let policy = agent.approval_policy_for(&name);
        if policy.needs_approval(ctx, &arguments, &run.call_id) {
            let item = ToolApprovalItem {
                agent: agent.name().to_owned(),
                kind: ApprovalKind::Computer,
                call_id: Some(run.call_id.clone()),
                name: name.clone(),
                arguments,
                source_call_id: None,
            };
            match state.decision(&item.approval_identity()) {
                Some(true) => {}
                Some(false) => {
                    record_rejection(agent.name(), state, &run.call_id, &name, output);
                    continue;
                }
                None => {
                    state.append_items(vec![RunItem::ToolApprovalRequest(item.clone())]);
                    output.interruptions.push(item);
                    continue;
                }
            }
        }

        let data = capture_action(run.computer.as_ref(), &run.action).await;
        state.append_items(vec![RunItem::tool_output(
            agent.name(),
            run.call_id,
            name,
            ToolOutput::Image { data },
        )]);
    }
}

/// Perform one action and capture the screen, tolerating per-action failure.
async fn capture_action(computer: &dyn Computer, action: &ComputerAction) -> String {
    if let Err(err) = perform(computer, action).await {
        warn!(action = action_label(action), %err, "Computer action failed");
        return String::new();
    }
    match computer.screenshot().await {
        Ok(data) => data,
        Err(err) => {
            warn!(%err, "Screenshot failed");
            String::new()
        }
    }
}

/// Resolve hosted approval requests: synchronously when the tool has a
/// callback, from a recorded decision when one exists, otherwise defer.
fn resolve_hosted_approvals(
    agent: &Agent,
    state: &mut RunState,
    approvals: Vec<super::classify::HostedApprovalRun>,
    output: &mut TurnOutput,
) {
    for run in approvals {
        let resolved = run
            .tool
            .approve(&run.item)
            .or_else(|| state.decision(&run.item.approval_identity()));
        match resolved {
            Some(approved) => {
                state.append_items(vec![hosted_resolution(agent.name(), &run.item, approved)]);
            }
            None => output.interruptions.push(run.item),
        }
    }
}

/// The resolution item recorded once a hosted approval is decided.
pub(crate) fn hosted_resolution(
    agent: &str,
    item: &ToolApprovalItem,
    approved: bool,
) -> RunItem {
    let call_id = item
        .call_id
        .clone()
        .unwrap_or_else(|| item.approval_identity());
    RunItem::tool_output(
        agent,
        call_id,
        &item.name,
        ToolOutput::Json {
            value: serde_json::json!({"approved": approved}),
        },
    )
}

fn record_rejection(
    agent: &str,
    state: &mut RunState,
    call_id: &str,
    name: &str,
    output: &mut TurnOutput,
) {
    state.append_items(vec![RunItem::tool_output(
        agent,
        call_id,
        name,
        ToolOutput::Text {
            text: REJECTION_TEXT.to_owned(),
        },
    )]);
    output.function_results.push(FunctionCallResult {
        call_id: call_id.to_owned(),
        name: name.to_owned(),
        output: ToolOutput::Text {
            text: REJECTION_TEXT.to_owned(),
        },
    });
}

/// Re-execute only the decided portion of a suspended turn.
///
/// Called after [`RunState::unwind_decided`] removed the decided approval
/// placeholders; appends exactly one resolution item per decided identity and
/// returns the function results for the completion policy.
pub(crate) async fn execute_resumed(
    registry: &HashMap<String, Arc<Agent>>,
    current: &Arc<Agent>,
    ctx: &ToolContext,
    state: &mut RunState,
    decided: Vec<ToolApprovalItem>,
    decisions: &HashMap<String, bool>,
) -> Result<Vec<FunctionCallResult>> {
    let mut results = Vec::new();
    let mut resumed_parents: Vec<String> = Vec::new();

    for item in decided {
        let identity = item.approval_identity();
        let approved = state.decision(&identity).unwrap_or(false);
        let owner = registry
            .get(&item.agent)
            .cloned()
            .unwrap_or_else(|| Arc::clone(current));

        if let Some(parent_id) = item.source_call_id.clone() {
            // All decisions for one nested run are forwarded in a single
            // resume call; skip parents already resumed this pass.
            if resumed_parents.contains(&parent_id) {
                continue;
            }
            resumed_parents.push(parent_id.clone());
            resume_nested(registry, current, ctx, state, &parent_id, decisions, &mut results)
                .await?;
            continue;
        }

        match item.kind {
            ApprovalKind::Function => {
                if !approved {
                    let call_id = item.call_id.clone().unwrap_or_else(|| identity.clone());
                    record_rejection_result(state, &item, &call_id, &mut results);
                    continue;
                }
                let Some(tool) = owner.find_tool(&item.name).cloned() else {
                    return Err(Error::configuration(format!(
                        "tool '{}' is no longer registered on agent '{}'",
                        item.name, item.agent
                    )));
                };
                let call_id = item.call_id.clone().unwrap_or_else(|| identity.clone());
                invoke_resumed_function(ctx, state, &item, &tool, &call_id, &mut results).await?;
            }
            ApprovalKind::Hosted => {
                state.append_items(vec![hosted_resolution(&item.agent, &item, approved)]);
            }
            ApprovalKind::Computer => {
                let call_id = item.call_id.clone().unwrap_or_else(|| identity.clone());
                if !approved {
                    record_rejection_result(state, &item, &call_id, &mut results);
                    continue;
                }
                let Some(computer) = owner.computer_target().cloned() else {
                    return Err(Error::configuration(format!(
                        "agent '{}' no longer has a computer configured",
                        item.agent
                    )));
                };
                let action: ComputerAction = serde_json::from_value(item.arguments.clone())
                    .map_err(|e| {
                        Error::configuration(format!("stored computer action is invalid: {e}"))
                    })?;
                let data = capture_action(computer.as_ref(), &action).await;
                state.append_items(vec![RunItem::tool_output(
                    &item.agent,
                    call_id,
                    computer.name(),
                    ToolOutput::Image { data },
                )]);
            }
        }
    }

    Ok(results)
}

async fn invoke_resumed_function(
    ctx: &ToolContext,
    state: &mut RunState,
    item: &ToolApprovalItem,
    tool: &SharedTool,
    call_id: &str,
    results: &mut Vec<FunctionCallResult>,
) -> Result<()> {
    let done = run_function(
        ctx,
        FunctionRun {
            call_id: call_id.to_owned(),
            name: item.name.clone(),
            arguments: item.arguments.clone(),
            tool: Arc::clone(tool),
        },
    )
    .await;
    match done {
        FunctionDone::Output {
            call_id,
            name,
            output,
        } => {
            state.append_items(vec![RunItem::tool_output(
                &item.agent,
                &call_id,
                &name,
                output.clone(),
            )]);
            results.push(FunctionCallResult {
                call_id,
                name,
                output,
            });
        }
        FunctionDone::Invalid {
            call_id,
            name,
            message,
        } => {
            let text = format!("Invalid arguments: {message}");
            state.append_items(vec![RunItem::tool_output(
                &item.agent,
                &call_id,
                &name,
                ToolOutput::Text { text: text.clone() },
            )]);
            results.push(FunctionCallResult {
                call_id,
                name,
                output: ToolOutput::Text { text },
            });
        }
        FunctionDone::Nested {
            call_id,
            name,
            state: nested_state,
            approvals,
        } => {
            state.set_nested(&call_id, &name, nested_state);
            push_fresh_interruptions(state, &call_id, approvals);
        }
        FunctionDone::Fatal(err) => return Err(err),
    }
    Ok(())
}

async fn resume_nested(
    registry: &HashMap<String, Arc<Agent>>,
    current: &Arc<Agent>,
    ctx: &ToolContext,
    state: &mut RunState,
    parent_id: &str,
    decisions: &HashMap<String, bool>,
    results: &mut Vec<FunctionCallResult>,
) -> Result<()> {
    let Some(slot) = state.nested(parent_id).cloned() else {
        return Err(Error::configuration(format!(
            "no suspended nested run for call '{parent_id}'"
        )));
    };
    let tool = registry
        .values()
        .chain(std::iter::once(current))
        .find_map(|agent| agent.find_tool(&slot.tool))
        .cloned()
        .ok_or_else(|| {
            Error::configuration(format!(
                "tool '{}' is no longer registered for nested call '{parent_id}'",
                slot.tool
            ))
        })?;

    let outcome = tool
        .resume(ctx, slot.state, decisions)
        .await
        .map_err(|e| Error::tool_call(slot.tool.clone(), Value::Null, e))?;
    match outcome {
        ToolOutcome::Success(value) => {
            state.remove_nested(parent_id);
            let output = ToolOutput::from_value(value);
            state.append_items(vec![RunItem::tool_output(
                ctx.agent(),
                parent_id,
                &slot.tool,
                output.clone(),
            )]);
            results.push(FunctionCallResult {
                call_id: parent_id.to_owned(),
                name: slot.tool,
                output,
            });
        }
        ToolOutcome::Interrupted {
            state: nested_state,
            approvals,
        } => {
            state.set_nested(parent_id, &slot.tool, nested_state);
            push_fresh_interruptions(state, parent_id, approvals);
        }
    }
    Ok(())
}

/// Register nested approvals that are not already pending; a nested resume
/// reports its full remaining set, which may overlap what the parent holds.
fn push_fresh_interruptions(
    state: &mut RunState,
    parent_id: &str,
    approvals: Vec<ToolApprovalItem>,
) {
    let known: Vec<String> = state
        .pending_approvals()
        .iter()
        .map(ToolApprovalItem::approval_identity)
        .collect();
    for mut item in approvals {
        item.source_call_id = Some(parent_id.to_owned());
        if known.contains(&item.approval_identity()) {
            continue;
        }
        state.append_items(vec![RunItem::ToolApprovalRequest(item.clone())]);
        state.push_interruptions(vec![item]);
    }
}

fn record_rejection_result(
    state: &mut RunState,
    item: &ToolApprovalItem,
    call_id: &str,
    results: &mut Vec<FunctionCallResult>,
) {
    state.append_items(vec![RunItem::tool_output(
        &item.agent,
        call_id,
        &item.name,
        ToolOutput::Text {
            text: REJECTION_TEXT.to_owned(),
        },
    )]);
    results.push(FunctionCallResult {
        call_id: call_id.to_owned(),
        name: item.name.clone(),
        output: ToolOutput::Text {
            text: REJECTION_TEXT.to_owned(),
        },
    });
}
