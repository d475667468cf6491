//! Turn orchestration.
//!
//! The [`Runner`] is the outer driver: it repeatedly asks the current
//! agent's model for a response, feeds it through classification, execution,
//! and step resolution, and loops until a terminal verdict — a final output,
//! a suspension for approvals, or a fatal error.
//!
//! The runner owns no state; everything mutable lives in [`RunState`], which
//! is exclusively owned by one driver for the duration of a step and crosses
//! process boundaries only as serialized JSON.

use futures::stream::Stream;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{Instrument as _, debug, error, info, info_span};

use crate::agent::{Agent, collect_agents};
use crate::error::{Error, Result};
use crate::items::RunItem;
use crate::model::{ModelRequest, ToolChoice};
use crate::session::SharedSession;
use crate::tool::ToolContext;

use super::classify::process_model_response;
use super::execute::{TurnOutput, execute_resumed, execute_turn};
use super::resolve::{NextStep, resolve_step};
use super::result::{RunEvent, RunResult};
use super::state::RunState;

/// Run-level configuration.
#[derive(Clone, Default)]
pub struct RunConfig {
    /// Override the agent's turn limit for this run.
    pub max_turns: Option<usize>,

    /// External append-only store for the item history. The runner appends
    /// the not-yet-persisted suffix after every turn.
    pub session: Option<SharedSession>,
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("max_turns", &self.max_turns)
            .field("session", &self.session.is_some())
            .finish()
    }
}

/// Outcome of applying recorded decisions to a suspended state.
enum Resumed {
    /// Some approvals are still unresolved; the run stays suspended.
    Interrupted,
    /// A completion policy finished the run from the resumed tool results.
    Final(Value),
    /// The suspended turn fully resolved; the loop continues.
    Continue,
}

/// Stateless execution engine that drives an [`Agent`] through its turns.
///
/// `Runner` owns no state, so it is safe to run several agents — or the same
/// agent with different inputs — concurrently.
#[derive(Debug, Clone, Copy)]
pub struct Runner;

impl Runner {
    /// Execute an agent run until it completes or suspends for approvals.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the agent has no provider,
    /// [`Error::MaxTurns`] when the turn limit is exceeded, and propagates
    /// model-behavior and tool failures.
    pub async fn run(
        agent: &Arc<Agent>,
        input: impl Into<String>,
        config: RunConfig,
    ) -> Result<RunResult> {
        let input = input.into();
        let span = info_span!(
            "run",
            agent.name = %agent.name(),
            run.max_turns = config.max_turns.unwrap_or(agent.turn_limit()),
        );
        async {
            let max_turns = config.max_turns.unwrap_or(agent.turn_limit());
            let state = RunState::new(agent.name(), input, max_turns);
            let registry = collect_agents(agent);
            info!(agent = %agent.name(), run_id = %state.run_id(), "Run started");
            Self::drive(Arc::clone(agent), state, registry, &config).await
        }
        .instrument(span)
        .await
    }

    /// Resume a previously suspended run.
    ///
    /// Decisions must already be recorded on the state via
    /// [`RunState::approve`] / [`RunState::reject`]. Only the decided calls
    /// re-execute; undecided approvals stay pending. Resuming with no
    /// decided approvals while some are pending returns the suspended
    /// result unchanged, so repeating a resume never executes twice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the suspended current agent is
    /// not reachable from `agent`'s handoff graph.
    pub async fn resume(
        agent: &Arc<Agent>,
        state: RunState,
        config: RunConfig,
    ) -> Result<RunResult> {
        let registry = collect_agents(agent);
        let current = registry.get(state.current_agent()).cloned().ok_or_else(|| {
            Error::configuration(format!(
                "agent '{}' from the suspended state is not reachable from '{}'",
                state.current_agent(),
                agent.name()
            ))
        })?;
        let span = info_span!(
            "run",
            agent.name = %current.name(),
            run.resumed = true,
        );
        async {
            let mut state = state;
            match Self::apply_pending_decisions(&current, &registry, &mut state).await? {
                Resumed::Interrupted => {
                    Self::persist(&config, &mut state).await?;
                    Ok(Self::interrupted_result(current.name(), state))
                }
                Resumed::Final(output) => {
                    Self::persist(&config, &mut state).await?;
                    Ok(Self::final_result(current.name(), state, output))
                }
                Resumed::Continue => {
                    Self::persist(&config, &mut state).await?;
                    Self::drive(current, state, registry, &config).await
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Resume with a map of approval identity to decision, the serialized
    /// form of the suspend/resume contract.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`resume`](Self::resume).
    pub async fn resume_with_decisions(
        agent: &Arc<Agent>,
        mut state: RunState,
        decisions: HashMap<String, bool>,
        config: RunConfig,
    ) -> Result<RunResult> {
        for (identity, approved) in decisions {
            state.record_decision(identity, approved);
        }
        Self::resume(agent, state, config).await
    }

    /// Execute a run, yielding [`RunEvent`]s as it progresses.
    ///
    /// Emits exactly one `ItemAppended` per newly appended history item, in
    /// append order.
    //
    // The `tail_expr_drop_order` warning originates inside the `try_stream!`
    // macro expansion under Rust 2024 and is harmless.
    #[allow(tail_expr_drop_order)]
    pub fn run_streamed<'a>(
        agent: &'a Arc<Agent>,
        input: impl Into<String>,
        config: RunConfig,
    ) -> Pin<Box<dyn Stream<Item = Result<RunEvent>> + Send + 'a>> {
        let input = input.into();
        Box::pin(async_stream::try_stream! {
            let max_turns = config.max_turns.unwrap_or(agent.turn_limit());
            let mut state = RunState::new(agent.name(), input, max_turns);
            let mut registry = collect_agents(agent);
            let mut current = Arc::clone(agent);
            let mut emitted: HashSet<String> = HashSet::new();

            yield RunEvent::RunStarted { agent_name: current.name().to_owned() };

            loop {
                yield RunEvent::TurnStarted { turn: state.current_turn() + 1 };

                let from = current.name().to_owned();
                let step = Self::run_turn(&current, &mut state, &mut registry).await?;
                for item in Self::fresh_items(&state, &mut emitted) {
                    yield RunEvent::ItemAppended { item };
                }
                Self::persist(&config, &mut state).await?;

                match step {
                    NextStep::RunAgain => {}
                    NextStep::Handoff { new_agent } => {
                        yield RunEvent::HandoffOccurred {
                            from,
                            to: new_agent.name().to_owned(),
                        };
                        state.set_current_agent(new_agent.name());
                        current = new_agent;
                    }
                    NextStep::Interruption { approvals } => {
                        state.set_interruptions(approvals.clone());
                        yield RunEvent::RunInterrupted { approvals };
                        let name = current.name().to_owned();
                        yield RunEvent::RunCompleted {
                            result: Box::new(Self::interrupted_result(&name, state)),
                        };
                        return;
                    }
                    NextStep::FinalOutput { output } => {
                        let name = current.name().to_owned();
                        yield RunEvent::RunCompleted {
                            result: Box::new(Self::final_result(&name, state, output)),
                        };
                        return;
                    }
                }
            }
        })
    }

    /// Resume a suspended run, yielding [`RunEvent`]s as it progresses.
    ///
    /// Items already emitted before the suspension are not re-emitted;
    /// deduplication is by item identity, so it holds across the
    /// serialize/deserialize boundary.
    #[allow(tail_expr_drop_order)]
    pub fn resume_streamed<'a>(
        agent: &'a Arc<Agent>,
        state: RunState,
        config: RunConfig,
    ) -> Pin<Box<dyn Stream<Item = Result<RunEvent>> + Send + 'a>> {
        Box::pin(async_stream::try_stream! {
            let mut registry = collect_agents(agent);
            let mut current = registry
                .get(state.current_agent())
                .cloned()
                .ok_or_else(|| {
                    Error::configuration(format!(
                        "agent '{}' from the suspended state is not reachable from '{}'",
                        state.current_agent(),
                        agent.name()
                    ))
                })?;
            let mut state = state;

            // Everything already in the history was emitted before the
            // suspension.
            let mut emitted: HashSet<String> =
                state.history().iter().map(RunItem::identity).collect();

            let resumed = Self::apply_pending_decisions(&current, &registry, &mut state).await?;
            for item in Self::fresh_items(&state, &mut emitted) {
                yield RunEvent::ItemAppended { item };
            }
            Self::persist(&config, &mut state).await?;

            match resumed {
                Resumed::Interrupted => {
                    let approvals = state.pending_approvals().to_vec();
                    yield RunEvent::RunInterrupted { approvals };
                    let name = current.name().to_owned();
                    yield RunEvent::RunCompleted {
                        result: Box::new(Self::interrupted_result(&name, state)),
                    };
                    return;
                }
                Resumed::Final(output) => {
                    let name = current.name().to_owned();
                    yield RunEvent::RunCompleted {
                        result: Box::new(Self::final_result(&name, state, output)),
                    };
                    return;
                }
                Resumed::Continue => {}
            }

            loop {
                yield RunEvent::TurnStarted { turn: state.current_turn() + 1 };

                let from = current.name().to_owned();
                let step = Self::run_turn(&current, &mut state, &mut registry).await?;
                for item in Self::fresh_items(&state, &mut emitted) {
                    yield RunEvent::ItemAppended { item };
                }
                Self::persist(&config, &mut state).await?;

                match step {
                    NextStep::RunAgain => {}
                    NextStep::Handoff { new_agent } => {
                        yield RunEvent::HandoffOccurred {
                            from,
                            to: new_agent.name().to_owned(),
                        };
                        state.set_current_agent(new_agent.name());
                        current = new_agent;
                    }
                    NextStep::Interruption { approvals } => {
                        state.set_interruptions(approvals.clone());
                        yield RunEvent::RunInterrupted { approvals };
                        let name = current.name().to_owned();
                        yield RunEvent::RunCompleted {
                            result: Box::new(Self::interrupted_result(&name, state)),
                        };
                        return;
                    }
                    NextStep::FinalOutput { output } => {
                        let name = current.name().to_owned();
                        yield RunEvent::RunCompleted {
                            result: Box::new(Self::final_result(&name, state, output)),
                        };
                        return;
                    }
                }
            }
        })
    }

    /// The blocking driver loop shared by `run` and `resume`.
    async fn drive(
        mut current: Arc<Agent>,
        mut state: RunState,
        mut registry: HashMap<String, Arc<Agent>>,
        config: &RunConfig,
    ) -> Result<RunResult> {
        loop {
            let step = Self::run_turn(&current, &mut state, &mut registry).await?;
            Self::persist(config, &mut state).await?;

            match step {
                NextStep::RunAgain => {}
                NextStep::Handoff { new_agent } => {
                    state.set_current_agent(new_agent.name());
                    current = new_agent;
                }
                NextStep::Interruption { approvals } => {
                    state.set_interruptions(approvals);
                    info!(
                        agent = %current.name(),
                        pending = state.pending_approvals().len(),
                        "Run suspended awaiting approvals",
                    );
                    return Ok(Self::interrupted_result(current.name(), state));
                }
                NextStep::FinalOutput { output } => {
                    info!(
                        agent = %current.name(),
                        turns = state.current_turn(),
                        "Run completed",
                    );
                    return Ok(Self::final_result(current.name(), state, output));
                }
            }
        }
    }

    /// Execute one turn: model call, classification, execution, resolution.
    async fn run_turn(
        current: &Arc<Agent>,
        state: &mut RunState,
        registry: &mut HashMap<String, Arc<Agent>>,
    ) -> Result<NextStep> {
        state.begin_turn()?;
        let turn = state.current_turn();
        debug!(agent = %current.name(), turn, "Starting turn");

        let provider = current.model_provider().ok_or_else(|| {
            Error::configuration(format!(
                "Agent '{}' has no model provider configured. Call .provider() before running.",
                current.name()
            ))
        })?;

        let request = Self::build_request(current, state);
        let response = provider.get_response(&request).await.map_err(|e| {
            error!(error = %e, agent = %current.name(), turn, "Model call failed");
            e
        })?;
        state.record_response(response.clone());

        let turn_start = state.history().len();
        let mut processed = process_model_response(current, &response)?;
        let had_work = processed.has_work();
        let message_text = response.message_text().map(ToOwned::to_owned);

        let classified = std::mem::take(&mut processed.new_items);
        state.append_items(classified);

        let ctx = ToolContext::new(state.run_id(), current.name(), turn);
        let outcome = execute_turn(current, &ctx, state, processed, turn_start).await?;

        if !outcome.tools_used.is_empty() {
            state.record_tool_use(current.name(), outcome.tools_used.clone());
        }
        if let Some(new_agent) = &outcome.handoff {
            registry
                .entry(new_agent.name().to_owned())
                .or_insert_with(|| Arc::clone(new_agent));
        }

        resolve_step(current, &ctx, message_text.as_deref(), outcome, had_work).await
    }

    /// Unwind and re-execute the decided portion of a suspended turn.
    async fn apply_pending_decisions(
        current: &Arc<Agent>,
        registry: &HashMap<String, Arc<Agent>>,
        state: &mut RunState,
    ) -> Result<Resumed> {
        let decided = state.decided_interruptions();
        if decided.is_empty() {
            return Ok(if state.pending_approvals().is_empty() {
                Resumed::Continue
            } else {
                Resumed::Interrupted
            });
        }

        debug!(
            agent = %current.name(),
            decided = decided.len(),
            "Resuming suspended turn",
        );
        let ctx = ToolContext::new(state.run_id(), current.name(), state.current_turn());
        state.unwind_decided(&decided);
        let decisions = state.decisions_map();
        let results =
            execute_resumed(registry, current, &ctx, state, decided, &decisions).await?;

        if !state.pending_approvals().is_empty() {
            return Ok(Resumed::Interrupted);
        }

        let turn = TurnOutput {
            function_results: results,
            ..TurnOutput::default()
        };
        match resolve_step(current, &ctx, None, turn, true).await? {
            NextStep::FinalOutput { output } => Ok(Resumed::Final(output)),
            NextStep::RunAgain
            | NextStep::Handoff { .. }
            | NextStep::Interruption { .. } => Ok(Resumed::Continue),
        }
    }

    /// Build the model request for the current turn.
    ///
    /// When the agent forces a specific tool and has already used tools in
    /// this run, the forced choice downgrades to auto so the model cannot
    /// loop on the same call forever.
    fn build_request(agent: &Agent, state: &RunState) -> ModelRequest {
        let mut settings = agent.settings().clone();
        if agent.resets_tool_choice()
            && state.agent_used_tools(agent.name())
            && matches!(
                settings.tool_choice,
                Some(ToolChoice::Required | ToolChoice::Tool(_))
            )
        {
            settings.tool_choice = Some(ToolChoice::Auto);
        }

        ModelRequest {
            model: agent.model_id().to_owned(),
            system_instructions: agent.resolved_instructions().map(ToOwned::to_owned),
            original_input: state.original_input().to_owned(),
            items: state.history().to_vec(),
            tools: agent.tool_definitions(),
            handoffs: agent.handoff_definitions(),
            output_schema: agent.declared_output_schema().cloned(),
            settings,
        }
    }

    /// Append the not-yet-persisted suffix to the session, if one is set.
    async fn persist(config: &RunConfig, state: &mut RunState) -> Result<()> {
        if let Some(session) = &config.session {
            session.add_items(state.unpersisted()).await?;
        }
        state.mark_persisted();
        Ok(())
    }

    /// History items not yet emitted to the stream, in append order.
    fn fresh_items(state: &RunState, emitted: &mut HashSet<String>) -> Vec<RunItem> {
        state
            .history()
            .iter()
            .filter(|item| emitted.insert(item.identity()))
            .cloned()
            .collect()
    }

    fn final_result(agent_name: &str, state: RunState, output: Value) -> RunResult {
        RunResult {
            final_output: Some(output),
            interruptions: Vec::new(),
            history: state.history().to_vec(),
            usage: state.usage(),
            turns: state.current_turn(),
            agent_name: agent_name.to_owned(),
            state,
        }
    }

    fn interrupted_result(agent_name: &str, state: RunState) -> RunResult {
        RunResult {
            final_output: None,
            interruptions: state.pending_approvals().to_vec(),
            history: state.history().to_vec(),
            usage: state.usage(),
            turns: state.current_turn(),
            agent_name: agent_name.to_owned(),
            state,
        }
    }
}
