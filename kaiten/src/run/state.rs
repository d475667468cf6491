//! Resumable run state.
//!
//! [`RunState`] is the unit of resumable progress for one logical run. It
//! owns the ordered item history, the raw model responses, the approval
//! decisions recorded so far, the set of pending interruptions, and the
//! bookkeeping that keeps session persistence exact across a suspend/resume
//! cycle.
//!
//! The state is exclusively owned by the orchestrator for the duration of a
//! step; the only sharing across process boundaries is through
//! [`to_json`](RunState::to_json) / [`from_json`](RunState::from_json).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::items::{RunItem, ToolApprovalItem};
use crate::model::ModelResponse;
use crate::usage::Usage;

const STATE_SCHEMA_VERSION: u32 = 1;

const fn default_schema_version() -> u32 {
    STATE_SCHEMA_VERSION
}

/// A recorded approval decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// Whether the gated call may execute.
    pub approved: bool,
}

/// An owned result slot for a suspended nested agent run, keyed by the
/// parent function call that spawned it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedRunSlot {
    /// The parent tool name, needed to route the resume call.
    pub tool: String,
    /// The nested run's serialized state.
    pub state: Value,
}

/// The unit of resumable progress for one logical run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    run_id: String,
    current_agent: String,
    current_turn: usize,
    max_turns: usize,
    original_input: String,
    history: Vec<RunItem>,
    model_responses: Vec<ModelResponse>,
    persisted_count: usize,
    tool_use_tracker: HashMap<String, Vec<String>>,
    approvals: HashMap<String, ApprovalRecord>,
    interruptions: Vec<ToolApprovalItem>,
    nested_states: HashMap<String, NestedRunSlot>,
}

impl RunState {
    /// Create a fresh state at the start of a run.
    #[must_use]
    pub(crate) fn new(
        current_agent: impl Into<String>,
        original_input: impl Into<String>,
        max_turns: usize,
    ) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            run_id: format!("run_{}", uuid::Uuid::new_v4().simple()),
            current_agent: current_agent.into(),
            current_turn: 0,
            max_turns,
            original_input: original_input.into(),
            history: Vec::new(),
            model_responses: Vec::new(),
            persisted_count: 0,
            tool_use_tracker: HashMap::new(),
            approvals: HashMap::new(),
            interruptions: Vec::new(),
            nested_states: HashMap::new(),
        }
    }

    /// The run identifier.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The agent currently in control.
    #[must_use]
    pub fn current_agent(&self) -> &str {
        &self.current_agent
    }

    /// The current turn number (0 before the first turn).
    #[must_use]
    pub const fn current_turn(&self) -> usize {
        self.current_turn
    }

    /// The user input that started the run.
    #[must_use]
    pub fn original_input(&self) -> &str {
        &self.original_input
    }

    /// The full ordered item history.
    #[must_use]
    pub fn history(&self) -> &[RunItem] {
        &self.history
    }

    /// Raw model responses seen so far, in turn order.
    #[must_use]
    pub fn model_responses(&self) -> &[ModelResponse] {
        &self.model_responses
    }

    /// Pending approval requests awaiting a decision.
    #[must_use]
    pub fn pending_approvals(&self) -> &[ToolApprovalItem] {
        &self.interruptions
    }

    /// Total usage accumulated across all responses.
    #[must_use]
    pub fn usage(&self) -> Usage {
        self.model_responses
            .iter()
            .fold(Usage::zero(), |acc, r| acc + r.usage)
    }

    /// Record an approval for a pending request.
    pub fn approve(&mut self, item: &ToolApprovalItem) {
        self.approvals
            .insert(item.approval_identity(), ApprovalRecord { approved: true });
    }

    /// Record a rejection for a pending request.
    pub fn reject(&mut self, item: &ToolApprovalItem) {
        self.approvals
            .insert(item.approval_identity(), ApprovalRecord { approved: false });
    }

    /// Record a decision under a raw approval identity.
    pub fn record_decision(&mut self, identity: impl Into<String>, approved: bool) {
        self.approvals
            .insert(identity.into(), ApprovalRecord { approved });
    }

    /// Look up the decision recorded for an approval identity.
    #[must_use]
    pub(crate) fn decision(&self, identity: &str) -> Option<bool> {
        self.approvals.get(identity).map(|r| r.approved)
    }

    /// All recorded decisions as the identity-to-decision map of the
    /// suspend/resume contract. Forwarded wholesale to nested runs.
    #[must_use]
    pub(crate) fn decisions_map(&self) -> HashMap<String, bool> {
        self.approvals
            .iter()
            .map(|(identity, record)| (identity.clone(), record.approved))
            .collect()
    }

    /// Serialize the state to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] when serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a state previously produced by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on malformed input and
    /// [`Error::Configuration`] on an unsupported schema version.
    pub fn from_json(raw: &str) -> Result<Self> {
        let state: Self = serde_json::from_str(raw)?;
        if state.schema_version != STATE_SCHEMA_VERSION {
            return Err(Error::configuration(format!(
                "unsupported run state schema version {}",
                state.schema_version
            )));
        }
        Ok(state)
    }

    // --- orchestrator-internal bookkeeping ---

    /// Advance to the next turn, enforcing the turn limit.
    pub(crate) fn begin_turn(&mut self) -> Result<()> {
        if self.current_turn >= self.max_turns {
            return Err(Error::max_turns(self.max_turns));
        }
        self.current_turn += 1;
        Ok(())
    }

    pub(crate) fn set_current_agent(&mut self, agent: impl Into<String>) {
        self.current_agent = agent.into();
    }

    pub(crate) fn append_items(&mut self, items: Vec<RunItem>) {
        self.history.extend(items);
    }

    pub(crate) fn record_response(&mut self, response: ModelResponse) {
        self.model_responses.push(response);
    }

    pub(crate) fn record_tool_use(&mut self, agent: &str, names: impl IntoIterator<Item = String>) {
        let entry = self.tool_use_tracker.entry(agent.to_owned()).or_default();
        for name in names {
            if !entry.contains(&name) {
                entry.push(name);
            }
        }
    }

    pub(crate) fn agent_used_tools(&self, agent: &str) -> bool {
        self.tool_use_tracker
            .get(agent)
            .is_some_and(|names| !names.is_empty())
    }

    /// The suffix of the history not yet sent to the session store.
    #[must_use]
    pub(crate) fn unpersisted(&self) -> &[RunItem] {
        &self.history[self.persisted_count.min(self.history.len())..]
    }

    /// Move the persistence cursor to the end of the history.
    pub(crate) fn mark_persisted(&mut self) {
        self.persisted_count = self.history.len();
    }

    /// Replace the history with the output of a handoff input filter.
    ///
    /// The persistence cursor is clamped so it never exceeds the new length.
    pub(crate) fn replace_history(&mut self, history: Vec<RunItem>) {
        self.history = history;
        self.persisted_count = self.persisted_count.min(self.history.len());
    }

    pub(crate) fn set_interruptions(&mut self, interruptions: Vec<ToolApprovalItem>) {
        self.interruptions = interruptions;
    }

    pub(crate) fn push_interruptions(
        &mut self,
        interruptions: impl IntoIterator<Item = ToolApprovalItem>,
    ) {
        self.interruptions.extend(interruptions);
    }

    /// Pending approval items for which a decision has been recorded.
    #[must_use]
    pub(crate) fn decided_interruptions(&self) -> Vec<ToolApprovalItem> {
        self.interruptions
            .iter()
            .filter(|item| self.decision(&item.approval_identity()).is_some())
            .cloned()
            .collect()
    }

    /// Unwind decided approval placeholders before re-executing their calls.
    ///
    /// Each decided item is removed from the history tail and from the
    /// pending set, and the persistence cursor steps back by one per removed
    /// item that had already been counted as persisted. The re-executed
    /// call's resolution item is appended afterwards, so the cursor
    /// arithmetic neither double-appends the placeholder nor drops the
    /// resolution.
    pub(crate) fn unwind_decided(&mut self, decided: &[ToolApprovalItem]) {
        for item in decided {
            let identity = item.approval_identity();
            if let Some(pos) = self
                .history
                .iter()
                .rposition(|existing| existing.identity() == identity)
            {
                self.history.remove(pos);
                if pos < self.persisted_count {
                    self.persisted_count = self.persisted_count.saturating_sub(1);
                }
            }
            self.interruptions
                .retain(|pending| pending.approval_identity() != identity);
        }
        self.persisted_count = self.persisted_count.min(self.history.len());
    }

    pub(crate) fn set_nested(&mut self, call_id: impl Into<String>, tool: impl Into<String>, state: Value) {
        self.nested_states.insert(
            call_id.into(),
            NestedRunSlot {
                tool: tool.into(),
                state,
            },
        );
    }

    #[must_use]
    pub(crate) fn nested(&self, call_id: &str) -> Option<&NestedRunSlot> {
        self.nested_states.get(call_id)
    }

    pub(crate) fn remove_nested(&mut self, call_id: &str) {
        self.nested_states.remove(call_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::items::{ApprovalKind, ToolOutput};
    use serde_json::json;

    fn approval(call_id: &str) -> ToolApprovalItem {
        ToolApprovalItem {
            agent: "assistant".into(),
            kind: ApprovalKind::Function,
            call_id: Some(call_id.into()),
            name: "delete_file".into(),
            arguments: json!({}),
            source_call_id: None,
        }
    }

    mod turns {
        use super::*;

        #[test]
        fn begin_turn_increments_until_limit() {
            let mut state = RunState::new("a", "hi", 2);
            state.begin_turn().unwrap();
            state.begin_turn().unwrap();
            let err = state.begin_turn().unwrap_err();
            assert!(matches!(err, Error::MaxTurns { max_turns: 2 }));
            assert_eq!(state.current_turn(), 2);
        }
    }

    mod approvals {
        use super::*;

        #[test]
        fn approve_and_reject_record_decisions() {
            let mut state = RunState::new("a", "hi", 10);
            let first = approval("c1");
            let second = approval("c2");
            state.approve(&first);
            state.reject(&second);

            assert_eq!(state.decision(&first.approval_identity()), Some(true));
            assert_eq!(state.decision(&second.approval_identity()), Some(false));
            assert_eq!(state.decision("function_approval:other"), None);
        }

        #[test]
        fn decided_interruptions_filters_on_recorded_decisions() {
            let mut state = RunState::new("a", "hi", 10);
            state.set_interruptions(vec![approval("c1"), approval("c2")]);
            state.approve(&approval("c1"));

            let decided = state.decided_interruptions();
            assert_eq!(decided.len(), 1);
            assert_eq!(decided[0].call_id.as_deref(), Some("c1"));
            assert_eq!(state.pending_approvals().len(), 2);
        }
    }

    mod persistence_cursor {
        use super::*;

        #[test]
        fn unpersisted_is_the_suffix() {
            let mut state = RunState::new("a", "hi", 10);
            state.append_items(vec![
                RunItem::message("a", "one"),
                RunItem::message("a", "two"),
            ]);
            assert_eq!(state.unpersisted().len(), 2);
            state.mark_persisted();
            assert!(state.unpersisted().is_empty());
            state.append_items(vec![RunItem::message("a", "three")]);
            assert_eq!(state.unpersisted().len(), 1);
        }

        #[test]
        fn unwind_removes_placeholder_and_steps_cursor_back() {
            let mut state = RunState::new("a", "hi", 10);
            let pending = approval("c1");
            state.append_items(vec![
                RunItem::function_call("a", "c1", "delete_file", json!({})),
                RunItem::ToolApprovalRequest(pending.clone()),
            ]);
            state.set_interruptions(vec![pending.clone()]);
            state.mark_persisted();

            state.unwind_decided(&[pending]);

            assert_eq!(state.history().len(), 1);
            assert!(state.pending_approvals().is_empty());
            // The resolution appended next is exactly the unpersisted suffix.
            state.append_items(vec![RunItem::tool_output(
                "a",
                "c1",
                "delete_file",
                ToolOutput::Text { text: "ok".into() },
            )]);
            assert_eq!(state.unpersisted().len(), 1);
        }

        #[test]
        fn unwind_leaves_undecided_items_in_place() {
            let mut state = RunState::new("a", "hi", 10);
            let first = approval("c1");
            let second = approval("c2");
            state.append_items(vec![
                RunItem::ToolApprovalRequest(first.clone()),
                RunItem::ToolApprovalRequest(second.clone()),
            ]);
            state.set_interruptions(vec![first.clone(), second.clone()]);
            state.mark_persisted();

            state.unwind_decided(&[first]);

            assert_eq!(state.history().len(), 1);
            assert_eq!(state.pending_approvals().len(), 1);
            assert_eq!(state.pending_approvals()[0].call_id.as_deref(), Some("c2"));
        }

        #[test]
        fn replace_history_clamps_cursor() {
            let mut state = RunState::new("a", "hi", 10);
            state.append_items(vec![
                RunItem::message("a", "one"),
                RunItem::message("a", "two"),
            ]);
            state.mark_persisted();
            state.replace_history(vec![RunItem::message("a", "kept")]);
            assert!(state.unpersisted().is_empty());
        }
    }

    mod tool_use_tracker {
        use super::*;

        #[test]
        fn records_per_agent_tool_use() {
            let mut state = RunState::new("a", "hi", 10);
            assert!(!state.agent_used_tools("a"));
            state.record_tool_use("a", vec!["lookup".into(), "lookup".into()]);
            assert!(state.agent_used_tools("a"));
            assert!(!state.agent_used_tools("b"));
        }
    }

    mod serde_round_trip {
        use super::*;

        #[test]
        fn round_trip_preserves_item_set_and_decisions() {
            let mut state = RunState::new("a", "hi", 10);
            state.begin_turn().unwrap();
            state.append_items(vec![
                RunItem::function_call("a", "c1", "lookup", json!({"city": "Paris"})),
                RunItem::ToolApprovalRequest(approval("c1")),
            ]);
            state.set_interruptions(vec![approval("c1")]);
            state.approve(&approval("c1"));
            state.set_nested("c9", "researcher", json!({"inner": true}));
            state.mark_persisted();

            let encoded = state.to_json().unwrap();
            let decoded = RunState::from_json(&encoded).unwrap();

            assert_eq!(decoded.history(), state.history());
            assert_eq!(decoded.pending_approvals(), state.pending_approvals());
            assert_eq!(
                decoded.decision(&approval("c1").approval_identity()),
                Some(true)
            );
            assert_eq!(decoded.nested("c9").map(|s| s.tool.as_str()), Some("researcher"));
            assert_eq!(decoded.unpersisted().len(), 0);
        }

        #[test]
        fn unknown_schema_version_is_rejected() {
            let mut state_json: Value =
                serde_json::from_str(&RunState::new("a", "hi", 10).to_json().unwrap()).unwrap();
            state_json["schema_version"] = json!(99);
            let err = RunState::from_json(&state_json.to_string()).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)));
        }
    }
}
