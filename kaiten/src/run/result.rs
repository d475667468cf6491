//! Run results and streamed run events.

use serde_json::Value;

use crate::items::{RunItem, ToolApprovalItem};
use crate::usage::Usage;

use super::state::RunState;

/// The outcome of a run: either complete with a final output, or suspended
/// with pending approvals and a state that can be resumed later.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The final output, when the run completed.
    pub final_output: Option<Value>,

    /// Unresolved approval requests, when the run suspended.
    pub interruptions: Vec<ToolApprovalItem>,

    /// The full ordered item history of the run.
    pub history: Vec<RunItem>,

    /// Total usage across all model requests, including nested runs' turns
    /// reported through their responses.
    pub usage: Usage,

    /// Number of turns executed.
    pub turns: usize,

    /// The agent in control when the run ended or suspended.
    pub agent_name: String,

    /// The run state; serialize it to suspend, pass it to `Runner::resume`
    /// with recorded decisions to continue.
    pub state: RunState,
}

impl RunResult {
    /// Whether the run reached a final output.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.final_output.is_some()
    }

    /// Whether the run suspended awaiting approval decisions.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        !self.interruptions.is_empty()
    }

    /// The final output as text, when it is a string.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.final_output.as_ref().and_then(Value::as_str)
    }
}

/// Events yielded by a streamed run, in order.
///
/// Exactly one [`ItemAppended`](RunEvent::ItemAppended) is emitted per newly
/// appended history item; an item is never re-emitted, even across a
/// suspend/resume cycle (identity-based, not equality-based).
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The run started.
    RunStarted {
        /// The starting agent.
        agent_name: String,
    },
    /// A turn is starting.
    TurnStarted {
        /// The 1-based turn number.
        turn: usize,
    },
    /// A new item was appended to the history.
    ItemAppended {
        /// The appended item.
        item: RunItem,
    },
    /// Control transferred between agents.
    HandoffOccurred {
        /// The agent that handed off.
        from: String,
        /// The agent now in control.
        to: String,
    },
    /// The run suspended awaiting approval decisions.
    RunInterrupted {
        /// The unresolved approval requests.
        approvals: Vec<ToolApprovalItem>,
    },
    /// The run ended; inspect the result for final output or interruptions.
    RunCompleted {
        /// The run result.
        result: Box<RunResult>,
    },
}
