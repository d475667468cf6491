//! The turn-resolution engine.
//!
//! One turn flows through four stages:
//!
//! 1. **Classify** ([`classify`]): partition the model response into typed,
//!    actionable groups plus ordered history items. Pure, side-effect free.
//! 2. **Execute** ([`execute`]): run function tools concurrently, computer
//!    actions sequentially, resolve or defer hosted approvals, and honor at
//!    most one handoff.
//! 3. **Resolve** ([`resolve`]): combine the outcomes into one
//!    [`NextStep`] verdict.
//! 4. **Orchestrate** ([`runner`]): loop until a terminal verdict, persisting
//!    the history suffix after every turn.
//!
//! Suspension and resumption are mediated entirely through [`RunState`]:
//! serialize it when a run interrupts, record decisions, and hand it back to
//! [`Runner::resume`].

mod classify;
mod execute;
mod resolve;
mod result;
mod runner;
mod state;

pub use resolve::NextStep;
pub use result::{RunEvent, RunResult};
pub use runner::{RunConfig, Runner};
pub use state::{ApprovalRecord, NestedRunSlot, RunState};
