//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types and traits for easy access.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kaiten::prelude::*;
//! ```

pub use crate::agent::{Agent, OutputSchema, SharedToolUseResolver, ToolUseBehavior};
pub use crate::computer::{Computer, ComputerAction, MouseButton, Position, SharedComputer};
pub use crate::error::{Error, ModelBehaviorError, Result, ToolError};
pub use crate::handoff::{
    Handoff, HandoffInputData, SharedHandoffInputFilter, SharedHandoffResolver,
};
pub use crate::items::{
    ApprovalKind, HandoffCallItem, HandoffOutputItem, MessageOutputItem, ReasoningItem, RunItem,
    ToolApprovalItem, ToolCallItem, ToolCallKind, ToolCallOutputItem, ToolOutput,
};
pub use crate::model::mock::MockModel;
pub use crate::model::{
    HostedCallStatus, ModelProvider, ModelRequest, ModelResponse, ModelSettings, OutputElement,
    SharedModelProvider, ToolChoice,
};
pub use crate::run::{
    ApprovalRecord, NestedRunSlot, NextStep, RunConfig, RunEvent, RunResult, RunState, Runner,
};
pub use crate::session::{InMemorySession, Session, SharedSession};
pub use crate::tool::{
    DynTool, FunctionCallResult, HostedTool, SharedApprovalPredicate, SharedHostedApproval,
    SharedTool, Tool, ToolApprovalPolicy, ToolContext, ToolDefinition, ToolOutcome, ToolResult,
};
pub use crate::usage::Usage;
