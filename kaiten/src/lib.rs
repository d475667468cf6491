//! Kaiten - a turn-resolution engine for multi-step AI agent workflows
//!
//! Given a configured agent (instructions, tools, handoff targets, output
//! shape) and a model response, kaiten decides what happens next: run a tool,
//! hand control to another agent, suspend for an approval decision, or finish
//! with a final answer. Runs can suspend mid-turn for hours or days and
//! resume exactly where they stopped, without duplicating side effects or
//! persisted history.
//!
//! ```rust,ignore
//! use kaiten::prelude::*;
//!
//! let agent = Arc::new(
//!     Agent::new("assistant")
//!         .instructions("Answer weather questions.")
//!         .provider(provider)
//!         .tool(Arc::new(LookupTool)),
//! );
//! let result = Runner::run(&agent, "Weather in Paris?", RunConfig::default()).await?;
//! ```

pub mod agent;
pub mod computer;
pub mod error;
pub mod handoff;
pub mod items;
pub mod model;
pub mod prelude;
pub mod run;
pub mod session;
pub mod tool;
pub mod usage;

pub use error::{Error, ModelBehaviorError, Result, ToolError};
