//! Computer-control boundary.
//!
//! A [`Computer`] is one shared, stateful target device (a browser, a VM, a
//! desktop). The engine dispatches [`ComputerAction`]s against it strictly
//! sequentially and captures a screenshot after every action; per-action
//! failures are tolerated and recorded as empty screenshots.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::tool::ToolResult;

/// A point on the device screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate in pixels.
    pub x: i32,
    /// Vertical coordinate in pixels.
    pub y: i32,
}

/// Mouse button for click actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    /// The primary button.
    #[default]
    Left,
    /// The secondary button.
    Right,
    /// The scroll wheel button.
    Wheel,
}

/// One computer-control action requested by the model.
///
/// A closed sum type: every consumption site matches exhaustively, so adding
/// an action kind is a compile-time-checked change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComputerAction {
    /// Click at a position.
    Click {
        /// Horizontal coordinate.
        x: i32,
        /// Vertical coordinate.
        y: i32,
        /// Button to press.
        #[serde(default)]
        button: MouseButton,
    },
    /// Double-click at a position.
    DoubleClick {
        /// Horizontal coordinate.
        x: i32,
        /// Vertical coordinate.
        y: i32,
    },
    /// Drag the cursor along a path.
    Drag {
        /// The points to drag through, in order.
        path: Vec<Position>,
    },
    /// Press a key combination.
    Keypress {
        /// Keys to press together.
        keys: Vec<String>,
    },
    /// Move the cursor to a position.
    Move {
        /// Horizontal coordinate.
        x: i32,
        /// Vertical coordinate.
        y: i32,
    },
    /// Capture a screenshot without acting.
    Screenshot,
    /// Scroll at a position.
    Scroll {
        /// Horizontal coordinate of the scroll origin.
        x: i32,
        /// Vertical coordinate of the scroll origin.
        y: i32,
        /// Horizontal scroll delta.
        scroll_x: i32,
        /// Vertical scroll delta.
        scroll_y: i32,
    },
    /// Type text.
    Type {
        /// The text to type.
        text: String,
    },
    /// Wait for the device to settle.
    Wait,
}

/// A controllable device the model can drive.
///
/// Implementations own one stateful target; the engine never issues two
/// actions against the same computer concurrently.
#[async_trait]
pub trait Computer: Send + Sync {
    /// Name the computer surface is registered under in tool schemas.
    fn name(&self) -> &str {
        "computer"
    }

    /// Screen dimensions as `(width, height)` in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Click at a position.
    async fn click(&self, x: i32, y: i32, button: MouseButton) -> ToolResult<()>;

    /// Double-click at a position.
    async fn double_click(&self, x: i32, y: i32) -> ToolResult<()>;

    /// Drag the cursor along a path.
    async fn drag(&self, path: &[Position]) -> ToolResult<()>;

    /// Press a key combination.
    async fn keypress(&self, keys: &[String]) -> ToolResult<()>;

    /// Move the cursor to a position.
    async fn move_cursor(&self, x: i32, y: i32) -> ToolResult<()>;

    /// Scroll at a position.
    async fn scroll(&self, x: i32, y: i32, scroll_x: i32, scroll_y: i32) -> ToolResult<()>;

    /// Type text.
    async fn type_text(&self, text: &str) -> ToolResult<()>;

    /// Wait for the device to settle.
    async fn wait(&self) -> ToolResult<()>;

    /// Capture the current screen as base64-encoded image data.
    async fn screenshot(&self) -> ToolResult<String>;
}

/// A shared, reference-counted computer.
pub type SharedComputer = Arc<dyn Computer>;

/// Dispatch one action against a computer.
///
/// # Errors
///
/// Propagates the failure of the underlying device operation; the caller
/// decides whether to tolerate it.
pub async fn perform(computer: &dyn Computer, action: &ComputerAction) -> ToolResult<()> {
    match action {
        ComputerAction::Click { x, y, button } => computer.click(*x, *y, *button).await,
        ComputerAction::DoubleClick { x, y } => computer.double_click(*x, *y).await,
        ComputerAction::Drag { path } => computer.drag(path).await,
        ComputerAction::Keypress { keys } => computer.keypress(keys).await,
        ComputerAction::Move { x, y } => computer.move_cursor(*x, *y).await,
        ComputerAction::Screenshot => Ok(()),
        ComputerAction::Scroll {
            x,
            y,
            scroll_x,
            scroll_y,
        } => computer.scroll(*x, *y, *scroll_x, *scroll_y).await,
        ComputerAction::Type { text } => computer.type_text(text).await,
        ComputerAction::Wait => computer.wait().await,
    }
}

/// Returns the action kind as a short label for logs.
#[must_use]
pub(crate) fn action_label(action: &ComputerAction) -> &'static str {
    match action {
        ComputerAction::Click { .. } => "click",
        ComputerAction::DoubleClick { .. } => "double_click",
        ComputerAction::Drag { .. } => "drag",
        ComputerAction::Keypress { .. } => "keypress",
        ComputerAction::Move { .. } => "move",
        ComputerAction::Screenshot => "screenshot",
        ComputerAction::Scroll { .. } => "scroll",
        ComputerAction::Type { .. } => "type",
        ComputerAction::Wait => "wait",
    }
}
