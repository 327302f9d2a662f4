//! Incremental rendering of an assistant message while it streams in.
//!
//! Text deltas go through [`StreamAssembler`], a pure state machine that emits
//! [`RenderEvent`]s. Tool lifecycle events are turned into render events
//! directly. [`DomRenderer`] applies both kinds to the element tree, and
//! [`StreamRenderer`] ties them together behind the caller-facing API.

mod assembler;
mod dom_renderer;
mod lexer;
mod session;
pub mod tags;

#[cfg(test)]
pub(crate) mod test_utils;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use assembler::{Mode, StreamAssembler};
pub use dom_renderer::{DomRenderer, PARAGRAPH_CLASS};
pub use lexer::{scan, Scan};
pub use session::{StreamRenderer, MESSAGE_CONTENT_CLASS, STREAMING_MESSAGE_CLASS};
pub use tags::ThinkKind;

/// A single change to apply to the message being rendered
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// Prose to add to the current paragraph's markdown source
    ProseText(String),
    /// Start a new paragraph for the prose that follows
    OpenParagraph,
    OpenThink { kind: ThinkKind, step: u64 },
    /// Raw thinking text appended to the open thinking span
    ThinkText(String),
    CloseThink,
    OpenCode { language: String },
    /// Raw code appended to the live preview
    CodeText(String),
    /// The fence closed; `code` is the final block content
    CloseCode { language: String, code: String },
    OpenTool { id: String, name: String, args: Value },
    CloseTool {
        id: String,
        name: String,
        result: String,
        is_error: bool,
    },
}

/// Tool lifecycle notification delivered out of band with the text stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolEvent {
    Start {
        id: String,
        name: String,
        #[serde(default)]
        args: Value,
    },
    End {
        id: String,
        name: String,
        result: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl From<ToolEvent> for RenderEvent {
    fn from(event: ToolEvent) -> Self {
        match event {
            ToolEvent::Start { id, name, args } => RenderEvent::OpenTool { id, name, args },
            ToolEvent::End {
                id,
                name,
                result,
                is_error,
            } => RenderEvent::CloseTool {
                id,
                name,
                result,
                is_error,
            },
        }
    }
}
