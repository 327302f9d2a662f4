//! Optional external collaborators and the single convention for their failures.
//!
//! Highlighting, clipboard access and tool-call deletion may all fail without
//! affecting the rest of a render. Callers route every such result through
//! [`best_effort`].

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffectError {
    #[error("Highlighting failed: {0}")]
    Highlight(String),
    #[error("Clipboard write failed: {0}")]
    Clipboard(String),
    #[error("Tool call removal failed: {0}")]
    ToolRemoval(String),
}

/// Syntax highlighter producing markup for a code block
pub trait Highlighter: Send + Sync {
    fn highlight(&self, language: &str, code: &str) -> Result<String, EffectError>;
}

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write_text(&self, text: &str) -> Result<(), EffectError>;
}

/// Backend endpoint deleting a recorded tool call
#[async_trait]
pub trait ToolCallRemover: Send + Sync {
    async fn remove_tool_call(&self, tool_id: &str) -> Result<(), EffectError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Error,
}

/// Transient user-facing notification
pub trait Notifier: Send + Sync {
    fn toast(&self, message: &str, level: ToastLevel);
}

/// Log a failed side effect and turn it into `None`
pub fn best_effort<T>(what: &str, result: Result<T, EffectError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("{what}: {err}");
            None
        }
    }
}
