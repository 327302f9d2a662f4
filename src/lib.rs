//! Incremental rendering of streamed chat output into an element tree.
//!
//! [`streaming::StreamRenderer`] renders a message while it streams in;
//! [`history::HistoryRenderer`] renders stored messages in one pass. Both
//! share the markdown formatter and element builders in [`render`].

pub mod dom;
pub mod effects;
pub mod error;
pub mod history;
pub mod logging;
pub mod recording;
pub mod render;
pub mod settings;
pub mod streaming;

pub use dom::{Document, NodeId};
pub use error::RenderError;
pub use history::{ChatMessage, HistoryRenderer, MessagePart};
pub use settings::RenderSettings;
pub use streaming::{StreamRenderer, ToolEvent};
