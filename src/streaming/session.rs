//! Caller-owned streaming session: one message at a time.

use super::{DomRenderer, RenderEvent, StreamAssembler, ToolEvent};
use crate::dom::{Document, NodeId};
use crate::effects::Highlighter;
use crate::error::RenderError;
use crate::render::accordion::AccordionKind;
use crate::settings::RenderSettings;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

pub const MESSAGE_CONTENT_CLASS: &str = "message-content";
/// Marks the message element while its content is arriving
pub const STREAMING_MESSAGE_CLASS: &str = "is-streaming";

struct StreamSession {
    assembler: StreamAssembler,
    renderer: DomRenderer,
}

struct ActiveStream {
    container: NodeId,
    message: NodeId,
    content: NodeId,
    /// Created by the first delta; tool events arriving earlier are queued
    session: Option<StreamSession>,
}

pub struct StreamRenderer {
    settings: Arc<RenderSettings>,
    highlighter: Option<Arc<dyn Highlighter>>,
    active: Option<ActiveStream>,
    pending_tool_events: Vec<ToolEvent>,
}

impl StreamRenderer {
    pub fn new(settings: Arc<RenderSettings>) -> Self {
        Self {
            settings,
            highlighter: None,
            active: None,
            pending_tool_events: Vec::new(),
        }
    }

    pub fn with_highlighter(mut self, highlighter: Arc<dyn Highlighter>) -> Self {
        self.highlighter = Some(highlighter);
        self
    }

    /// Begin streaming into `message`, attaching it to `container` if needed.
    ///
    /// Returns the content element that receives the rendered output.
    pub fn start_streaming(
        &mut self,
        doc: &mut Document,
        container: NodeId,
        message: NodeId,
    ) -> Result<NodeId, RenderError> {
        if self.active.is_some() {
            return Err(RenderError::StreamAlreadyActive);
        }

        doc.add_class(message, STREAMING_MESSAGE_CLASS);
        let content = doc.create_element_with_class("div", MESSAGE_CONTENT_CLASS);
        doc.append_child(message, content);
        if doc.parent(message) != Some(container) {
            doc.append_child(container, message);
        }

        trace!("Stream started");
        self.active = Some(ActiveStream {
            container,
            message,
            content,
            session: None,
        });
        Ok(content)
    }

    pub fn append_stream(&mut self, doc: &mut Document, chunk: &str) -> Result<(), RenderError> {
        let session = self.ensure_session(doc)?;
        for event in session.assembler.push(chunk) {
            session.renderer.apply(doc, event);
        }
        Ok(())
    }

    /// Show a tool call. Returns false if the event was queued for later.
    pub fn start_tool(&mut self, doc: &mut Document, id: &str, name: &str, args: Value) -> bool {
        self.dispatch_tool_event(
            doc,
            ToolEvent::Start {
                id: id.to_string(),
                name: name.to_string(),
                args,
            },
        )
    }

    /// Show a tool result. Returns false if the event was queued for later.
    pub fn end_tool(
        &mut self,
        doc: &mut Document,
        id: &str,
        name: &str,
        result: &str,
        is_error: bool,
    ) -> bool {
        self.dispatch_tool_event(
            doc,
            ToolEvent::End {
                id: id.to_string(),
                name: name.to_string(),
                result: result.to_string(),
                is_error,
            },
        )
    }

    pub fn dispatch_tool_event(&mut self, doc: &mut Document, event: ToolEvent) -> bool {
        match self.active.as_mut().and_then(|active| active.session.as_mut()) {
            Some(session) => {
                session.renderer.apply(doc, event.into());
                true
            }
            None => {
                debug!("Queueing tool event until the stream produces content");
                self.pending_tool_events.push(event);
                false
            }
        }
    }

    /// Flush held-back text, clean up leftovers and end the stream
    pub fn finish_streaming(&mut self, doc: &mut Document) {
        let has_pending = !self.pending_tool_events.is_empty();
        let needs_session = self
            .active
            .as_ref()
            .is_some_and(|active| active.session.is_none());
        if has_pending && needs_session {
            // Tool events may be all this message ever received
            if let Err(err) = self.ensure_session(doc) {
                debug!("Could not apply queued tool events: {err}");
            }
        }

        let Some(mut active) = self.active.take() else {
            debug!("finish_streaming called without an active stream");
            self.pending_tool_events.clear();
            return;
        };

        if let Some(session) = active.session.as_mut() {
            for event in session.assembler.finish() {
                session.renderer.apply(doc, event);
            }
            session.renderer.finalize(doc);
        }
        doc.remove_class(active.message, STREAMING_MESSAGE_CLASS);
        self.pending_tool_events.clear();
        trace!("Stream finished");
    }

    /// Drop the in-progress message entirely
    pub fn cancel_streaming(&mut self, doc: &mut Document) {
        if let Some(active) = self.active.take() {
            doc.remove(active.message);
            trace!("Stream cancelled");
        }
        self.pending_tool_events.clear();
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    pub fn has_visible_content(&self, doc: &Document) -> bool {
        self.active
            .as_ref()
            .and_then(|active| active.session.as_ref())
            .is_some_and(|session| session.renderer.has_visible_content(doc))
    }

    pub fn content(&self) -> Option<NodeId> {
        self.active.as_ref().map(|active| active.content)
    }

    pub fn message(&self) -> Option<NodeId> {
        self.active.as_ref().map(|active| active.message)
    }

    pub fn assembler(&self) -> Option<&StreamAssembler> {
        self.active
            .as_ref()
            .and_then(|active| active.session.as_ref())
            .map(|session| &session.assembler)
    }

    pub fn pending_tool_events(&self) -> &[ToolEvent] {
        &self.pending_tool_events
    }

    fn ensure_session(&mut self, doc: &mut Document) -> Result<&mut StreamSession, RenderError> {
        let active = self.active.as_mut().ok_or(RenderError::NotStreaming)?;

        if active.session.is_none() {
            let think_steps = doc
                .find_by_class(active.container, AccordionKind::Think.class())
                .len() as u64;
            trace!("Initializing stream session after {think_steps} think step(s)");

            let mut renderer = DomRenderer::new(
                doc,
                active.content,
                self.settings.clone(),
                self.highlighter.clone(),
            );
            for event in self.pending_tool_events.drain(..) {
                renderer.apply(doc, RenderEvent::from(event));
            }
            active.session = Some(StreamSession {
                assembler: StreamAssembler::new(think_steps),
                renderer,
            });
        }

        active.session.as_mut().ok_or(RenderError::NotStreaming)
    }
}
