//! Shared helpers for the streaming tests

use super::{RenderEvent, StreamAssembler, StreamRenderer};
use crate::dom::{Document, NodeId};
use crate::settings::RenderSettings;
use std::sync::Arc;

/// Helper function to split text into small chunks for testing tag handling
pub fn chunk_str(s: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect()
}

// Merge a new event into the last one if both carry text of the same kind
fn merge_events(last: &mut RenderEvent, new: &RenderEvent) -> bool {
    match (last, new) {
        (RenderEvent::ProseText(last_text), RenderEvent::ProseText(new_text))
        | (RenderEvent::ThinkText(last_text), RenderEvent::ThinkText(new_text))
        | (RenderEvent::CodeText(last_text), RenderEvent::CodeText(new_text)) => {
            last_text.push_str(new_text);
            true
        }
        _ => false,
    }
}

/// Feed all chunks and finish, returning the events with adjacent text merged
pub fn assemble_chunks<S: AsRef<str>>(assembler: &mut StreamAssembler, chunks: &[S]) -> Vec<RenderEvent> {
    let mut raw = Vec::new();
    for chunk in chunks {
        raw.extend(assembler.push(chunk.as_ref()));
    }
    raw.extend(assembler.finish());

    let mut merged: Vec<RenderEvent> = Vec::new();
    for event in raw {
        if let Some(last) = merged.last_mut() {
            if merge_events(last, &event) {
                continue;
            }
        }
        merged.push(event);
    }
    merged
}

pub fn assemble_text(text: &str, chunk_size: usize) -> Vec<RenderEvent> {
    let mut assembler = StreamAssembler::new(0);
    assemble_chunks(&mut assembler, &chunk_str(text, chunk_size))
}

/// Helper function to print events for debugging
#[allow(dead_code)]
pub fn print_events(events: &[RenderEvent]) {
    println!("Collected {} events:", events.len());
    for (i, event) in events.iter().enumerate() {
        println!("  [{i}] {event:?}");
    }
}

/// A document with a chat container and a renderer ready to stream into it
pub struct StreamFixture {
    pub doc: Document,
    pub container: NodeId,
    pub message: NodeId,
    pub renderer: StreamRenderer,
}

impl StreamFixture {
    pub fn new() -> Self {
        Self::with_settings(RenderSettings::default())
    }

    pub fn with_settings(settings: RenderSettings) -> Self {
        let mut doc = Document::new();
        let container = doc.create_element_with_class("div", "chat-container");
        let root = doc.root();
        doc.append_child(root, container);
        let message = doc.create_element_with_class("div", "message");
        Self {
            doc,
            container,
            message,
            renderer: StreamRenderer::new(Arc::new(settings)),
        }
    }

    pub fn start(&mut self) -> NodeId {
        self.renderer
            .start_streaming(&mut self.doc, self.container, self.message)
            .expect("no stream active")
    }

    pub fn append(&mut self, chunk: &str) {
        self.renderer
            .append_stream(&mut self.doc, chunk)
            .expect("stream active");
    }

    /// Stream `text` in chunks of `chunk_size` characters and finish
    pub fn stream(&mut self, text: &str, chunk_size: usize) -> NodeId {
        let content = self.start();
        for chunk in chunk_str(text, chunk_size) {
            self.append(&chunk);
        }
        self.renderer.finish_streaming(&mut self.doc);
        content
    }

    /// Render `text` in a fresh fixture and return the content markup
    pub fn render_html(text: &str, chunk_size: usize) -> String {
        let mut fixture = Self::new();
        let content = fixture.stream(text, chunk_size);
        fixture.doc.inner_html(content)
    }
}
