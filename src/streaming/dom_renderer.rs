//! Applies [`RenderEvent`]s to the element tree of the streaming message.

use super::RenderEvent;
use crate::dom::{Document, NodeId};
use crate::effects::Highlighter;
use crate::render::accordion::{build_accordion, Accordion, AccordionKind, STREAMING_CLASS};
use crate::render::code_block::{build_streaming_code_block, finalize_code_block, CodeBlockNodes};
use crate::render::images::group_adjacent_images;
use crate::render::side_channel::render_side_channel_after;
use crate::render::tool::{
    assign_tool_id, build_tool_accordion, fill_tool_body, format_inputs, is_placeholder_id,
    set_tool_state, ToolAccordion, ToolResultView, ToolState,
};
use crate::render::{render_prose, ProseOptions};
use crate::settings::RenderSettings;
use crate::streaming::ThinkKind;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

pub const PARAGRAPH_CLASS: &str = "message-paragraph";

struct ToolEntry {
    tool: ToolAccordion,
    name: String,
    state: ToolState,
    input_echo: Option<String>,
}

impl ToolEntry {
    fn is_finished(&self) -> bool {
        matches!(self.state, ToolState::Completed | ToolState::Failed)
    }
}

struct OpenCode {
    nodes: CodeBlockNodes,
    language: String,
    buffer: String,
}

pub struct DomRenderer {
    content: NodeId,
    settings: Arc<RenderSettings>,
    highlighter: Option<Arc<dyn Highlighter>>,
    paragraph: Option<NodeId>,
    paragraph_buffer: String,
    think: Option<Accordion>,
    think_buffer: String,
    code: Option<OpenCode>,
    /// Tool accordions of this message, keyed by call id
    tools: IndexMap<String, ToolEntry>,
}

impl DomRenderer {
    pub fn new(
        doc: &mut Document,
        content: NodeId,
        settings: Arc<RenderSettings>,
        highlighter: Option<Arc<dyn Highlighter>>,
    ) -> Self {
        let mut renderer = Self {
            content,
            settings,
            highlighter,
            paragraph: None,
            paragraph_buffer: String::new(),
            think: None,
            think_buffer: String::new(),
            code: None,
            tools: IndexMap::new(),
        };
        renderer.open_paragraph(doc);
        renderer
    }

    pub fn content(&self) -> NodeId {
        self.content
    }

    pub fn current_paragraph(&self) -> Option<NodeId> {
        self.paragraph
    }

    /// Element of the tool accordion registered under `id`
    pub fn tool_element(&self, id: &str) -> Option<NodeId> {
        self.tools.get(id).map(|entry| entry.tool.accordion.root)
    }

    pub fn apply(&mut self, doc: &mut Document, event: RenderEvent) {
        match event {
            RenderEvent::ProseText(text) => self.append_prose(doc, &text),
            RenderEvent::OpenParagraph => {
                self.discard_empty_paragraph(doc);
                self.open_paragraph(doc);
            }
            RenderEvent::OpenThink { kind, step } => self.open_think(doc, kind, step),
            RenderEvent::ThinkText(text) => {
                self.think_buffer.push_str(&text);
                if let Some(think) = &self.think {
                    doc.set_text(think.body, &self.think_buffer);
                }
            }
            RenderEvent::CloseThink => {
                if let Some(think) = self.think.take() {
                    doc.remove_class(think.root, STREAMING_CLASS);
                }
                self.think_buffer.clear();
            }
            RenderEvent::OpenCode { language } => {
                self.discard_empty_paragraph(doc);
                let nodes = build_streaming_code_block(doc, &language);
                doc.append_child(self.content, nodes.root);
                self.code = Some(OpenCode {
                    nodes,
                    language,
                    buffer: String::new(),
                });
            }
            RenderEvent::CodeText(text) => {
                if let Some(code) = &mut self.code {
                    code.buffer.push_str(&text);
                    doc.set_text(code.nodes.code, &code.buffer);
                }
            }
            RenderEvent::CloseCode { language, code } => {
                let Some(mut open) = self.code.take() else {
                    debug!("Code block closed without an open block");
                    return;
                };
                finalize_code_block(
                    doc,
                    &mut open.nodes,
                    &language,
                    &code,
                    self.highlighter.as_deref(),
                );
            }
            RenderEvent::OpenTool { id, name, args } => self.start_tool(doc, id, name, &args),
            RenderEvent::CloseTool {
                id,
                name,
                result,
                is_error,
            } => self.end_tool(doc, id, name, &result, is_error),
        }
    }

    fn prose_options(&self) -> ProseOptions<'_> {
        ProseOptions {
            settings: &self.settings,
            highlighter: self.highlighter.as_deref(),
            extract_code: false,
            notify_images: true,
        }
    }

    fn append_prose(&mut self, doc: &mut Document, text: &str) {
        let text = if self.paragraph_buffer.is_empty() {
            text.trim_start()
        } else {
            text
        };
        if text.is_empty() {
            return;
        }
        let paragraph = match self.paragraph {
            Some(paragraph) => paragraph,
            None => self.open_paragraph(doc),
        };
        self.paragraph_buffer.push_str(text);
        render_prose(doc, paragraph, &self.paragraph_buffer, self.prose_options());
    }

    fn open_paragraph(&mut self, doc: &mut Document) -> NodeId {
        let paragraph = doc.create_element_with_class("div", PARAGRAPH_CLASS);
        doc.append_child(self.content, paragraph);
        self.paragraph = Some(paragraph);
        self.paragraph_buffer.clear();
        paragraph
    }

    fn paragraph_is_empty(&self, doc: &Document, paragraph: NodeId) -> bool {
        self.paragraph_buffer.trim().is_empty() && !doc.has_content(paragraph)
    }

    fn discard_empty_paragraph(&mut self, doc: &mut Document) {
        if let Some(paragraph) = self.paragraph {
            if self.paragraph_is_empty(doc, paragraph) {
                doc.remove(paragraph);
                self.paragraph = None;
                self.paragraph_buffer.clear();
            }
        }
    }

    fn open_think(&mut self, doc: &mut Document, kind: ThinkKind, step: u64) {
        self.discard_empty_paragraph(doc);
        let think = build_accordion(doc, AccordionKind::Think, &kind.title(step), "");
        doc.add_class(think.root, STREAMING_CLASS);
        doc.append_child(self.content, think.root);
        self.think = Some(think);
        self.think_buffer.clear();
    }

    fn start_tool(&mut self, doc: &mut Document, id: String, name: String, args: &Value) {
        let input_echo = format_inputs(args, self.settings.input_echo_cap);

        if let Some(entry) = self.tools.get_mut(&id) {
            trace!("Refreshing inputs of tool {id}");
            if input_echo.is_some() {
                entry.input_echo = input_echo;
            }
            if !entry.is_finished() {
                if entry.state == ToolState::Preparing && entry.input_echo.is_some() {
                    entry.state = ToolState::Running;
                    set_tool_state(doc, &mut entry.tool, &name, ToolState::Running);
                }
                doc.set_text(
                    entry.tool.accordion.body,
                    entry.input_echo.as_deref().unwrap_or_default(),
                );
            }
            return;
        }

        if !is_placeholder_id(&id) {
            if let Some(pending) = self.find_pending(&name) {
                if let Some(mut entry) = self.tools.shift_remove(&pending) {
                    debug!("Upgrading tool accordion {pending} to {id}");
                    assign_tool_id(doc, &entry.tool, &id);
                    entry.state = ToolState::Running;
                    set_tool_state(doc, &mut entry.tool, &name, ToolState::Running);
                    if input_echo.is_some() {
                        entry.input_echo = input_echo;
                    }
                    doc.set_text(
                        entry.tool.accordion.body,
                        entry.input_echo.as_deref().unwrap_or_default(),
                    );
                    self.tools.insert(id, entry);
                    return;
                }
            }
        }

        self.discard_empty_paragraph(doc);
        let state = if is_placeholder_id(&id) && input_echo.is_none() {
            ToolState::Preparing
        } else {
            ToolState::Running
        };
        trace!("Opening tool accordion {id} ({name})");
        let tool = build_tool_accordion(
            doc,
            Some(&id),
            &name,
            state,
            input_echo.as_deref().unwrap_or_default(),
        );
        doc.append_child(self.content, tool.accordion.root);
        self.tools.insert(
            id,
            ToolEntry {
                tool,
                name,
                state,
                input_echo,
            },
        );
        self.open_paragraph(doc);
    }

    /// Unfinished optimistic accordion for a tool of the given name
    fn find_pending(&self, name: &str) -> Option<String> {
        self.tools
            .iter()
            .find(|(id, entry)| is_placeholder_id(id) && entry.name == name && !entry.is_finished())
            .map(|(id, _)| id.clone())
    }

    fn end_tool(&mut self, doc: &mut Document, id: String, name: String, result: &str, is_error: bool) {
        let state = if is_error {
            ToolState::Failed
        } else {
            ToolState::Completed
        };
        let view = ToolResultView::new(&self.settings, &name, result, is_error);

        if !self.tools.contains_key(&id) {
            debug!("Result for unknown tool call {id}, creating its accordion now");
            let tool = build_tool_accordion(doc, Some(&id), &name, state, "");
            match self.paragraph.filter(|p| doc.is_attached(*p)) {
                Some(paragraph) => doc.insert_before(self.content, tool.accordion.root, paragraph),
                None => doc.append_child(self.content, tool.accordion.root),
            }
            self.tools.insert(
                id.clone(),
                ToolEntry {
                    tool,
                    name: name.clone(),
                    state,
                    input_echo: None,
                },
            );
        }

        let Some(entry) = self.tools.get_mut(&id) else {
            return;
        };
        entry.state = state;
        set_tool_state(doc, &mut entry.tool, &name, state);
        fill_tool_body(
            doc,
            &entry.tool,
            entry.input_echo.as_deref(),
            &view,
            &self.settings,
            true,
        );
        render_side_channel_after(doc, entry.tool.accordion.root, &view.side_channel);
    }

    /// Sweep what the stream left behind
    pub fn finalize(&mut self, doc: &mut Document) {
        for paragraph in doc.find_by_class(self.content, PARAGRAPH_CLASS) {
            if !doc.has_content(paragraph) {
                doc.remove(paragraph);
            }
        }
        self.paragraph = None;
        self.paragraph_buffer.clear();

        for think in doc.find_by_class(self.content, AccordionKind::Think.class()) {
            doc.remove_class(think, STREAMING_CLASS);
        }
        self.think = None;
        self.think_buffer.clear();

        for (id, entry) in self.tools.iter() {
            if !entry.is_finished() {
                debug!("Removing tool accordion {id} that never finished");
                doc.remove(entry.tool.accordion.root);
            }
        }
        self.tools.retain(|_, entry| entry.is_finished());

        group_adjacent_images(doc, self.content);
    }

    /// Whether any prose, thinking or code text is visible or pending
    pub fn has_visible_content(&self, doc: &Document) -> bool {
        let pending = [&self.paragraph_buffer, &self.think_buffer]
            .into_iter()
            .any(|buffer| !buffer.trim().is_empty())
            || self
                .code
                .as_ref()
                .is_some_and(|code| !code.buffer.trim().is_empty());
        pending
            || doc
                .find_by_class(self.content, PARAGRAPH_CLASS)
                .into_iter()
                .any(|paragraph| !doc.text_content(paragraph).trim().is_empty())
    }
}
