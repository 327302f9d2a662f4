//! One-shot rendering of complete messages (page load, scrollback).

use crate::dom::{Document, NodeId};
use crate::effects::Highlighter;
use crate::render::accordion::{build_accordion, AccordionKind};
use crate::render::images::group_adjacent_images;
use crate::render::placeholders::{extract_code_fences, restore_code_fences};
use crate::render::side_channel::render_side_channel_after;
use crate::render::tool::{
    build_tool_accordion, fill_tool_body, format_inputs, ToolResultView, ToolState,
};
use crate::render::{render_prose, ProseOptions};
use crate::settings::RenderSettings;
use crate::streaming::tags::{
    find_earliest, is_premature_close, ThinkKind, ALL_THINK_CLOSERS, SEED_BUDGET_REFLECT_CLOSE,
    SEED_THINK_CLOSE, THINK_OPENERS,
};
use crate::streaming::PARAGRAPH_CLASS;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// A stored chat message: plain text or an ordered list of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatMessage {
    Text(String),
    Structured { parts: Vec<MessagePart> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Content {
        text: String,
    },
    ToolResult {
        name: String,
        #[serde(default)]
        inputs: Value,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Prose(String),
    Think { kind: ThinkKind, text: String },
}

/// Split complete message text into prose and thinking spans
fn split_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = text;

    // Closing tags before any opener: everything up to the last of them is thinking
    let first_open = find_earliest(rest, &THINK_OPENERS).map_or(rest.len(), |(position, _)| position);
    let last_orphan = ALL_THINK_CLOSERS
        .iter()
        .filter_map(|closer| rest[..first_open].rfind(closer).map(|position| (position, *closer)))
        .max_by_key(|(position, _)| *position);
    if let Some((position, closer)) = last_orphan {
        debug!("Treating text before orphan {closer} as thinking");
        let kind = if closer == SEED_THINK_CLOSE || closer == SEED_BUDGET_REFLECT_CLOSE {
            ThinkKind::Seed
        } else {
            ThinkKind::Standard
        };
        let mut think = rest[..position].to_string();
        for closer in ALL_THINK_CLOSERS {
            think = think.replace(closer, "\n");
        }
        segments.push(Segment::Think { kind, text: think });
        rest = &rest[position + closer.len()..];
    }

    loop {
        let Some((open, opener)) = find_earliest(rest, &THINK_OPENERS) else {
            segments.push(Segment::Prose(rest.to_string()));
            break;
        };
        segments.push(Segment::Prose(rest[..open].to_string()));

        let kind = ThinkKind::from_opener(THINK_OPENERS[opener]);
        let mut inner = &rest[open + THINK_OPENERS[opener].len()..];
        let mut think = String::new();
        loop {
            match find_earliest(inner, kind.closers()) {
                Some((close, closer)) => {
                    let closer = kind.closers()[closer];
                    think.push_str(&inner[..close]);
                    inner = &inner[close + closer.len()..];
                    if is_premature_close(inner, kind) {
                        think.push('\n');
                        continue;
                    }
                    break;
                }
                None => {
                    think.push_str(inner);
                    inner = "";
                    break;
                }
            }
        }
        segments.push(Segment::Think { kind, text: think });
        rest = inner;
    }

    segments.retain(|segment| match segment {
        Segment::Prose(text) => !text.trim().is_empty(),
        Segment::Think { .. } => true,
    });
    segments
}

pub struct HistoryRenderer {
    settings: Arc<RenderSettings>,
    highlighter: Option<Arc<dyn Highlighter>>,
}

impl HistoryRenderer {
    pub fn new(settings: Arc<RenderSettings>) -> Self {
        Self {
            settings,
            highlighter: None,
        }
    }

    pub fn with_highlighter(mut self, highlighter: Arc<dyn Highlighter>) -> Self {
        self.highlighter = Some(highlighter);
        self
    }

    /// Replace the children of `element` with the rendered message.
    ///
    /// `is_history_render` suppresses image load notifications.
    pub fn parse_content(
        &self,
        doc: &mut Document,
        element: NodeId,
        message: &ChatMessage,
        is_history_render: bool,
    ) {
        doc.replace_children(element, &[]);
        match message {
            ChatMessage::Text(text) => self.render_text(doc, element, text, is_history_render),
            ChatMessage::Structured { parts } => {
                for part in parts {
                    match part {
                        MessagePart::Content { text } => {
                            self.render_text(doc, element, text, is_history_render)
                        }
                        MessagePart::ToolResult {
                            name,
                            inputs,
                            content,
                            is_error,
                        } => self.render_tool_result(
                            doc,
                            element,
                            name,
                            inputs,
                            content,
                            *is_error,
                            is_history_render,
                        ),
                    }
                }
            }
        }
        group_adjacent_images(doc, element);
    }

    fn render_text(&self, doc: &mut Document, element: NodeId, text: &str, is_history_render: bool) {
        // Think tags inside a complete fence are code, not markup
        let lifted = extract_code_fences(text);
        for segment in split_segments(&lifted.processed_text) {
            match segment {
                Segment::Prose(prose) => {
                    let prose = restore_code_fences(&prose, &lifted.blocks);
                    let paragraph = doc.create_element_with_class("div", PARAGRAPH_CLASS);
                    render_prose(
                        doc,
                        paragraph,
                        prose.trim(),
                        ProseOptions {
                            settings: &self.settings,
                            highlighter: self.highlighter.as_deref(),
                            extract_code: true,
                            notify_images: !is_history_render,
                        },
                    );
                    doc.append_child(element, paragraph);
                }
                Segment::Think { kind, text } => {
                    let text = restore_code_fences(&text, &lifted.blocks);
                    let step = next_think_step(doc, element);
                    trace!("Rendering {kind:?} think block, step {step}");
                    let think = build_accordion(doc, AccordionKind::Think, &kind.title(step), text.trim());
                    doc.append_child(element, think.root);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_tool_result(
        &self,
        doc: &mut Document,
        element: NodeId,
        name: &str,
        inputs: &Value,
        content: &str,
        is_error: bool,
        is_history_render: bool,
    ) {
        let state = if is_error {
            ToolState::Failed
        } else {
            ToolState::Completed
        };
        let tool = build_tool_accordion(doc, None, name, state, "");
        let echo = format_inputs(inputs, self.settings.input_echo_cap);
        let view = ToolResultView::new(&self.settings, name, content, is_error);
        fill_tool_body(
            doc,
            &tool,
            echo.as_deref(),
            &view,
            &self.settings,
            !is_history_render,
        );
        doc.append_child(element, tool.accordion.root);
        render_side_channel_after(doc, tool.accordion.root, &view.side_channel);
    }
}

/// Step number for the next thinking accordion rendered into `element`
fn next_think_step(doc: &Document, element: NodeId) -> u64 {
    let class = AccordionKind::Think.class();
    let mut count = doc.find_by_class(doc.root(), class).len();
    if !doc.is_attached(element) {
        count += doc.find_by_class(element, class).len();
    }
    count as u64 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::code_block::CODE_BLOCK_CLASS;
    use crate::streaming::test_utils::StreamFixture;
    use serde_json::json;

    fn render(message: &ChatMessage) -> (Document, NodeId) {
        let mut doc = Document::new();
        let element = doc.create_element_with_class("div", "message");
        let root = doc.root();
        doc.append_child(root, element);
        HistoryRenderer::new(Arc::new(RenderSettings::default()))
            .parse_content(&mut doc, element, message, true);
        (doc, element)
    }

    fn thinks(doc: &Document, element: NodeId) -> Vec<(String, String)> {
        doc.find_by_class(element, AccordionKind::Think.class())
            .into_iter()
            .map(|think| {
                let summary = doc.find_by_class(think, "accordion-summary")[0];
                let body = doc.find_by_class(think, "accordion-content")[0];
                (doc.text_content(summary), doc.text_content(body))
            })
            .collect()
    }

    fn paragraphs(doc: &Document, element: NodeId) -> Vec<String> {
        doc.find_by_class(element, PARAGRAPH_CLASS)
            .into_iter()
            .map(|paragraph| doc.text_content(paragraph))
            .collect()
    }

    #[test]
    fn test_split_segments() {
        assert_eq!(
            split_segments("Hi <think>a</think> there"),
            vec![
                Segment::Prose("Hi ".to_string()),
                Segment::Think {
                    kind: ThinkKind::Standard,
                    text: "a".to_string()
                },
                Segment::Prose(" there".to_string()),
            ]
        );
        assert_eq!(
            split_segments("<seed:think>unfinished"),
            vec![Segment::Think {
                kind: ThinkKind::Seed,
                text: "unfinished".to_string()
            }]
        );
    }

    #[test]
    fn test_think_and_code() {
        let (doc, element) = render(&ChatMessage::Text(
            "<think>plan</think>Here:\n```rs\nfn a() {}\n```\nDone".to_string(),
        ));
        assert_eq!(
            thinks(&doc, element),
            vec![("Think (Step 1)".to_string(), "plan".to_string())]
        );
        let blocks = doc.find_by_class(element, CODE_BLOCK_CLASS);
        assert_eq!(blocks.len(), 1);
        let code = doc.find_by_tag(blocks[0], "code")[0];
        assert_eq!(doc.text_content(code), "fn a() {}");
        assert_eq!(doc.find_by_class(blocks[0], "copy-button").len(), 1);
        assert!(paragraphs(&doc, element)[0].contains("Done"));
    }

    #[test]
    fn test_think_tags_inside_fence_stay_code() {
        let text = "Example:\n```html\n<think>x</think>\n```\ndone";
        let (doc, element) = render(&ChatMessage::Text(text.to_string()));

        let mut fixture = StreamFixture::new();
        let streamed = fixture.stream(text, 3);

        for (doc, root) in [(&doc, element), (&fixture.doc, streamed)] {
            assert!(thinks(doc, root).is_empty());
            let blocks = doc.find_by_class(root, CODE_BLOCK_CLASS);
            assert_eq!(blocks.len(), 1);
            let code = doc.find_by_tag(blocks[0], "code")[0];
            assert!(doc.has_class(code, "language-html"));
            assert_eq!(doc.text_content(code), "<think>x</think>");
            let visible = doc.text_content(root);
            assert!(visible.contains("Example:"));
            assert!(visible.contains("done"));
        }
    }

    #[test]
    fn test_orphan_close_tag() {
        let (doc, element) = render(&ChatMessage::Text(
            "first thought</think>more</think>\n\nAnswer".to_string(),
        ));
        assert_eq!(
            thinks(&doc, element),
            vec![(
                "Think (Step 1)".to_string(),
                "first thought\nmore".to_string()
            )]
        );
        assert_eq!(paragraphs(&doc, element), vec!["Answer"]);
    }

    #[test]
    fn test_seed_premature_close() {
        let (doc, element) = render(&ChatMessage::Text(
            "<seed:think>A</think>B</seed:think>C".to_string(),
        ));
        assert_eq!(
            thinks(&doc, element),
            vec![("Seed Think (Step 1)".to_string(), "A\nB".to_string())]
        );
        assert_eq!(paragraphs(&doc, element), vec!["C"]);
    }

    #[test]
    fn test_numbering_follows_document() {
        let mut doc = Document::new();
        let root = doc.root();
        let earlier = build_accordion(&mut doc, AccordionKind::Think, "Think (Step 1)", "x");
        doc.append_child(root, earlier.root);
        let element = doc.create_element("div");
        doc.append_child(root, element);

        let message = ChatMessage::Text("<think>b</think>mid<think>c</think>".to_string());
        HistoryRenderer::new(Arc::new(RenderSettings::default()))
            .parse_content(&mut doc, element, &message, true);

        let titles: Vec<String> = thinks(&doc, element).into_iter().map(|(title, _)| title).collect();
        assert_eq!(titles, vec!["Think (Step 2)", "Think (Step 3)"]);
    }

    #[test]
    fn test_tool_result_with_image() {
        let message = ChatMessage::Structured {
            parts: vec![
                MessagePart::Content {
                    text: "Drawing it".to_string(),
                },
                MessagePart::ToolResult {
                    name: "generate_image".to_string(),
                    inputs: json!({"prompt": "cat"}),
                    content: "[[image:abc]] Generated".to_string(),
                    is_error: false,
                },
            ],
        };
        let (doc, element) = render(&message);

        let tools = doc.find_by_class(element, AccordionKind::Tool.class());
        assert_eq!(tools.len(), 1);
        assert!(!doc.has_class(tools[0], "loading"));
        let body = doc.find_by_class(tools[0], "accordion-content")[0];
        let image = doc.first_child(body).unwrap();
        assert_eq!(doc.attribute(image, "data-image-id"), Some("abc"));
        assert_eq!(doc.attribute(image, "data-history"), Some("true"));
        assert_eq!(
            doc.text_content(body),
            "Input:\n{\n  \"prompt\": \"cat\"\n}\n\nResult:\nGenerated"
        );
        // Parts keep their order
        assert!(doc.has_class(doc.children(element)[0], PARAGRAPH_CLASS));
    }

    #[test]
    fn test_result_cap_depends_on_tool() {
        let long = "word ".repeat(200);
        let message = ChatMessage::Structured {
            parts: vec![
                MessagePart::ToolResult {
                    name: "calculator".to_string(),
                    inputs: Value::Null,
                    content: long.clone(),
                    is_error: false,
                },
                MessagePart::ToolResult {
                    name: "web_search".to_string(),
                    inputs: Value::Null,
                    content: long,
                    is_error: false,
                },
            ],
        };
        let (doc, element) = render(&message);
        let bodies: Vec<String> = doc
            .find_by_class(element, "accordion-content")
            .into_iter()
            .map(|body| doc.text_content(body))
            .collect();
        assert!(bodies[0].ends_with("… (truncated)"));
        assert!(!bodies[1].contains("truncated"));
    }

    #[test]
    fn test_rerender_replaces_children() {
        let mut doc = Document::new();
        let element = doc.create_element("div");
        let renderer = HistoryRenderer::new(Arc::new(RenderSettings::default()));
        renderer.parse_content(&mut doc, element, &ChatMessage::Text("one".into()), false);
        renderer.parse_content(&mut doc, element, &ChatMessage::Text("two".into()), false);
        assert_eq!(paragraphs(&doc, element), vec!["two"]);
    }

    #[test]
    fn test_message_deserialization() {
        let text: ChatMessage = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(text, ChatMessage::Text("hello".to_string()));

        let structured: ChatMessage = serde_json::from_value(json!({
            "parts": [
                {"type": "content", "text": "hi"},
                {"type": "tool_result", "name": "search", "content": "ok"}
            ]
        }))
        .unwrap();
        let ChatMessage::Structured { parts } = structured else {
            panic!("expected structured message");
        };
        assert_eq!(
            parts[1],
            MessagePart::ToolResult {
                name: "search".to_string(),
                inputs: Value::Null,
                content: "ok".to_string(),
                is_error: false,
            }
        );
    }
}
