use crate::dom::{Document, NodeId};

/// Marks a thinking accordion whose content is still arriving
pub const STREAMING_CLASS: &str = "streaming";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccordionKind {
    Think,
    Tool,
}

impl AccordionKind {
    pub fn class(&self) -> &'static str {
        match self {
            AccordionKind::Think => "think-accordion",
            AccordionKind::Tool => "tool-accordion",
        }
    }
}

/// Handles into a collapsible disclosure element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accordion {
    pub root: NodeId,
    pub summary: NodeId,
    pub body: NodeId,
}

/// Build a closed `<details>` element with a summary and a text body.
///
/// The body is later mutated in place as content streams in.
pub fn build_accordion(
    doc: &mut Document,
    kind: AccordionKind,
    title: &str,
    initial_body: &str,
) -> Accordion {
    let root = doc.create_element_with_class("details", "accordion");
    doc.add_class(root, kind.class());

    let summary = doc.create_element_with_class("summary", "accordion-summary");
    doc.set_text(summary, title);
    doc.append_child(root, summary);

    let body = doc.create_element_with_class("div", "accordion-content");
    doc.set_text(body, initial_body);
    doc.append_child(root, body);

    Accordion {
        root,
        summary,
        body,
    }
}
