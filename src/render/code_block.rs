use crate::dom::{Document, NodeId};
use crate::effects::{best_effort, Clipboard, Highlighter};
use crate::settings::RenderSettings;
use std::time::Duration;
use tracing::trace;

pub const CODE_BLOCK_CLASS: &str = "code-block";
const COPY_LABEL: &str = "Copy";

/// Handles into a code block element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBlockNodes {
    pub root: NodeId,
    pub header: NodeId,
    pub code: NodeId,
    /// "Generating…" indicator, replaced by the copy button once finalized
    pub status: Option<NodeId>,
}

/// Build a code block that still receives content: raw text, no highlighting
pub fn build_streaming_code_block(doc: &mut Document, language: &str) -> CodeBlockNodes {
    let root = doc.create_element_with_class("div", CODE_BLOCK_CLASS);
    doc.add_class(root, "streaming");

    let header = doc.create_element_with_class("div", "code-header");
    let label = doc.create_element_with_class("span", "code-language");
    doc.set_text(label, if language.is_empty() { "text" } else { language });
    doc.append_child(header, label);
    let status = doc.create_element_with_class("span", "code-status");
    doc.set_text(status, "Generating…");
    doc.append_child(header, status);
    doc.append_child(root, header);

    let pre = doc.create_element("pre");
    let code = doc.create_element("code");
    if !language.is_empty() {
        doc.add_class(code, &format!("language-{language}"));
    }
    doc.append_child(pre, code);
    doc.append_child(root, pre);

    CodeBlockNodes {
        root,
        header,
        code,
        status: Some(status),
    }
}

/// Set the final content, highlight it if possible and attach the copy button
pub fn finalize_code_block(
    doc: &mut Document,
    nodes: &mut CodeBlockNodes,
    language: &str,
    code: &str,
    highlighter: Option<&dyn Highlighter>,
) {
    let highlighted = highlighter
        .and_then(|h| best_effort("Syntax highlighting", h.highlight(language, code)));
    match highlighted {
        Some(html) => {
            doc.set_html(nodes.code, &html);
            doc.add_class(nodes.code, "highlighted");
        }
        None => doc.set_text(nodes.code, code),
    }

    if let Some(status) = nodes.status.take() {
        doc.remove(status);
    }
    let button = doc.create_element_with_class("button", "copy-button");
    doc.set_attribute(button, "type", "button");
    doc.set_text(button, COPY_LABEL);
    doc.append_child(nodes.header, button);

    doc.remove_class(nodes.root, "streaming");
    trace!("Finalized code block ({language}, {} bytes)", code.len());
}

/// Build a finished code block in one go (history rendering)
pub fn build_code_block(
    doc: &mut Document,
    language: &str,
    code: &str,
    highlighter: Option<&dyn Highlighter>,
) -> NodeId {
    let mut nodes = build_streaming_code_block(doc, language);
    finalize_code_block(doc, &mut nodes, language, code, highlighter);
    nodes.root
}

/// Code the copy button of a block puts on the clipboard
pub fn copy_source(doc: &Document, button: NodeId) -> Option<String> {
    let block = doc.closest_with_class(button, CODE_BLOCK_CLASS)?;
    let code = doc
        .find_by_tag(block, "code")
        .first()
        .map(|code| doc.text_content(*code))
        .unwrap_or_default();
    Some(code)
}

/// Copy-button click: write `code` to the clipboard. Returns whether it succeeded.
///
/// Takes no document, so deltas keep flowing while the clipboard is busy.
/// Show the outcome with [`show_copy_result`] afterwards.
pub async fn copy_code(clipboard: &dyn Clipboard, code: &str) -> bool {
    best_effort("Copy to clipboard", clipboard.write_text(code).await).is_some()
}

/// Label the button "Copied!" or "Failed".
///
/// Returns how long the caller should wait before [`reset_copy_label`].
pub fn show_copy_result(
    doc: &mut Document,
    button: NodeId,
    copied: bool,
    settings: &RenderSettings,
) -> Duration {
    doc.set_text(button, if copied { "Copied!" } else { "Failed" });
    Duration::from_millis(settings.copy_feedback_ms)
}

pub fn reset_copy_label(doc: &mut Document, button: NodeId) {
    doc.set_text(button, COPY_LABEL);
}
