//! Tool call accordions shared by the streaming and history renderers.

use crate::dom::{Document, NodeId};
use crate::effects::{best_effort, Notifier, ToastLevel, ToolCallRemover};
use crate::render::accordion::{build_accordion, Accordion, AccordionKind};
use crate::render::images::create_image_element;
use crate::render::placeholders::{find_image_marker, strip_image_markers};
use crate::render::side_channel::{extract_side_channel, SideChannelBlock};
use crate::settings::RenderSettings;
use serde_json::Value;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

/// Ids of optimistic accordions created before the backend assigned a real id
pub const PENDING_ID_PREFIX: &str = "pending-";
pub const LOADING_CLASS: &str = "loading";
const TRUNCATION_MARKER: &str = "… (truncated)";

pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PENDING_ID_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolState {
    /// Placeholder without arguments yet
    Preparing,
    Running,
    Completed,
    Failed,
}

impl ToolState {
    pub fn label(&self, name: &str) -> String {
        match self {
            ToolState::Preparing => format!("Preparing: {name}"),
            ToolState::Running => format!("Running: {name}"),
            ToolState::Completed => format!("Completed: {name}"),
            ToolState::Failed => format!("Error: {name}"),
        }
    }

    fn is_loading(&self) -> bool {
        matches!(self, ToolState::Preparing | ToolState::Running)
    }
}

/// Handles into a tool accordion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolAccordion {
    pub accordion: Accordion,
    pub label: NodeId,
    pub spinner: Option<NodeId>,
}

/// Cut text to at most `cap` graphemes, marking the cut
pub fn truncate_for_display(text: &str, cap: usize) -> String {
    if text.graphemes(true).count() <= cap {
        return text.to_string();
    }
    let kept: String = text.graphemes(true).take(cap).collect();
    format!("{}\n{TRUNCATION_MARKER}", kept.trim_end())
}

/// Pretty-printed input arguments, or `None` when there is nothing to show
pub fn format_inputs(args: &Value, cap: usize) -> Option<String> {
    let empty = match args {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    };
    if empty {
        return None;
    }
    let pretty = match args {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    Some(format!("Input:\n{}", truncate_for_display(&pretty, cap)))
}

/// Accordion body text: the input echo followed by the result
pub fn tool_body_text(input_echo: Option<&str>, result: &str) -> String {
    let result = format!("Result:\n{result}");
    match input_echo {
        Some(echo) if !echo.is_empty() => format!("{echo}\n\n{result}"),
        _ => result,
    }
}

/// Display form of a tool result
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultView {
    /// Truncated text with image and side-channel markers removed
    pub text: String,
    /// Generated image referenced by the result, shown at the top of the body
    pub image_id: Option<String>,
    /// Only populated for successful results
    pub side_channel: Vec<SideChannelBlock>,
}

impl ToolResultView {
    pub fn new(settings: &RenderSettings, tool_name: &str, result: &str, is_error: bool) -> Self {
        let side = extract_side_channel(result);
        let image_id = find_image_marker(&side.text);
        let text = match image_id {
            Some(_) => strip_image_markers(&side.text).trim().to_string(),
            None => side.text,
        };
        Self {
            text: truncate_for_display(&text, settings.result_cap(tool_name)),
            image_id,
            side_channel: if is_error { Vec::new() } else { side.blocks },
        }
    }
}

/// Replace the accordion body with the input echo, the result and its image
pub fn fill_tool_body(
    doc: &mut Document,
    tool: &ToolAccordion,
    input_echo: Option<&str>,
    view: &ToolResultView,
    settings: &RenderSettings,
    notify_images: bool,
) {
    let body = tool.accordion.body;
    doc.set_text(body, &tool_body_text(input_echo, &view.text));
    if let Some(image_id) = &view.image_id {
        let img = create_image_element(doc, image_id, settings, notify_images);
        match doc.first_child(body) {
            Some(first) => doc.insert_before(body, img, first),
            None => doc.append_child(body, img),
        }
    }
}

/// Build a tool accordion. `id` is `None` for history entries that have no call id.
pub fn build_tool_accordion(
    doc: &mut Document,
    id: Option<&str>,
    name: &str,
    state: ToolState,
    body: &str,
) -> ToolAccordion {
    let accordion = build_accordion(doc, AccordionKind::Tool, "", body);
    doc.set_attribute(accordion.root, "data-tool-name", name);

    let label = doc.create_element_with_class("span", "tool-label");
    doc.append_child(accordion.summary, label);

    let mut tool = ToolAccordion {
        accordion,
        label,
        spinner: None,
    };
    if let Some(id) = id {
        assign_tool_id(doc, &tool, id);
    }
    set_tool_state(doc, &mut tool, name, state);
    tool
}

/// Point the accordion at a (new) id; real ids get a delete button
pub fn assign_tool_id(doc: &mut Document, tool: &ToolAccordion, id: &str) {
    doc.set_attribute(tool.accordion.root, "data-tool-id", id);
    if is_placeholder_id(id) {
        return;
    }
    let summary = tool.accordion.summary;
    match doc.find_by_class(summary, "tool-delete").first() {
        Some(button) => doc.set_attribute(*button, "data-tool-id", id),
        None => {
            let button = doc.create_element_with_class("button", "tool-delete");
            doc.set_attribute(button, "type", "button");
            doc.set_attribute(button, "data-tool-id", id);
            doc.set_attribute(button, "title", "Remove tool call");
            doc.set_text(button, "×");
            doc.append_child(summary, button);
        }
    }
}

pub fn set_tool_state(doc: &mut Document, tool: &mut ToolAccordion, name: &str, state: ToolState) {
    doc.set_text(tool.label, &state.label(name));
    let root = tool.accordion.root;

    if state.is_loading() {
        doc.add_class(root, LOADING_CLASS);
        if tool.spinner.is_none() {
            let spinner = doc.create_element_with_class("span", "spinner");
            doc.insert_before(tool.accordion.summary, spinner, tool.label);
            tool.spinner = Some(spinner);
        }
    } else {
        doc.remove_class(root, LOADING_CLASS);
        if let Some(spinner) = tool.spinner.take() {
            doc.remove(spinner);
        }
    }

    if state == ToolState::Failed {
        doc.add_class(root, "error");
    } else {
        doc.remove_class(root, "error");
    }
}

/// Id a delete click on this accordion refers to. Placeholders have none.
pub fn deletable_tool_id(doc: &Document, accordion_root: NodeId) -> Option<String> {
    let id = doc
        .attribute(accordion_root, "data-tool-id")
        .filter(|id| !is_placeholder_id(id))
        .map(str::to_string);
    if id.is_none() {
        debug!("Ignoring delete for tool accordion without a real id");
    }
    id
}

/// Delete-button click: ask the backend to forget the call.
///
/// Does not touch the document. On `true` the caller drops the accordion with
/// [`Document::remove`]; on failure the accordion stays and a toast is shown.
pub async fn delete_tool_call(
    tool_id: &str,
    remover: &dyn ToolCallRemover,
    notifier: &dyn Notifier,
) -> bool {
    match best_effort("Removing tool call", remover.remove_tool_call(tool_id).await) {
        Some(()) => {
            notifier.toast("Tool call removed", ToastLevel::Info);
            true
        }
        None => {
            notifier.toast("Failed to remove tool call", ToastLevel::Error);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::EffectError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_truncation_marks_cut() {
        assert_eq!(truncate_for_display("short", 10), "short");
        assert_eq!(
            truncate_for_display("abcdef", 3),
            format!("abc\n{TRUNCATION_MARKER}")
        );
        // Graphemes are never split
        assert_eq!(
            truncate_for_display("e\u{301}e\u{301}e\u{301}", 2),
            format!("e\u{301}e\u{301}\n{TRUNCATION_MARKER}")
        );
    }

    #[test]
    fn test_format_inputs() {
        assert_eq!(format_inputs(&json!({}), 100), None);
        assert_eq!(format_inputs(&Value::Null, 100), None);
        assert_eq!(
            format_inputs(&json!({"q": "x"}), 100).as_deref(),
            Some("Input:\n{\n  \"q\": \"x\"\n}")
        );
    }

    #[test]
    fn test_result_view_strips_markers() {
        let settings = RenderSettings {
            default_result_cap: 5,
            ..RenderSettings::default()
        };
        let view = ToolResultView::new(
            &settings,
            "generate_image",
            "[[image:abc]] Image ready <!--IMAGE_GALLERY:{\"images\":[]}-->",
            false,
        );
        assert_eq!(view.image_id.as_deref(), Some("abc"));
        assert_eq!(view.text, format!("Image\n{TRUNCATION_MARKER}"));
        assert_eq!(view.side_channel.len(), 1);

        let failed = ToolResultView::new(
            &settings,
            "x",
            "<!--IMAGE_GALLERY:{\"images\":[]}-->",
            true,
        );
        assert!(failed.side_channel.is_empty());
    }

    #[test]
    fn test_image_is_first_body_child() {
        let settings = RenderSettings::default();
        let mut doc = Document::new();
        let tool = build_tool_accordion(&mut doc, None, "gen", ToolState::Completed, "");
        let view = ToolResultView::new(&settings, "gen", "[[image:i1]]done", false);
        fill_tool_body(&mut doc, &tool, None, &view, &settings, false);

        let body = tool.accordion.body;
        let first = doc.first_child(body).unwrap();
        assert_eq!(doc.attribute(first, "data-image-id"), Some("i1"));
        assert_eq!(doc.text_content(body), "Result:\ndone");
    }

    #[test]
    fn test_body_text() {
        assert_eq!(tool_body_text(None, "ok"), "Result:\nok");
        assert_eq!(tool_body_text(Some("Input:\n1"), "ok"), "Input:\n1\n\nResult:\nok");
    }

    #[test]
    fn test_state_transitions() {
        let mut doc = Document::new();
        let mut tool = build_tool_accordion(&mut doc, Some("t1"), "search", ToolState::Running, "");
        let root = tool.accordion.root;
        assert!(doc.has_class(root, LOADING_CLASS));
        assert_eq!(doc.find_by_class(root, "spinner").len(), 1);
        assert_eq!(doc.find_by_class(root, "tool-delete").len(), 1);

        set_tool_state(&mut doc, &mut tool, "search", ToolState::Failed);
        assert!(!doc.has_class(root, LOADING_CLASS));
        assert!(doc.has_class(root, "error"));
        assert!(doc.find_by_class(root, "spinner").is_empty());
        assert_eq!(doc.text_content(tool.label), "Error: search");
    }

    #[test]
    fn test_placeholder_has_no_delete_button() {
        let mut doc = Document::new();
        let tool = build_tool_accordion(
            &mut doc,
            Some("pending-1"),
            "search",
            ToolState::Preparing,
            "",
        );
        assert!(doc.find_by_class(tool.accordion.root, "tool-delete").is_empty());
        assert_eq!(doc.text_content(tool.label), "Preparing: search");
    }

    struct Remover {
        fail: bool,
    }

    #[async_trait]
    impl ToolCallRemover for Remover {
        async fn remove_tool_call(&self, _tool_id: &str) -> Result<(), EffectError> {
            if self.fail {
                Err(EffectError::ToolRemoval("500".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct Toasts(Mutex<Vec<(String, ToastLevel)>>);

    impl Notifier for Toasts {
        fn toast(&self, message: &str, level: ToastLevel) {
            self.0.lock().unwrap().push((message.to_string(), level));
        }
    }

    fn attached_tool(doc: &mut Document, id: &str) -> ToolAccordion {
        let tool = build_tool_accordion(doc, Some(id), "search", ToolState::Completed, "");
        let root = doc.root();
        doc.append_child(root, tool.accordion.root);
        tool
    }

    #[tokio::test]
    async fn test_delete_removes_accordion() {
        let mut doc = Document::new();
        let tool = attached_tool(&mut doc, "t1");
        let toasts = Toasts::default();

        let tool_id = deletable_tool_id(&doc, tool.accordion.root).unwrap();
        assert_eq!(tool_id, "t1");
        let remover = Remover { fail: false };
        let removing = delete_tool_call(&tool_id, &remover, &toasts);
        // Other work can still reach the document while the request is pending
        let other = attached_tool(&mut doc, "t2");
        if removing.await {
            doc.remove(tool.accordion.root);
        }

        assert!(!doc.is_attached(tool.accordion.root));
        assert!(doc.is_attached(other.accordion.root));
        assert_eq!(
            toasts.0.lock().unwrap().as_slice(),
            [("Tool call removed".to_string(), ToastLevel::Info)]
        );
    }

    #[tokio::test]
    async fn test_delete_failure_toasts() {
        let mut doc = Document::new();
        let tool = attached_tool(&mut doc, "t1");
        let toasts = Toasts::default();

        let tool_id = deletable_tool_id(&doc, tool.accordion.root).unwrap();
        assert!(!delete_tool_call(&tool_id, &Remover { fail: true }, &toasts).await);
        assert!(doc.is_attached(tool.accordion.root));
        assert_eq!(toasts.0.lock().unwrap()[0].1, ToastLevel::Error);
    }

    #[test]
    fn test_placeholder_is_not_deletable() {
        let mut doc = Document::new();
        let tool = attached_tool(&mut doc, "pending-3");
        assert_eq!(deletable_tool_id(&doc, tool.accordion.root), None);
    }
}
