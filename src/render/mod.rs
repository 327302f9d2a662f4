//! Building blocks shared by the streaming and history renderers.

pub mod accordion;
pub mod code_block;
pub mod formatter;
pub mod images;
pub mod placeholders;
pub mod side_channel;
pub mod tool;

use crate::dom::{Document, NodeId};
use crate::effects::Highlighter;
use crate::settings::RenderSettings;
use code_block::build_code_block;
use formatter::format_markdown;
use images::{create_image_element, GENERATED_IMAGE_CLASS};
use placeholders::{extract_code_fences, extract_image_placeholders, splice_placeholders};

/// How a block of prose is turned into elements
#[derive(Clone, Copy)]
pub struct ProseOptions<'a> {
    pub settings: &'a RenderSettings,
    pub highlighter: Option<&'a dyn Highlighter>,
    /// Lift complete fenced code blocks out of the text (history rendering)
    pub extract_code: bool,
    pub notify_images: bool,
}

/// Format markdown `source` into `target`, replacing its previous children.
///
/// Images already rendered into `target` are reused for the same id, so a
/// paragraph re-rendered on every delta keeps its elements and their load state.
pub fn render_prose(doc: &mut Document, target: NodeId, source: &str, options: ProseOptions<'_>) {
    let mut previous_images: Vec<NodeId> = doc
        .children(target)
        .iter()
        .copied()
        .filter(|child| doc.has_class(*child, GENERATED_IMAGE_CLASS))
        .collect();
    let mut replacements = Vec::new();
    let mut text = source.to_string();

    if options.extract_code {
        let extracted = extract_code_fences(&text);
        for block in extracted.blocks {
            let element = build_code_block(doc, &block.language, &block.code, options.highlighter);
            replacements.push((block.placeholder, element));
        }
        text = extracted.processed_text;
    }

    let extracted = extract_image_placeholders(&text);
    for image in extracted.images {
        let reused = previous_images
            .iter()
            .position(|img| doc.attribute(*img, "data-image-id") == Some(image.image_id.as_str()))
            .map(|index| previous_images.remove(index));
        let element = reused.unwrap_or_else(|| {
            create_image_element(doc, &image.image_id, options.settings, options.notify_images)
        });
        replacements.push((image.placeholder, element));
    }

    let html = format_markdown(&extracted.processed_text);
    if replacements.is_empty() {
        doc.set_html(target, &html);
    } else {
        splice_placeholders(doc, target, &html, &replacements);
    }
}
