//! Placeholder substitution for spans the formatter must treat as opaque.
//!
//! Image markers and fenced code blocks are lifted out of the source text and
//! replaced with alphanumeric tokens that pass through escaping and inline
//! formatting untouched. After formatting, [`splice_placeholders`] swaps each
//! token in the generated markup for a real element.

use crate::dom::{Document, NodeId};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use tracing::debug;

/// Inline marker for a generated image, e.g. `[[image:a1b2c3]]`
pub const IMAGE_MARKER_PATTERN: &str = r"\[\[image:([A-Za-z0-9_-]+)\]\]";

fn image_marker_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(IMAGE_MARKER_PATTERN).expect("valid image marker regex"))
}

fn code_fence_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?s)```([A-Za-z0-9_+.#-]*)[ \t]*\r?\n(.*?)\r?\n?```")
            .expect("valid code fence regex")
    })
}

pub fn image_placeholder(index: usize) -> String {
    format!("IMGPLACEHOLDER{index}END")
}

pub fn code_placeholder(index: usize) -> String {
    format!("CODEBLOCKPLACEHOLDER{index}END")
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlaceholder {
    pub placeholder: String,
    pub image_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedImages {
    pub processed_text: String,
    pub images: Vec<ImagePlaceholder>,
}

/// Replace every image marker with a numbered placeholder token
pub fn extract_image_placeholders(text: &str) -> ExtractedImages {
    let mut images = Vec::new();
    let processed_text = image_marker_regex()
        .replace_all(text, |caps: &Captures| {
            let placeholder = image_placeholder(images.len());
            images.push(ImagePlaceholder {
                placeholder: placeholder.clone(),
                image_id: caps[1].to_string(),
            });
            placeholder
        })
        .into_owned();

    ExtractedImages {
        processed_text,
        images,
    }
}

/// First image id referenced by a marker, if any
pub fn find_image_marker(text: &str) -> Option<String> {
    image_marker_regex()
        .captures(text)
        .map(|caps| caps[1].to_string())
}

/// Remove all image markers from the text
pub fn strip_image_markers(text: &str) -> String {
    image_marker_regex().replace_all(text, "").into_owned()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeFence {
    pub placeholder: String,
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCode {
    pub processed_text: String,
    pub blocks: Vec<CodeFence>,
}

/// Replace every complete fenced code block with a numbered placeholder token
pub fn extract_code_fences(text: &str) -> ExtractedCode {
    let mut blocks = Vec::new();
    let processed_text = code_fence_regex()
        .replace_all(text, |caps: &Captures| {
            let placeholder = code_placeholder(blocks.len());
            blocks.push(CodeFence {
                placeholder: placeholder.clone(),
                language: caps[1].to_string(),
                code: caps[2].to_string(),
            });
            placeholder
        })
        .into_owned();

    ExtractedCode {
        processed_text,
        blocks,
    }
}

/// Put lifted fences back into `text` as fence source
pub fn restore_code_fences(text: &str, blocks: &[CodeFence]) -> String {
    blocks.iter().fold(text.to_string(), |text, block| {
        text.replace(
            &block.placeholder,
            &format!("```{}\n{}\n```", block.language, block.code),
        )
    })
}

/// Fill `parent` with `html`, putting each replacement element where its token sits.
///
/// Tokens that cannot be found are appended at the end so no element is lost.
pub fn splice_placeholders(
    doc: &mut Document,
    parent: NodeId,
    html: &str,
    replacements: &[(String, NodeId)],
) {
    let mut located: Vec<(usize, usize, NodeId)> = Vec::new();
    let mut missing = Vec::new();
    for (token, element) in replacements {
        match html.find(token.as_str()) {
            Some(position) => located.push((position, token.len(), *element)),
            None => missing.push(*element),
        }
    }
    located.sort_by_key(|(position, _, _)| *position);

    let mut children = Vec::new();
    let mut cursor = 0;
    for (position, length, element) in located {
        if position < cursor {
            continue;
        }
        if position > cursor {
            children.push(doc.create_html(&html[cursor..position]));
        }
        children.push(element);
        cursor = position + length;
    }
    if cursor < html.len() {
        children.push(doc.create_html(&html[cursor..]));
    }
    if !missing.is_empty() {
        debug!("{} placeholder(s) not found in markup", missing.len());
        children.extend(missing);
    }

    doc.replace_children(parent, &children);
}
