//! Generated image elements: creation, load retries and gallery grouping.

use crate::dom::{Document, NodeId, NodeKind};
use crate::settings::RenderSettings;
use std::time::Duration;
use tracing::{debug, warn};

pub const GENERATED_IMAGE_CLASS: &str = "generated-image";
pub const IMAGE_GALLERY_CLASS: &str = "image-gallery";

/// What the caller should do after an image load event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLoadOutcome {
    /// Image is displayed; `notify` requests the completion notification
    Loaded { notify: bool },
    /// Call [`on_image_error`] again if the reload issued now fails too
    RetryAfter(Duration),
    Failed,
}

/// Create an `<img>` for a generated image id.
///
/// `notify_on_load` is false for history renders so redrawing old messages
/// does not fire completion notifications (scroll-to-bottom and friends).
pub fn create_image_element(
    doc: &mut Document,
    image_id: &str,
    settings: &RenderSettings,
    notify_on_load: bool,
) -> NodeId {
    let img = doc.create_element_with_class("img", GENERATED_IMAGE_CLASS);
    doc.set_attribute(img, "src", &settings.image_url(image_id));
    doc.set_attribute(img, "alt", "Generated image");
    doc.set_attribute(img, "loading", "lazy");
    doc.set_attribute(img, "data-image-id", image_id);
    doc.set_attribute(img, "data-retries", "0");
    if !notify_on_load {
        doc.set_attribute(img, "data-history", "true");
    }
    img
}

/// Handle a failed load: re-issue the request or give up for good
pub fn on_image_error(doc: &mut Document, img: NodeId, settings: &RenderSettings) -> ImageLoadOutcome {
    let image_id = doc.attribute(img, "data-image-id").unwrap_or_default().to_string();
    let retries: u32 = doc
        .attribute(img, "data-retries")
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);

    if retries < settings.image_max_retries {
        let attempt = retries + 1;
        debug!("Retrying image {image_id} (attempt {attempt})");
        doc.set_attribute(img, "data-retries", &attempt.to_string());
        doc.set_attribute(
            img,
            "src",
            &format!("{}?retry={attempt}", settings.image_url(&image_id)),
        );
        return ImageLoadOutcome::RetryAfter(Duration::from_millis(settings.image_retry_delay_ms));
    }

    warn!("Image {image_id} failed to load after {retries} retries");
    doc.add_class(img, "image-failed");
    doc.remove_attribute(img, "src");
    doc.set_attribute(img, "alt", &format!("Image failed to load ({image_id})"));
    ImageLoadOutcome::Failed
}

pub fn on_image_load(doc: &mut Document, img: NodeId) -> ImageLoadOutcome {
    doc.add_class(img, "loaded");
    ImageLoadOutcome::Loaded {
        notify: doc.attribute(img, "data-history").is_none(),
    }
}

fn is_generated_image(doc: &Document, node: NodeId) -> bool {
    doc.has_class(node, GENERATED_IMAGE_CLASS) && !doc.has_class(node, "image-failed")
}

fn is_blank(doc: &Document, node: NodeId) -> bool {
    match doc.kind(node) {
        NodeKind::Text(text) => text.trim().is_empty(),
        NodeKind::Html(html) => html.trim().is_empty() || is_only_breaks(html),
        NodeKind::Element { .. } => false,
    }
}

fn is_only_breaks(html: &str) -> bool {
    html.replace("<br>", "").trim().is_empty()
}

/// Wrap every run of two or more adjacent generated images in a gallery element
pub fn group_adjacent_images(doc: &mut Document, root: NodeId) {
    let mut parents = vec![root];
    parents.extend(doc.descendants(root));

    for parent in parents {
        if doc.has_class(parent, IMAGE_GALLERY_CLASS) {
            continue;
        }

        let children = doc.children(parent).to_vec();
        let mut runs: Vec<Vec<NodeId>> = Vec::new();
        let mut current: Vec<NodeId> = Vec::new();
        for child in children {
            if is_generated_image(doc, child) {
                current.push(child);
            } else if !is_blank(doc, child) || current.is_empty() {
                if current.len() >= 2 {
                    runs.push(std::mem::take(&mut current));
                }
                current.clear();
            }
        }
        if current.len() >= 2 {
            runs.push(current);
        }

        for run in runs {
            let gallery = doc.create_element_with_class("div", IMAGE_GALLERY_CLASS);
            doc.insert_before(parent, gallery, run[0]);
            for img in run {
                doc.append_child(gallery, img);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_then_fails() {
        let settings = RenderSettings {
            image_max_retries: 2,
            image_retry_delay_ms: 10,
            ..RenderSettings::default()
        };
        let mut doc = Document::new();
        let img = create_image_element(&mut doc, "abc", &settings, true);
        assert_eq!(doc.attribute(img, "src"), Some("/api/images/abc"));

        assert_eq!(
            on_image_error(&mut doc, img, &settings),
            ImageLoadOutcome::RetryAfter(Duration::from_millis(10))
        );
        assert_eq!(doc.attribute(img, "src"), Some("/api/images/abc?retry=1"));
        assert_eq!(
            on_image_error(&mut doc, img, &settings),
            ImageLoadOutcome::RetryAfter(Duration::from_millis(10))
        );
        assert_eq!(on_image_error(&mut doc, img, &settings), ImageLoadOutcome::Failed);
        assert!(doc.has_class(img, "image-failed"));
        assert_eq!(doc.attribute(img, "alt"), Some("Image failed to load (abc)"));
    }

    #[test]
    fn test_history_images_do_not_notify() {
        let settings = RenderSettings::default();
        let mut doc = Document::new();
        let live = create_image_element(&mut doc, "a", &settings, true);
        let history = create_image_element(&mut doc, "b", &settings, false);
        assert_eq!(
            on_image_load(&mut doc, live),
            ImageLoadOutcome::Loaded { notify: true }
        );
        assert_eq!(
            on_image_load(&mut doc, history),
            ImageLoadOutcome::Loaded { notify: false }
        );
    }

    #[test]
    fn test_adjacent_images_grouped() {
        let settings = RenderSettings::default();
        let mut doc = Document::new();
        let root = doc.root();
        let a = create_image_element(&mut doc, "a", &settings, true);
        let gap = doc.create_html("<br>");
        let b = create_image_element(&mut doc, "b", &settings, true);
        let text = doc.create_html("text");
        let c = create_image_element(&mut doc, "c", &settings, true);
        for node in [a, gap, b, text, c] {
            doc.append_child(root, node);
        }

        group_adjacent_images(&mut doc, root);

        let galleries = doc.find_by_class(root, IMAGE_GALLERY_CLASS);
        assert_eq!(galleries.len(), 1);
        assert_eq!(doc.children(galleries[0]), &[a, b]);
        assert_eq!(doc.parent(c), Some(root));
    }
}
