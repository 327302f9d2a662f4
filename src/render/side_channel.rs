//! Galleries and category grids embedded in tool results as HTML comments.
//!
//! A tool can append e.g. `<!--IMAGE_GALLERY:{"images":["https://…"]}-->` to its
//! result and the renderer shows the images below the tool's accordion.

use crate::dom::{Document, NodeId};
use crate::render::formatter::is_safe_url;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::warn;

fn marker_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?s)<!--\s*(IMAGE_GALLERY|GALLERY_LISTINGS|CATEGORY_GRID):(.*?)-->")
            .expect("valid side channel regex")
    })
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Gallery {
    #[serde(default)]
    pub title: Option<String>,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Listing {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Listings {
    pub listings: Vec<Listing>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CategoryGrid {
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SideChannelBlock {
    Gallery(Gallery),
    Listings(Listings),
    Categories(CategoryGrid),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SideChannel {
    /// Result text with every marker removed
    pub text: String,
    pub blocks: Vec<SideChannelBlock>,
}

/// Split recognized markers out of a tool result. Malformed payloads are logged and dropped.
pub fn extract_side_channel(result: &str) -> SideChannel {
    let mut blocks = Vec::new();
    for caps in marker_regex().captures_iter(result) {
        let payload = caps[2].trim();
        let parsed = match &caps[1] {
            "IMAGE_GALLERY" => serde_json::from_str(payload).map(SideChannelBlock::Gallery),
            "GALLERY_LISTINGS" => serde_json::from_str(payload).map(SideChannelBlock::Listings),
            _ => serde_json::from_str(payload).map(SideChannelBlock::Categories),
        };
        match parsed {
            Ok(block) => blocks.push(block),
            Err(err) => warn!("Ignoring malformed {} marker: {err}", &caps[1]),
        }
    }

    SideChannel {
        text: marker_regex().replace_all(result, "").trim().to_string(),
        blocks,
    }
}

fn append_image(doc: &mut Document, parent: NodeId, url: &str, alt: &str) {
    if !is_safe_url(url) {
        warn!("Dropping image with unsupported URL");
        return;
    }
    let img = doc.create_element("img");
    doc.set_attribute(img, "src", url);
    doc.set_attribute(img, "alt", alt);
    doc.set_attribute(img, "loading", "lazy");
    doc.append_child(parent, img);
}

/// Build the element for one block; the caller places it after the tool accordion
pub fn render_side_channel_block(doc: &mut Document, block: &SideChannelBlock) -> NodeId {
    match block {
        SideChannelBlock::Gallery(gallery) => {
            let root = doc.create_element_with_class("div", "tool-gallery");
            if let Some(title) = &gallery.title {
                let heading = doc.create_element_with_class("div", "tool-gallery-title");
                doc.set_text(heading, title);
                doc.append_child(root, heading);
            }
            for url in &gallery.images {
                append_image(doc, root, url, "Gallery image");
            }
            root
        }
        SideChannelBlock::Listings(listings) => {
            let root = doc.create_element_with_class("div", "tool-listings");
            for listing in &listings.listings {
                let item = doc.create_element_with_class("div", "tool-listing");
                let name = match listing.url.as_deref().filter(|url| is_safe_url(url)) {
                    Some(url) => {
                        let link = doc.create_element("a");
                        doc.set_attribute(link, "href", url);
                        doc.set_attribute(link, "target", "_blank");
                        link
                    }
                    None => doc.create_element("span"),
                };
                doc.add_class(name, "tool-listing-name");
                doc.set_text(name, &listing.name);
                doc.append_child(item, name);
                for url in &listing.images {
                    append_image(doc, item, url, &listing.name);
                }
                doc.append_child(root, item);
            }
            root
        }
        SideChannelBlock::Categories(grid) => {
            let root = doc.create_element_with_class("div", "tool-category-grid");
            for category in &grid.categories {
                let cell = doc.create_element_with_class("div", "tool-category");
                if let Some(image) = &category.image {
                    append_image(doc, cell, image, &category.name);
                }
                let label = doc.create_element_with_class("span", "tool-category-name");
                let text = match category.count {
                    Some(count) => format!("{} ({count})", category.name),
                    None => category.name.clone(),
                };
                doc.set_text(label, &text);
                doc.append_child(cell, label);
                doc.append_child(root, cell);
            }
            root
        }
    }
}

/// Render every block right after `anchor`, keeping their order
pub fn render_side_channel_after(doc: &mut Document, anchor: NodeId, blocks: &[SideChannelBlock]) {
    let mut previous = anchor;
    for block in blocks {
        let element = render_side_channel_block(doc, block);
        if doc.insert_after(previous, element) {
            previous = element;
        }
    }
}
