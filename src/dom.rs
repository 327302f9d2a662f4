//! Minimal in-memory element tree that the renderers build into.
//!
//! Nodes live in an arena owned by [`Document`] and are addressed by [`NodeId`].
//! Removing an element only detaches it from its parent, so handles stay valid
//! and can be re-inserted elsewhere. Text and markup leaves belong to their
//! parent: replacing a node's content rewrites them in place or recycles their
//! slots, so re-rendering a growing paragraph keeps the arena bounded.

use indexmap::IndexMap;

/// Elements that never have children and serialize without a closing tag
const VOID_ELEMENTS: [&str; 5] = ["br", "hr", "img", "input", "meta"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub enum NodeKind {
    Element {
        tag: String,
        classes: Vec<String>,
        attributes: IndexMap<String, String>,
    },
    /// Literal text, escaped on serialization
    Text(String),
    /// Pre-rendered markup, serialized verbatim
    Html(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    /// Recycled leaf slots
    free: Vec<NodeId>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
        };
        doc.root = doc.create_element("body");
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let node = Node {
            kind,
            parent: None,
            children: Vec::new(),
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.0] = node;
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Number of live nodes, attached or not
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Bytes held by text and markup leaves of live nodes
    pub fn retained_text_bytes(&self) -> usize {
        self.nodes
            .iter()
            .map(|node| match &node.kind {
                NodeKind::Text(text) | NodeKind::Html(text) => text.len(),
                NodeKind::Element { .. } => 0,
            })
            .sum()
    }

    /// Hand a detached leaf's slot back to the arena. Elements are never recycled.
    fn release_leaf(&mut self, node: NodeId) {
        let slot = &mut self.nodes[node.0];
        if slot.parent.is_some() || matches!(slot.kind, NodeKind::Element { .. }) {
            return;
        }
        slot.kind = NodeKind::Text(String::new());
        self.free.push(node);
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_string(),
            classes: Vec::new(),
            attributes: IndexMap::new(),
        })
    }

    /// Shorthand for an element with a single class
    pub fn create_element_with_class(&mut self, tag: &str, class: &str) -> NodeId {
        let id = self.create_element(tag);
        self.add_class(id, class);
        id
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    pub fn create_html(&mut self, html: &str) -> NodeId {
        self.push(NodeKind::Html(html.to_string()))
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.children(node).first().copied()
    }

    fn index_in_parent(&self, node: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(node)?;
        let index = self.children(parent).iter().position(|c| *c == node)?;
        Some((parent, index))
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let (parent, index) = self.index_in_parent(node)?;
        self.children(parent).get(index + 1).copied()
    }

    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let (parent, index) = self.index_in_parent(node)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    /// Detach a node from its parent. The node and its subtree stay usable.
    pub fn remove(&mut self, node: NodeId) {
        if let Some((parent, index)) = self.index_in_parent(node) {
            self.nodes[parent.0].children.remove(index);
        }
        self.nodes[node.0].parent = None;
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.remove(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Insert `child` right before `reference` under `reference`'s parent.
    /// Falls back to appending when `reference` is detached.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.remove(child);
        let position = self
            .children(parent)
            .iter()
            .position(|c| *c == reference)
            .unwrap_or(self.children(parent).len());
        self.nodes[parent.0].children.insert(position, child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Insert `child` right after `reference`. Returns false if `reference` is detached.
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) -> bool {
        self.remove(child);
        match self.index_in_parent(reference) {
            Some((parent, index)) => {
                self.nodes[parent.0].children.insert(index + 1, child);
                self.nodes[child.0].parent = Some(parent);
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Ancestor (or the node itself) carrying the given class
    pub fn closest_with_class(&self, node: NodeId, class: &str) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if self.has_class(id, class) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if let NodeKind::Element { classes, .. } = &mut self.nodes[node.0].kind {
            if !classes.iter().any(|c| c == class) {
                classes.push(class.to_string());
            }
        }
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if let NodeKind::Element { classes, .. } = &mut self.nodes[node.0].kind {
            classes.retain(|c| c != class);
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        match &self.nodes[node.0].kind {
            NodeKind::Element { classes, .. } => classes.iter().any(|c| c == class),
            _ => false,
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[node.0].kind {
            attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[node.0].kind {
            attributes.shift_remove(name);
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    /// Detach all children, recycling leaves that are not in `keep`
    fn clear_children(&mut self, node: NodeId, keep: &[NodeId]) {
        let children = std::mem::take(&mut self.nodes[node.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
            if !keep.contains(&child) {
                self.release_leaf(child);
            }
        }
    }

    /// The node's sole child, if it is a leaf of the same flavor as `markup`
    fn sole_leaf(&self, node: NodeId, markup: bool) -> Option<NodeId> {
        match self.children(node) {
            [child] => match (&self.nodes[child.0].kind, markup) {
                (NodeKind::Text(_), false) | (NodeKind::Html(_), true) => Some(*child),
                _ => None,
            },
            _ => None,
        }
    }

    fn replace_leaf(&mut self, node: NodeId, content: &str, markup: bool) {
        if !content.is_empty() {
            if let Some(child) = self.sole_leaf(node, markup) {
                if let NodeKind::Text(existing) | NodeKind::Html(existing) =
                    &mut self.nodes[child.0].kind
                {
                    existing.clear();
                    existing.push_str(content);
                }
                return;
            }
        }

        self.clear_children(node, &[]);
        if !content.is_empty() {
            let child = if markup {
                self.create_html(content)
            } else {
                self.create_text(content)
            };
            self.append_child(node, child);
        }
    }

    /// Replace all children with a single text node (`textContent =`)
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        self.replace_leaf(node, text, false);
    }

    /// Replace all children with a markup fragment (`innerHTML =`)
    pub fn set_html(&mut self, node: NodeId, html: &str) {
        self.replace_leaf(node, html, true);
    }

    /// Replace all children with the given nodes, in order
    pub fn replace_children(&mut self, node: NodeId, children: &[NodeId]) {
        self.clear_children(node, children);
        for child in children {
            self.append_child(node, *child);
        }
    }

    /// Visible text of a subtree. Markup fragments are reduced to their text.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Html(html) => out.push_str(&strip_tags(html)),
            NodeKind::Element { .. } => {
                for child in self.children(node) {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// True if the node holds non-whitespace text or any element
    pub fn has_content(&self, node: NodeId) -> bool {
        self.children(node).iter().any(|child| match self.kind(*child) {
            NodeKind::Element { .. } => true,
            NodeKind::Text(text) => !text.trim().is_empty(),
            NodeKind::Html(html) => !html.trim().is_empty(),
        })
    }

    /// Pre-order descendants, excluding the node itself
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn find_by_class(&self, node: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(node)
            .into_iter()
            .filter(|id| self.has_class(*id, class))
            .collect()
    }

    pub fn find_by_tag(&self, node: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(node)
            .into_iter()
            .filter(|id| self.tag(*id) == Some(tag))
            .collect()
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_html(*child, &mut out);
        }
        out
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => out.push_str(&html_escape::encode_text(text)),
            NodeKind::Html(html) => out.push_str(html),
            NodeKind::Element {
                tag,
                classes,
                attributes,
            } => {
                out.push('<');
                out.push_str(tag);
                if !classes.is_empty() {
                    out.push_str(&format!(
                        " class=\"{}\"",
                        html_escape::encode_double_quoted_attribute(&classes.join(" "))
                    ));
                }
                for (name, value) in attributes {
                    if value.is_empty() {
                        out.push_str(&format!(" {name}"));
                    } else {
                        out.push_str(&format!(
                            " {name}=\"{}\"",
                            html_escape::encode_double_quoted_attribute(value)
                        ));
                    }
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for child in self.children(node) {
                    self.write_html(*child, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
        }
    }
}

/// Text of a markup fragment: tags dropped, `<br>` kept as a newline
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => {
                let tag = &rest[start..start + end + 1];
                if tag.starts_with("<br") {
                    out.push('\n');
                }
                rest = &rest[start + end + 1..];
            }
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    out.push_str(rest);
    html_escape::decode_html_entities(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_escapes_text_and_attributes() {
        let mut doc = Document::new();
        let div = doc.create_element_with_class("div", "message");
        doc.set_attribute(div, "data-tool-id", "a\"b");
        doc.set_text(div, "<script>");
        doc.append_child(doc.root(), div);

        assert_eq!(
            doc.outer_html(div),
            "<div class=\"message\" data-tool-id=\"a&quot;b\">&lt;script&gt;</div>"
        );
    }

    #[test]
    fn test_void_elements_have_no_closing_tag() {
        let mut doc = Document::new();
        let img = doc.create_element("img");
        doc.set_attribute(img, "src", "/a.png");
        assert_eq!(doc.outer_html(img), "<img src=\"/a.png\">");
    }

    #[test]
    fn test_insert_and_remove_keep_order() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.create_element("a");
        let b = doc.create_element("b");
        let c = doc.create_element("c");
        doc.append_child(root, a);
        doc.append_child(root, c);
        doc.insert_before(root, b, c);
        assert_eq!(doc.children(root), &[a, b, c]);
        assert_eq!(doc.next_sibling(a), Some(b));
        assert_eq!(doc.previous_sibling(c), Some(b));

        doc.remove(b);
        assert_eq!(doc.children(root), &[a, c]);
        assert!(!doc.is_attached(b));

        assert!(doc.insert_after(a, b));
        assert_eq!(doc.children(root), &[a, b, c]);
    }

    #[test]
    fn test_text_content_of_markup() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.set_html(p, "<strong>bold</strong> &amp; more<br>next");
        assert_eq!(doc.text_content(p), "bold & more\nnext");
        assert!(doc.has_content(p));

        doc.set_html(p, "");
        assert!(!doc.has_content(p));
    }

    #[test]
    fn test_repeated_content_updates_reuse_leaves() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.set_html(p, "<b>a</b>");
        let baseline = doc.node_count();
        let leaf = doc.first_child(p);

        let mut markup = String::new();
        for _ in 0..500 {
            markup.push('x');
            doc.set_html(p, &markup);
            doc.set_text(p, &markup);
        }
        assert_eq!(doc.node_count(), baseline);
        assert_eq!(doc.retained_text_bytes(), markup.len());
        assert_eq!(doc.text_content(p), markup);

        doc.set_text(p, "");
        doc.set_html(p, "<i>y</i>");
        assert_eq!(doc.node_count(), baseline);
        assert_eq!(doc.first_child(p), leaf);
    }

    #[test]
    fn test_replace_children_keeps_reused_leaves() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        let a = doc.create_html("a");
        let b = doc.create_html("b");
        doc.replace_children(p, &[a, b]);
        doc.replace_children(p, &[b]);
        assert_eq!(doc.inner_html(p), "b");

        let c = doc.create_html("c");
        assert_eq!(c, a);
        doc.append_child(p, c);
        assert_eq!(doc.inner_html(p), "bc");
    }
}
