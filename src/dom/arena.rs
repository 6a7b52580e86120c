//! Document: Arena-backed element/text tree with mutation recording
//!
//! # Design
//! - Nodes live in a `Vec` and are addressed by [`NodeId`]; detached nodes stay
//!   in the arena so stale ids never dangle.
//! - A record is queued only while at least one observed root contains the
//!   mutated target (subtree observation, like `{ subtree: true }`).
//! - `disconnect()` drops queued records, exactly like the browser API.

use std::collections::BTreeMap;

use super::{Dom, MutationKind, MutationRecord, NodeId};

// =============================================================================
// Types
// =============================================================================

/// Element payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementData {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
}

/// Node payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Elements rendered without a closing tag
const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "input", "meta", "link"];

// =============================================================================
// Document
// =============================================================================

/// Element/text tree with `<html>`, `<head>` and `<body>` created up front
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    observed: Vec<NodeId>,
    records: Vec<MutationRecord>,
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
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            observed: Vec::new(),
            records: Vec::new(),
        };
        doc.root = doc.push_element("html");
        doc.head = doc.push_element("head");
        doc.body = doc.push_element("body");
        doc.attach(doc.root, doc.head);
        doc.attach(doc.root, doc.body);
        doc
    }

    pub fn data(&self, node: NodeId) -> &NodeData {
        &self.nodes[node.0].data
    }

    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        match &self.nodes[node.0].data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes[node.0].data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    /// Append to a text node in place (streaming token arrival)
    pub fn append_text(&mut self, node: NodeId, more: &str) {
        if let NodeData::Text(text) = &mut self.nodes[node.0].data {
            text.push_str(more);
            self.record(MutationKind::CharacterData, node);
        }
    }

    pub fn pending_records(&self) -> usize {
        self.records.len()
    }

    fn push_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData {
            tag: tag.to_string(),
            ..Default::default()
        }))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
            self.record(MutationKind::ChildList, parent);
        }
    }

    fn record(&mut self, kind: MutationKind, target: NodeId) {
        if self.observed.iter().any(|&root| self.contains(root, target)) {
            self.records.push(MutationRecord { kind, target });
        }
    }

    // -------------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------------

    /// Outer HTML of `node`
    pub fn render_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.render_into(node, &mut out);
        out
    }

    fn render_into(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].data {
            NodeData::Text(text) => escape_into(text, false, out),
            NodeData::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                if let Some(id) = &el.id {
                    push_attr("id", id, out);
                }
                if !el.classes.is_empty() {
                    push_attr("class", &el.classes.join(" "), out);
                }
                for (name, value) in &el.attributes {
                    push_attr(name, value, out);
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                    return;
                }
                for &child in &self.nodes[node.0].children {
                    self.render_into(child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }
}

impl Dom for Document {
    fn root(&self) -> NodeId {
        self.root
    }

    fn head(&self) -> NodeId {
        self.head
    }

    fn body(&self) -> NodeId {
        self.body
    }

    fn node(&self, index: usize) -> Option<NodeId> {
        (index < self.nodes.len()).then_some(NodeId(index))
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_element(tag)
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    fn tag(&self, node: NodeId) -> Option<String> {
        self.element(node).map(|el| el.tag.clone())
    }

    fn element_id(&self, node: NodeId) -> Option<String> {
        self.element(node).and_then(|el| el.id.clone())
    }

    fn text(&self, node: NodeId) -> Option<String> {
        match &self.nodes[node.0].data {
            NodeData::Text(text) => Some(text.clone()),
            NodeData::Element(_) => None,
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node.0].children.clone()
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node)
            .map(|el| el.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node).and_then(|el| el.attributes.get(name).cloned())
    }

    fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&n| self.element(n).and_then(|el| el.id.as_deref()) == Some(id))
    }

    fn set_element_id(&mut self, node: NodeId, id: &str) {
        if let Some(el) = self.element_mut(node) {
            el.id = Some(id.to_string());
            self.record(MutationKind::Attributes, node);
        }
    }

    fn add_class(&mut self, node: NodeId, class: &str) {
        let added = match self.element_mut(node) {
            Some(el) if !el.classes.iter().any(|c| c == class) => {
                el.classes.push(class.to_string());
                true
            }
            _ => false,
        };
        if added {
            self.record(MutationKind::Attributes, node);
        }
    }

    fn remove_class(&mut self, node: NodeId, class: &str) {
        let removed = match self.element_mut(node) {
            Some(el) => {
                let before = el.classes.len();
                el.classes.retain(|c| c != class);
                el.classes.len() != before
            }
            None => false,
        };
        if removed {
            self.record(MutationKind::Attributes, node);
        }
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element_mut(node) {
            el.attributes.insert(name.to_string(), value.to_string());
            self.record(MutationKind::Attributes, node);
        }
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.attach(parent, child);
        self.record(MutationKind::ChildList, parent);
    }

    fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    fn replace_with(&mut self, node: NodeId, replacements: &[NodeId]) -> bool {
        let Some(parent) = self.parent(node) else {
            return false;
        };
        for &r in replacements {
            self.detach(r);
        }
        let siblings = &mut self.nodes[parent.0].children;
        let Some(pos) = siblings.iter().position(|&c| c == node) else {
            return false;
        };
        siblings.splice(pos..=pos, replacements.iter().copied());
        self.nodes[node.0].parent = None;
        for &r in replacements {
            self.nodes[r.0].parent = Some(parent);
        }
        self.record(MutationKind::ChildList, parent);
        true
    }

    fn set_text(&mut self, node: NodeId, value: &str) {
        if let NodeData::Text(text) = &mut self.nodes[node.0].data {
            *text = value.to_string();
            self.record(MutationKind::CharacterData, node);
        }
    }

    fn observe(&mut self, root: NodeId) {
        if !self.observed.contains(&root) {
            self.observed.push(root);
        }
    }

    fn disconnect(&mut self) {
        self.observed.clear();
        self.records.clear();
    }

    fn is_observing(&self) -> bool {
        !self.observed.is_empty()
    }

    fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }
}

fn push_attr(name: &str, value: &str, out: &mut String) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_into(value, true, out);
    out.push('"');
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
