//! Host documents: the tree the annotation pipeline reads and rewrites
//!
//! The pipeline addresses nodes through [`NodeId`] handles and touches the
//! tree only through [`Dom`]. Two backends implement it:
//! - [`Document`]: arena tree, used natively and by the test suite
//! - `WebDocument`: the live page through `web_sys` (wasm32 only)
//!
//! Both learn about edits the way a `MutationObserver` configured with
//! `{ childList, characterData, attributes, subtree }` does, through the
//! observe / disconnect / take_records cycle.

mod arena;
#[cfg(target_arch = "wasm32")]
mod web;

pub use arena::{Document, ElementData, NodeData};
#[cfg(target_arch = "wasm32")]
pub use web::WebDocument;

use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// Handle to a node in a host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Registry index (stable for the lifetime of the document)
    pub fn index(self) -> usize {
        self.0
    }
}

/// What kind of change a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    /// Children added to or removed from `target`
    ChildList,
    /// Text of the `target` text node changed
    CharacterData,
    /// Class list or attribute of `target` changed
    Attributes,
}

/// A queued mutation notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
}

// =============================================================================
// Dom
// =============================================================================

/// Element/text tree with subtree mutation observation
pub trait Dom {
    /// The `<html>` element
    fn root(&self) -> NodeId;
    fn head(&self) -> NodeId;
    fn body(&self) -> NodeId;

    /// Handle for `index`, if it names a node of this document
    fn node(&self, index: usize) -> Option<NodeId>;

    fn create_element(&mut self, tag: &str) -> NodeId;
    fn create_text(&mut self, text: &str) -> NodeId;

    fn is_element(&self, node: NodeId) -> bool;
    /// Lowercase tag name of an element
    fn tag(&self, node: NodeId) -> Option<String>;
    fn element_id(&self, node: NodeId) -> Option<String>;
    /// Data of a text node
    fn text(&self, node: NodeId) -> Option<String>;
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn children(&self, node: NodeId) -> Vec<NodeId>;
    fn has_class(&self, node: NodeId, class: &str) -> bool;
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;
    /// First connected element with the given id
    fn get_element_by_id(&self, id: &str) -> Option<NodeId>;

    fn set_element_id(&mut self, node: NodeId, id: &str);
    fn add_class(&mut self, node: NodeId, class: &str);
    fn remove_class(&mut self, node: NodeId, class: &str);
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str);
    /// Append `child` as the last child of `parent`, detaching it first
    fn append_child(&mut self, parent: NodeId, child: NodeId);
    /// Detach `node` from its parent (no-op for detached nodes)
    fn remove(&mut self, node: NodeId);
    /// Replace `node` in its parent with `replacements`, in order.
    /// Returns false if `node` has no parent.
    fn replace_with(&mut self, node: NodeId, replacements: &[NodeId]) -> bool;
    fn set_text(&mut self, node: NodeId, value: &str);

    /// Start recording mutations inside `root`'s subtree
    fn observe(&mut self, root: NodeId);
    /// Stop all observation and drop undelivered records
    fn disconnect(&mut self);
    fn is_observing(&self) -> bool;
    /// Drain queued records
    fn take_records(&mut self) -> Vec<MutationRecord>;

    // -------------------------------------------------------------------------
    // Derived queries
    // -------------------------------------------------------------------------

    /// Inclusive containment: a node contains itself
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// True if the node is reachable from the document root
    fn is_connected(&self, node: NodeId) -> bool {
        self.contains(self.root(), node)
    }

    /// Nearest inclusive ancestor carrying `class`
    fn closest_with_class(&self, node: NodeId, class: &str) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(n) = current {
            if self.has_class(n, class) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    /// Pre-order traversal, inclusive of `root`
    fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).into_iter().rev());
        }
        out
    }

    /// Text nodes under `root`, in document order
    fn text_nodes(&self, root: NodeId) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&n| !self.is_element(n) && self.text(n).is_some())
            .collect()
    }

    fn text_content(&self, node: NodeId) -> String {
        collect_text(self, node, None)
    }

    /// Concatenated text, skipping every descendant element carrying `class`
    fn text_content_excluding(&self, node: NodeId, class: &str) -> String {
        collect_text(self, node, Some(class))
    }
}

fn collect_text<D: Dom + ?Sized>(doc: &D, node: NodeId, skip: Option<&str>) -> String {
    let mut out = String::new();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        if let Some(text) = doc.text(n) {
            out.push_str(&text);
            continue;
        }
        if n != node && skip.is_some_and(|class| doc.has_class(n, class)) {
            continue;
        }
        stack.extend(doc.children(n).into_iter().rev());
    }
    out
}
