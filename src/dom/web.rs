//! WebDocument: The live page behind the [`Dom`] trait
//!
//! Every `web_sys::Node` the pipeline touches gets a [`NodeId`] from a
//! registry: a `Vec` of nodes plus a JS `Map` from node to index, so the
//! same node always maps to the same id.
//!
//! Mutations come from a real `MutationObserver`. Records the browser has
//! already delivered to the callback are queued here; `take_records` drains
//! that queue together with whatever the observer still holds. An optional
//! listener is invoked after each delivery so the host can pump the session.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Element, MutationObserver, MutationObserverInit, Node};

use super::{Dom, MutationKind, MutationRecord, NodeId};

/// `NodeFilter.SHOW_TEXT`
const SHOW_TEXT: u32 = 0x4;

type MutationCallback = Closure<dyn FnMut(js_sys::Array, MutationObserver)>;

/// Called after the observer delivers a batch
pub type MutationListener = Rc<dyn Fn()>;

pub struct WebDocument {
    document: web_sys::Document,
    nodes: RefCell<Vec<Node>>,
    index: js_sys::Map,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    observer: MutationObserver,
    observed: Vec<NodeId>,
    delivered: Rc<RefCell<Vec<web_sys::MutationRecord>>>,
    listener: Rc<RefCell<Option<MutationListener>>>,
    _callback: MutationCallback,
}

impl WebDocument {
    /// Wrap `window.document`
    pub fn new() -> Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| JsValue::from_str("No document available"))?;
        let html = document
            .document_element()
            .ok_or_else(|| JsValue::from_str("Document has no root element"))?;
        let head = document
            .head()
            .ok_or_else(|| JsValue::from_str("Document has no <head>"))?;
        let body = document
            .body()
            .ok_or_else(|| JsValue::from_str("Document has no <body>"))?;

        let delivered: Rc<RefCell<Vec<web_sys::MutationRecord>>> = Rc::default();
        let listener: Rc<RefCell<Option<MutationListener>>> = Rc::default();
        let callback = {
            let delivered = Rc::clone(&delivered);
            let listener = Rc::clone(&listener);
            Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
                move |records: js_sys::Array, _observer: MutationObserver| {
                    delivered
                        .borrow_mut()
                        .extend(records.iter().map(|r| r.unchecked_into::<web_sys::MutationRecord>()));
                    let notify = listener.borrow().clone();
                    if let Some(notify) = notify {
                        notify();
                    }
                },
            )
        };
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;

        let mut doc = Self {
            document,
            nodes: RefCell::new(Vec::new()),
            index: js_sys::Map::new(),
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            observer,
            observed: Vec::new(),
            delivered,
            listener,
            _callback: callback,
        };
        doc.root = doc.id_of(&html);
        doc.head = doc.id_of(&head);
        doc.body = doc.id_of(&body);
        Ok(doc)
    }

    /// Install (or clear) the post-delivery listener
    pub fn set_mutation_listener(&self, listener: Option<MutationListener>) {
        *self.listener.borrow_mut() = listener;
    }

    /// Id for a node, registering it on first sight
    pub fn id_of(&self, node: &Node) -> NodeId {
        if let Some(index) = self.index.get(node).as_f64() {
            return NodeId(index as usize);
        }
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len());
        nodes.push(node.clone());
        self.index.set(node, &JsValue::from(id.0 as f64));
        id
    }

    /// Id for a JS value that is a DOM node
    pub fn id_of_value(&self, value: &JsValue) -> Option<NodeId> {
        value.dyn_ref::<Node>().map(|node| self.id_of(node))
    }

    /// The `web_sys` node behind an id
    pub fn node_ref(&self, id: NodeId) -> Option<Node> {
        self.nodes.borrow().get(id.0).cloned()
    }

    pub fn outer_html(&self, id: NodeId) -> Option<String> {
        self.element(id).map(|el| el.outer_html())
    }

    fn element(&self, id: NodeId) -> Option<Element> {
        self.node_ref(id)?.dyn_into::<Element>().ok()
    }

    fn convert(&self, record: &web_sys::MutationRecord) -> Option<MutationRecord> {
        let kind = match record.type_().as_str() {
            "childList" => MutationKind::ChildList,
            "characterData" => MutationKind::CharacterData,
            "attributes" => MutationKind::Attributes,
            _ => return None,
        };
        let target = self.id_of(&record.target()?);
        Some(MutationRecord { kind, target })
    }
}

impl Dom for WebDocument {
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
        (index < self.nodes.borrow().len()).then_some(NodeId(index))
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        match self.document.create_element(tag) {
            Ok(element) => self.id_of(&element),
            Err(e) => {
                // An empty fragment appends as nothing
                tracing::error!("[WebDocument] createElement({}) failed: {:?}", tag, e);
                self.id_of(&self.document.create_document_fragment())
            }
        }
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        let node = self.document.create_text_node(text);
        self.id_of(&node)
    }

    fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    fn tag(&self, node: NodeId) -> Option<String> {
        self.element(node).map(|el| el.tag_name().to_lowercase())
    }

    fn element_id(&self, node: NodeId) -> Option<String> {
        self.element(node)
            .map(|el| el.id())
            .filter(|id| !id.is_empty())
    }

    fn text(&self, node: NodeId) -> Option<String> {
        let node = self.node_ref(node)?;
        if node.node_type() == Node::TEXT_NODE {
            node.node_value()
        } else {
            None
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.node_ref(node)?.parent_node()?;
        Some(self.id_of(&parent))
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        let Some(node) = self.node_ref(node) else {
            return Vec::new();
        };
        let list = node.child_nodes();
        (0..list.length())
            .filter_map(|i| list.item(i))
            .map(|child| self.id_of(&child))
            .collect()
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node)
            .map(|el| el.class_list().contains(class))
            .unwrap_or(false)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node)?.get_attribute(name)
    }

    fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        let element = self.document.get_element_by_id(id)?;
        Some(self.id_of(&element))
    }

    fn set_element_id(&mut self, node: NodeId, id: &str) {
        if let Some(el) = self.element(node) {
            el.set_id(id);
        }
    }

    fn add_class(&mut self, node: NodeId, class: &str) {
        if let Some(el) = self.element(node) {
            if let Err(e) = el.class_list().add_1(class) {
                tracing::error!("[WebDocument] classList.add({}) failed: {:?}", class, e);
            }
        }
    }

    fn remove_class(&mut self, node: NodeId, class: &str) {
        if let Some(el) = self.element(node) {
            if let Err(e) = el.class_list().remove_1(class) {
                tracing::error!("[WebDocument] classList.remove({}) failed: {:?}", class, e);
            }
        }
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element(node) {
            if let Err(e) = el.set_attribute(name, value) {
                tracing::error!("[WebDocument] setAttribute({}) failed: {:?}", name, e);
            }
        }
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let (Some(parent), Some(child)) = (self.node_ref(parent), self.node_ref(child)) else {
            return;
        };
        if let Err(e) = parent.append_child(&child) {
            tracing::error!("[WebDocument] appendChild failed: {:?}", e);
        }
    }

    fn remove(&mut self, node: NodeId) {
        let Some(node) = self.node_ref(node) else {
            return;
        };
        if let Some(parent) = node.parent_node() {
            if let Err(e) = parent.remove_child(&node) {
                tracing::error!("[WebDocument] removeChild failed: {:?}", e);
            }
        }
    }

    fn replace_with(&mut self, node: NodeId, replacements: &[NodeId]) -> bool {
        let Some(node) = self.node_ref(node) else {
            return false;
        };
        let Some(parent) = node.parent_node() else {
            return false;
        };
        for replacement in replacements.iter().filter_map(|&r| self.node_ref(r)) {
            if let Err(e) = parent.insert_before(&replacement, Some(&node)) {
                tracing::error!("[WebDocument] insertBefore failed: {:?}", e);
                return false;
            }
        }
        parent.remove_child(&node).is_ok()
    }

    fn set_text(&mut self, node: NodeId, value: &str) {
        if let Some(node) = self.node_ref(node) {
            if node.node_type() == Node::TEXT_NODE {
                node.set_node_value(Some(value));
            }
        }
    }

    fn observe(&mut self, root: NodeId) {
        let Some(node) = self.node_ref(root) else {
            return;
        };
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_character_data(true);
        init.set_attributes(true);
        init.set_subtree(true);
        match self.observer.observe_with_options(&node, &init) {
            Ok(()) => {
                if !self.observed.contains(&root) {
                    self.observed.push(root);
                }
            }
            Err(e) => tracing::error!("[WebDocument] observe failed: {:?}", e),
        }
    }

    fn disconnect(&mut self) {
        self.observer.disconnect();
        self.delivered.borrow_mut().clear();
        self.observed.clear();
    }

    fn is_observing(&self) -> bool {
        !self.observed.is_empty()
    }

    fn take_records(&mut self) -> Vec<MutationRecord> {
        let mut raw = std::mem::take(&mut *self.delivered.borrow_mut());
        raw.extend(
            self.observer
                .take_records()
                .iter()
                .map(|r| r.unchecked_into::<web_sys::MutationRecord>()),
        );
        raw.iter().filter_map(|record| self.convert(record)).collect()
    }

    // -------------------------------------------------------------------------
    // Native overrides
    // -------------------------------------------------------------------------

    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        match (self.node_ref(ancestor), self.node_ref(node)) {
            (Some(ancestor), Some(node)) => ancestor.contains(Some(&node)),
            _ => false,
        }
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.node_ref(node).map(|n| n.is_connected()).unwrap_or(false)
    }

    /// `TreeWalker` with `SHOW_TEXT`
    fn text_nodes(&self, root: NodeId) -> Vec<NodeId> {
        let Some(root) = self.node_ref(root) else {
            return Vec::new();
        };
        let walker = match self.document.create_tree_walker_with_what_to_show(&root, SHOW_TEXT) {
            Ok(walker) => walker,
            Err(e) => {
                tracing::error!("[WebDocument] createTreeWalker failed: {:?}", e);
                return Vec::new();
            }
        };
        let mut out = Vec::new();
        while let Ok(Some(node)) = walker.next_node() {
            out.push(self.id_of(&node));
        }
        out
    }

    fn text_content(&self, node: NodeId) -> String {
        self.node_ref(node)
            .and_then(|n| n.text_content())
            .unwrap_or_default()
    }
}
