//! Session scenarios: the full mutation → debounce → fetch → rewrite loop
//!
//! Time is driven explicitly through `Instant` arithmetic and futures are run
//! with `futures::executor`, so nothing here sleeps or touches the network.

mod pipeline_tests;

use futures::channel::oneshot;
use futures::executor::block_on;
use futures::future::{self, join_all, FutureExt, LocalBoxFuture};
use instant::Instant;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use crate::annotator::engine::TOOLTIP_CLASS;
use crate::annotator::session::{AutoHyperlink, CycleReport};
use crate::annotator::source::{Definition, DefinitionMap, DefinitionSource, FetchError};
use crate::config::AutoLinkConfig;
use crate::dom::{Document, Dom, NodeId};

pub(crate) const DEBOUNCE: Duration = Duration::from_millis(700);

pub(crate) fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

pub(crate) fn defs(entries: &[(&str, &str)]) -> DefinitionMap {
    entries
        .iter()
        .map(|(k, d)| (k.to_string(), Definition::new(d, Some("https://example.com"))))
        .collect()
}

// =============================================================================
// Sources
// =============================================================================

/// Canned responses keyed by unit text; unknown text gets `{}`
#[derive(Default)]
pub(crate) struct MapSource {
    responses: RefCell<HashMap<String, DefinitionMap>>,
    pub calls: RefCell<Vec<String>>,
    pub failing: Cell<bool>,
}

impl MapSource {
    pub fn with(entries: &[(&str, DefinitionMap)]) -> Rc<Self> {
        let source = Self::default();
        for (text, map) in entries {
            source.responses.borrow_mut().insert(text.to_string(), map.clone());
        }
        Rc::new(source)
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl DefinitionSource for MapSource {
    fn fetch<'a>(&'a self, text: &'a str) -> LocalBoxFuture<'a, Result<DefinitionMap, FetchError>> {
        self.calls.borrow_mut().push(text.to_string());
        let result = if self.failing.get() {
            Err(FetchError::Status { status: 503, body: "unavailable".into() })
        } else {
            Ok(self.responses.borrow().get(text).cloned().unwrap_or_default())
        };
        future::ready(result).boxed_local()
    }
}

/// Every fetch stays pending until the test answers it
#[derive(Default)]
pub(crate) struct DeferredSource {
    pending: RefCell<Vec<(String, oneshot::Sender<DefinitionMap>)>>,
}

impl DeferredSource {
    /// Answer the most recent pending request for `text`
    pub fn respond(&self, text: &str, map: DefinitionMap) -> bool {
        let mut pending = self.pending.borrow_mut();
        let Some(pos) = pending.iter().rposition(|(t, _)| t == text) else {
            return false;
        };
        let (_, tx) = pending.remove(pos);
        tx.send(map).is_ok()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl DefinitionSource for DeferredSource {
    fn fetch<'a>(&'a self, text: &'a str) -> LocalBoxFuture<'a, Result<DefinitionMap, FetchError>> {
        let (tx, rx) = oneshot::channel();
        self.pending.borrow_mut().push((text.to_string(), tx));
        async move { rx.await.map_err(|_| FetchError::Transport("request dropped".into())) }.boxed_local()
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Document with an (optionally pre-filled) `<div id="chat">` in the body
pub(crate) fn chat_document(initial: Option<&str>) -> Rc<RefCell<Document>> {
    let doc = Rc::new(RefCell::new(Document::new()));
    {
        let mut d = doc.borrow_mut();
        let div = d.create_element("div");
        d.set_element_id(div, "chat");
        if let Some(text) = initial {
            let node = d.create_text(text);
            d.append_child(div, node);
        }
        let body = d.body();
        d.append_child(body, div);
    }
    doc
}

/// A `<div id="chat">` under observation
pub(crate) struct Harness {
    pub doc: Rc<RefCell<Document>>,
    pub session: AutoHyperlink,
    pub root: NodeId,
    pub t0: Instant,
}

impl Harness {
    pub fn new(source: Rc<dyn DefinitionSource>) -> Self {
        Self::with_config(source, AutoLinkConfig::default())
    }

    pub fn with_config(source: Rc<dyn DefinitionSource>, config: AutoLinkConfig) -> Self {
        let doc = chat_document(None);
        let session = AutoHyperlink::with_source(doc.clone(), config, source);
        Self::observed(doc, session, "chat")
    }

    /// Observe `target` and run the (empty) initial cycle
    pub fn observed(doc: Rc<RefCell<Document>>, session: AutoHyperlink, id: &str) -> Self {
        let t0 = Instant::now();
        let root = session.observe(id, t0).unwrap();
        let harness = Self { doc, session, root, t0 };
        harness.run_due(t0);
        harness
    }

    /// Stream text into the container's last text node (or a new one)
    pub fn stream(&self, text: &str) {
        let mut doc = self.doc.borrow_mut();
        let last_text = doc
            .children(self.root)
            .last()
            .copied()
            .filter(|&n| doc.text(n).is_some());
        match last_text {
            Some(node) => doc.append_text(node, text),
            None => {
                let node = doc.create_text(text);
                doc.append_child(self.root, node);
            }
        }
    }

    /// Append a fresh text node
    pub fn append_node(&self, text: &str) -> NodeId {
        let mut doc = self.doc.borrow_mut();
        let node = doc.create_text(text);
        doc.append_child(self.root, node);
        node
    }

    pub fn pump(&self, at: Instant) -> usize {
        self.session.pump(at)
    }

    pub fn run_due(&self, at: Instant) -> Vec<CycleReport> {
        block_on(join_all(self.session.due_cycles(at)))
    }

    /// Pump at `at`, then run whatever is due one debounce later
    pub fn settle(&self, at: Instant) -> Vec<CycleReport> {
        self.pump(at);
        self.run_due(at + DEBOUNCE)
    }

    pub fn html(&self) -> String {
        self.doc.borrow().render_html(self.root)
    }

    pub fn text(&self) -> String {
        self.doc.borrow().text_content(self.root)
    }

    pub fn processed(&self) -> Option<usize> {
        self.session.processed_length(self.root)
    }

    pub fn tooltip_count(&self) -> usize {
        let doc = self.doc.borrow();
        doc.descendants(doc.root())
            .into_iter()
            .filter(|&n| doc.has_class(n, TOOLTIP_CLASS))
            .count()
    }
}
