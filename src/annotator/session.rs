//! AutoHyperlink: The annotation session
//!
//! Owns every piece of per-session state and drives the pipeline:
//!
//! ```text
//! host edit ─▶ pump(now) ─▶ tracker deadline ─▶ due_cycles(now)
//!                                                   │
//!      segment ◀── snapshot text + processed length ┘
//!         │
//!         ▼ per unit, in text order
//!      cache.resolve ──await──▶ liveness check ─▶ suspend ─▶ apply ─▶ resume
//!                                                   │
//!                     advance(min(snapshot, current)) ◀┘
//! ```
//!
//! # Design
//! - Single-threaded: state sits behind `Rc<RefCell<_>>` and no borrow is held
//!   across an await. The only suspension points are definition fetches.
//! - Cycles are `'static` local futures so hosts can spawn them
//!   (`spawn_local` on wasm) or drive them inline (`block_on` natively).
//! - `destroy()` bumps an epoch. A cycle that resumes under a different epoch,
//!   or for a root that is gone, returns a stale report without touching the
//!   document.
//! - The placement primitive is only ever called with every session and
//!   document borrow released, so it may read the document or re-enter.

use futures::future::{FutureExt, LocalBoxFuture};
use instant::Instant;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::config::AutoLinkConfig;
use crate::dom::{Dom, NodeId};

use super::cache::{preview, CacheStats, DefinitionCache};
use super::engine::{self, AnnotatedSpan, ApplyTarget, LINK_CLASS, TOOLTIP_CLASS};
use super::segment::segment;
use super::source::{DefinitionMap, DefinitionSource, HttpDefinitionSource, StaticKeywordSource};
use super::tooltip::{NoopPlacement, Placement, TooltipContent, TooltipController};
use super::tracker::{ContainerTracker, WatchPhase};
use super::watcher::{MutationWatcher, ObserverState};

/// Id of the injected `<style>` element
pub const STYLE_ELEMENT_ID: &str = "auto-hyperlink-styles";

/// Stylesheet injected once per session
pub const STYLESHEET: &str = r#"
.auto-hyperlink-link {
    color: #1a73e8;
    text-decoration: underline dotted;
    cursor: pointer;
    position: relative;
}
.auto-hyperlink-tooltip {
    background-color: #333;
    color: #fff;
    padding: 8px 12px;
    border-radius: 4px;
    font-size: 13px;
    z-index: 10000;
    max-width: 250px;
    word-wrap: break-word;
    opacity: 0;
    transition: opacity 0.2s ease-in-out;
    pointer-events: none;
    position: absolute;
}
.auto-hyperlink-tooltip.visible {
    opacity: 1;
    pointer-events: auto;
}
.auto-hyperlink-tooltip a {
    color: #8ab4f8;
    text-decoration: underline;
}
"#;

// =============================================================================
// Types
// =============================================================================

/// What `observe` should watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserveTarget {
    Node(NodeId),
    ElementId(String),
}

impl From<NodeId> for ObserveTarget {
    fn from(node: NodeId) -> Self {
        Self::Node(node)
    }
}

impl From<&str> for ObserveTarget {
    fn from(id: &str) -> Self {
        Self::ElementId(id.to_string())
    }
}

impl From<String> for ObserveTarget {
    fn from(id: String) -> Self {
        Self::ElementId(id)
    }
}

/// Why `observe` refused a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserveError {
    /// No connected element carries this id
    UnknownElementId(String),
    /// The node is a text node or does not belong to the document
    NotAnElement(NodeId),
    /// The element is not attached to the document
    NotConnected(NodeId),
    /// `observe` already succeeded; call `destroy` first
    AlreadyInitialized,
}

impl std::fmt::Display for ObserveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObserveError::UnknownElementId(id) => {
                write!(f, "No element with id \"{}\" to observe", id)
            }
            ObserveError::NotAnElement(node) => {
                write!(f, "Observe target {:?} is not an element", node)
            }
            ObserveError::NotConnected(node) => {
                write!(f, "Observe target {:?} is not attached to the document", node)
            }
            ObserveError::AlreadyInitialized => {
                write!(f, "AutoHyperlink is already observing; call destroy() first")
            }
        }
    }
}

impl std::error::Error for ObserveError {}

/// Outcome of one processing cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub root: NodeId,
    /// Units whose definitions came back and were applied
    pub units_submitted: usize,
    pub spans_created: usize,
    /// Counter after the cycle (0 once the session is torn down)
    pub processed_length: usize,
    /// The session was destroyed or the root went away mid-cycle
    pub stale: bool,
}

/// What a click did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// A tooltip opened for this span
    Shown(NodeId),
    /// The open tooltip started closing
    Hidden,
    Ignored,
}

struct SessionInner {
    config: AutoLinkConfig,
    tracker: ContainerTracker,
    watcher: MutationWatcher,
    tooltip: TooltipController,
    spans: HashMap<NodeId, AnnotatedSpan>,
    initialized: bool,
    epoch: u64,
}

// =============================================================================
// AutoHyperlink
// =============================================================================

/// Annotation session over one host document.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct AutoHyperlink {
    doc: Rc<RefCell<dyn Dom>>,
    inner: Rc<RefCell<SessionInner>>,
    cache: Rc<DefinitionCache>,
    source: Rc<dyn DefinitionSource>,
    /// Taken out of its slot for the duration of each call
    placement: Rc<RefCell<Option<Box<dyn Placement>>>>,
}

impl AutoHyperlink {
    /// Session backed by the configured extraction service, or by the static
    /// keyword list when one is set
    pub fn new(doc: Rc<RefCell<dyn Dom>>, config: AutoLinkConfig) -> Self {
        let source: Rc<dyn DefinitionSource> = match config.static_keywords() {
            Some(keywords) => Rc::new(StaticKeywordSource::new(keywords)),
            None => Rc::new(HttpDefinitionSource::new(config.api_url())),
        };
        Self::with_source(doc, config, source)
    }

    /// Session with an explicit definition source
    pub fn with_source(
        doc: Rc<RefCell<dyn Dom>>,
        config: AutoLinkConfig,
        source: Rc<dyn DefinitionSource>,
    ) -> Self {
        tracing::info!("[AutoHyperlink] Constructing...");
        let debounce = config.debounce();
        let session = Self {
            doc,
            inner: Rc::new(RefCell::new(SessionInner {
                config,
                tracker: ContainerTracker::new(),
                watcher: MutationWatcher::new(debounce),
                tooltip: TooltipController::default(),
                spans: HashMap::new(),
                initialized: false,
                epoch: 0,
            })),
            cache: Rc::new(DefinitionCache::new()),
            source,
            placement: Rc::new(RefCell::new(Some(Box::new(NoopPlacement::default())))),
        };
        inject_stylesheet(&mut *session.doc.borrow_mut());
        session
    }

    /// Replace the tooltip placement primitive
    pub fn set_placement(&self, placement: Box<dyn Placement>) {
        *self.placement.borrow_mut() = Some(placement);
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Start watching `target`. The first cycle is due immediately, so
    /// content already present gets annotated on the next `due_cycles(now)`.
    pub fn observe(&self, target: impl Into<ObserveTarget>, now: Instant) -> Result<NodeId, ObserveError> {
        let mut doc = self.doc.borrow_mut();
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;

        if inner.initialized {
            tracing::warn!("[AutoHyperlink] {}", ObserveError::AlreadyInitialized);
            return Err(ObserveError::AlreadyInitialized);
        }

        let root = match resolve_target(&*doc, target.into()) {
            Ok(root) => root,
            Err(e) => {
                tracing::error!("[AutoHyperlink] {}", e);
                return Err(e);
            }
        };

        inject_stylesheet(&mut *doc);
        inner.tracker.register(root);
        inner.tracker.arm(root, now);
        let roots = inner.tracker.roots();
        inner.watcher.attach(&mut *doc, &roots);
        inner.initialized = true;

        let label = doc
            .element_id(root)
            .or_else(|| doc.tag(root))
            .unwrap_or_default();
        tracing::info!("[AutoHyperlink] Observing {}", label);
        Ok(root)
    }

    /// Deliver queued mutation records. Returns how many mapped to a container.
    pub fn pump(&self, now: Instant) -> usize {
        let mut doc = self.doc.borrow_mut();
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        inner.watcher.pump(&mut *doc, &mut inner.tracker, now)
    }

    /// One cycle per container whose debounce deadline has passed
    pub fn due_cycles(&self, now: Instant) -> Vec<LocalBoxFuture<'static, CycleReport>> {
        let (due, epoch) = {
            let mut inner = self.inner.borrow_mut();
            (inner.tracker.take_due(now), inner.epoch)
        };
        due.into_iter()
            .map(|root| {
                let session = self.clone();
                async move { session.run_cycle(root, epoch).await }.boxed_local()
            })
            .collect()
    }

    async fn run_cycle(self, root: NodeId, epoch: u64) -> CycleReport {
        let mut report = CycleReport {
            root,
            units_submitted: 0,
            spans_created: 0,
            processed_length: 0,
            stale: false,
        };
        if !self.is_live(root, epoch) {
            report.stale = true;
            return report;
        }

        let processed = self.processed_length(root).unwrap_or(0);
        let snapshot = segment(&self.container_text(root), processed);
        report.processed_length = processed;

        for unit in &snapshot.units {
            tracing::debug!("[AutoHyperlink] unit ({:?}): {}...", unit.kind, preview(&unit.text));
            let definitions = self.cache.resolve(&unit.text, self.source.as_ref()).await;
            if !self.is_live(root, epoch) {
                tracing::debug!("[AutoHyperlink] dropping stale completion for {:?}", root);
                report.stale = true;
                report.processed_length = self.processed_length(root).unwrap_or(0);
                return report;
            }
            report.units_submitted += 1;
            report.spans_created += self.apply_definitions(root, &definitions);
        }

        let current = self.container_text(root).chars().count();
        let mut inner = self.inner.borrow_mut();
        if report.units_submitted > 0 {
            inner.tracker.advance(root, snapshot.full_length.min(current));
        }
        inner.tracker.finish(root);
        report.processed_length = inner.tracker.processed_length(root).unwrap_or(0);

        tracing::info!(
            "[AutoHyperlink] cycle done: {} units, {} spans, processed {}",
            report.units_submitted,
            report.spans_created,
            report.processed_length
        );
        report
    }

    fn is_live(&self, root: NodeId, epoch: u64) -> bool {
        let doc = self.doc.borrow();
        let inner = self.inner.borrow();
        inner.epoch == epoch && inner.tracker.contains(root) && doc.is_connected(root)
    }

    /// Container text, tooltip subtrees excluded
    fn container_text(&self, root: NodeId) -> String {
        self.doc.borrow().text_content_excluding(root, TOOLTIP_CLASS)
    }

    /// Rewrite the container with the watcher suspended
    fn apply_definitions(&self, root: NodeId, definitions: &DefinitionMap) -> usize {
        if definitions.is_empty() {
            return 0;
        }
        let mut doc = self.doc.borrow_mut();
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;

        inner.watcher.suspend(&mut *doc);
        let spans = engine::apply(&mut *doc, ApplyTarget::Container(root), definitions);
        let roots = inner.tracker.roots();
        inner.watcher.resume(&mut *doc, &roots);

        let created = spans.len();
        for span in spans {
            inner.spans.insert(span.node, span);
        }
        created
    }

    // -------------------------------------------------------------------------
    // Interaction
    // -------------------------------------------------------------------------

    /// Open the tooltip for an annotated span
    pub fn activate(&self, span: NodeId) -> bool {
        let (element, options) = {
            let mut doc = self.doc.borrow_mut();
            let mut inner = self.inner.borrow_mut();
            let inner = &mut *inner;

            let Some(annotated) = inner.spans.get(&span) else {
                return false;
            };
            let content = TooltipContent::new(&annotated.term, &annotated.definition);

            inner.watcher.suspend(&mut *doc);
            let element = inner.tooltip.show(&mut *doc, span, &content);
            let roots = inner.tracker.roots();
            inner.watcher.resume(&mut *doc, &roots);
            (element, inner.tooltip.options())
        };

        self.release_placements();
        if let Some(handle) = self.with_placement(|p| p.create(span, element, &options)) {
            let attached = self.inner.borrow_mut().tooltip.attach_placement(element, handle);
            if !attached {
                self.with_placement(|p| p.destroy(handle));
            }
        }
        true
    }

    /// A click anywhere in the document
    pub fn click(&self, target: NodeId) -> ClickOutcome {
        let span = {
            let doc = self.doc.borrow();
            if doc.node(target.index()).is_none() {
                return ClickOutcome::Ignored;
            }
            doc.closest_with_class(target, LINK_CLASS)
        };
        match span {
            Some(span) if self.activate(span) => ClickOutcome::Shown(span),
            Some(_) => ClickOutcome::Ignored,
            None if self.on_document_click(target) => ClickOutcome::Hidden,
            None => ClickOutcome::Ignored,
        }
    }

    /// Close the tooltip unless the click landed on an annotated span
    pub fn on_document_click(&self, target: NodeId) -> bool {
        let mut doc = self.doc.borrow_mut();
        if doc.closest_with_class(target, LINK_CLASS).is_some() {
            return false;
        }
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;

        inner.watcher.suspend(&mut *doc);
        let hidden = inner.tooltip.hide(&mut *doc);
        let roots = inner.tracker.roots();
        inner.watcher.resume(&mut *doc, &roots);
        hidden
    }

    /// The tooltip's close transition finished
    pub fn on_transition_end(&self) -> bool {
        let removed = {
            let mut doc = self.doc.borrow_mut();
            let mut inner = self.inner.borrow_mut();
            let inner = &mut *inner;

            inner.watcher.suspend(&mut *doc);
            let removed = inner.tooltip.on_transition_end(&mut *doc);
            let roots = inner.tracker.roots();
            inner.watcher.resume(&mut *doc, &roots);
            removed
        };
        self.release_placements();
        removed
    }

    /// Run `f` against the placement primitive with no borrow held. A
    /// re-entrant call finds the slot empty and is skipped.
    fn with_placement<R>(&self, f: impl FnOnce(&mut dyn Placement) -> R) -> Option<R> {
        let Some(mut placement) = self.placement.borrow_mut().take() else {
            tracing::debug!("[AutoHyperlink] placement busy, skipping");
            return None;
        };
        let result = f(placement.as_mut());
        let mut slot = self.placement.borrow_mut();
        // A primitive installed during the call wins
        if slot.is_none() {
            *slot = Some(placement);
        }
        Some(result)
    }

    /// Destroy placements of tooltips that were removed
    fn release_placements(&self) {
        let released = self.inner.borrow_mut().tooltip.take_released();
        for handle in released {
            self.with_placement(|p| p.destroy(handle));
        }
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Stop observing and release everything. Safe to call repeatedly.
    pub fn destroy(&self) {
        {
            let mut doc = self.doc.borrow_mut();
            let mut inner = self.inner.borrow_mut();
            let inner = &mut *inner;

            inner.epoch += 1;
            inner.watcher.detach(&mut *doc);
            inner.tracker.clear();
            inner.tooltip.teardown(&mut *doc);
            inner.spans.clear();
            inner.initialized = false;
            self.cache.clear();

            if let Some(style) = doc.get_element_by_id(STYLE_ELEMENT_ID) {
                doc.remove(style);
            }
        }
        self.release_placements();
        tracing::info!("[AutoHyperlink] Stopped and cleaned up");
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn document(&self) -> Rc<RefCell<dyn Dom>> {
        Rc::clone(&self.doc)
    }

    pub fn config(&self) -> AutoLinkConfig {
        self.inner.borrow().config.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.borrow().initialized
    }

    pub fn processed_length(&self, root: NodeId) -> Option<usize> {
        self.inner.borrow().tracker.processed_length(root)
    }

    pub fn phase(&self, root: NodeId) -> Option<WatchPhase> {
        self.inner.borrow().tracker.phase(root)
    }

    /// Earliest debounce deadline across containers
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.borrow().tracker.next_deadline()
    }

    pub fn watcher_state(&self) -> ObserverState {
        self.inner.borrow().watcher.state()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn span(&self, node: NodeId) -> Option<AnnotatedSpan> {
        self.inner.borrow().spans.get(&node).cloned()
    }

    /// Registered spans, in creation order
    pub fn spans(&self) -> Vec<AnnotatedSpan> {
        let mut spans: Vec<AnnotatedSpan> = self.inner.borrow().spans.values().cloned().collect();
        spans.sort_by_key(|s| s.node);
        spans
    }

    /// Tooltip element, while open or closing
    pub fn tooltip_element(&self) -> Option<NodeId> {
        self.inner.borrow().tooltip.element()
    }
}

fn resolve_target(doc: &dyn Dom, target: ObserveTarget) -> Result<NodeId, ObserveError> {
    match target {
        ObserveTarget::ElementId(id) => doc
            .get_element_by_id(&id)
            .ok_or(ObserveError::UnknownElementId(id)),
        ObserveTarget::Node(node) => {
            if doc.node(node.index()).is_none() || !doc.is_element(node) {
                Err(ObserveError::NotAnElement(node))
            } else if !doc.is_connected(node) {
                Err(ObserveError::NotConnected(node))
            } else {
                Ok(node)
            }
        }
    }
}

/// Add the stylesheet to `<head>` unless it is already there
fn inject_stylesheet(doc: &mut dyn Dom) {
    if doc.get_element_by_id(STYLE_ELEMENT_ID).is_some() {
        return;
    }
    let style = doc.create_element("style");
    doc.set_element_id(style, STYLE_ELEMENT_ID);
    doc.set_attribute(style, "type", "text/css");
    let css = doc.create_text(STYLESHEET);
    doc.append_child(style, css);
    let head = doc.head();
    doc.append_child(head, style);
}
