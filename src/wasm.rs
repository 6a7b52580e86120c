//! WASM bindings for AutoHyperlink
//!
//! Runs a session against the live page through [`WebDocument`]. Containers
//! are addressed by element id or by the element itself.
//!
//! Cycles drive themselves: every batch the `MutationObserver` delivers is
//! pumped into the session, and a `setTimeout` is armed for the earliest
//! debounce deadline. `tick()` runs whatever is due right now, for hosts that
//! want to await a cycle.

use futures::future::join_all;
use instant::Instant;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use crate::annotator::session::{AutoHyperlink, ClickOutcome, ObserveTarget};
use crate::annotator::tooltip::{Placement, PlacementHandle, PlacementOptions, Side};
use crate::config::AutoLinkConfig;
use crate::dom::{Dom, NodeId, WebDocument};

// =============================================================================
// Types
// =============================================================================

/// Annotation as handed to JS; `element` is attached separately
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpanView {
    term: String,
    keyword: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<String>,
}

/// Popper-style placement options
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlacementSpec {
    placement: &'static str,
    offset: [i32; 2],
    padding: i32,
}

impl From<&PlacementOptions> for PlacementSpec {
    fn from(options: &PlacementOptions) -> Self {
        Self {
            placement: match options.side {
                Side::Top => "top",
                Side::Bottom => "bottom",
            },
            offset: [options.offset.0, options.offset.1],
            padding: options.overflow_padding,
        }
    }
}

/// Placement backed by a pair of JS callbacks:
/// `create(anchor, tooltip, options) -> instance` and `destroy(instance)`.
/// The callbacks receive the page's own elements.
struct JsPlacement {
    create: js_sys::Function,
    destroy: js_sys::Function,
    doc: Rc<RefCell<WebDocument>>,
    instances: HashMap<u32, JsValue>,
    next: u32,
}

impl Placement for JsPlacement {
    fn create(&mut self, anchor: NodeId, floating: NodeId, options: &PlacementOptions) -> PlacementHandle {
        let spec = serde_wasm_bindgen::to_value(&PlacementSpec::from(options)).unwrap_or(JsValue::NULL);
        let (anchor, floating) = {
            let doc = self.doc.borrow();
            (doc.node_ref(anchor), doc.node_ref(floating))
        };
        let (Some(anchor), Some(floating)) = (anchor, floating) else {
            tracing::error!("[AutoHyperlink] placement target is not a page node");
            return PlacementHandle(0);
        };

        self.next += 1;
        let handle = PlacementHandle(self.next);
        match self.create.call3(&JsValue::NULL, &anchor, &floating, &spec) {
            Ok(instance) => {
                self.instances.insert(handle.0, instance);
            }
            Err(e) => tracing::error!("[AutoHyperlink] placement create failed: {:?}", e),
        }
        handle
    }

    fn destroy(&mut self, handle: PlacementHandle) {
        let Some(instance) = self.instances.remove(&handle.0) else {
            return;
        };
        if let Err(e) = self.destroy.call1(&JsValue::NULL, &instance) {
            tracing::error!("[AutoHyperlink] placement destroy failed: {:?}", e);
        }
    }
}

// =============================================================================
// Driver
// =============================================================================

type EventCallback = Closure<dyn Fn(web_sys::Event)>;

/// Pumps mutations, spawns due cycles and keeps one timer armed
struct Driver {
    session: AutoHyperlink,
    doc: Rc<RefCell<WebDocument>>,
    timer: Cell<Option<i32>>,
    listeners: RefCell<Vec<(&'static str, EventCallback)>>,
}

impl Driver {
    fn run(self: &Rc<Self>) {
        let now = Instant::now();
        self.session.pump(now);
        for cycle in self.session.due_cycles(now) {
            let driver = Rc::clone(self);
            spawn_local(async move {
                let report = cycle.await;
                tracing::debug!(
                    "[AutoHyperlink] cycle done: {} spans, stale={}",
                    report.spans_created,
                    report.stale
                );
                // Text may have streamed in while the fetch was pending
                driver.run();
            });
        }
        self.arm();
    }

    /// Arm the timer for the earliest debounce deadline
    fn arm(self: &Rc<Self>) {
        self.disarm();
        let Some(deadline) = self.session.next_deadline() else {
            return;
        };
        let Some(window) = web_sys::window() else {
            return;
        };
        let now = Instant::now();
        let wait = if deadline > now { deadline - now } else { Duration::ZERO };

        let driver = Rc::clone(self);
        let callback = Closure::once_into_js(move || {
            driver.timer.set(None);
            driver.run();
        });
        match window.set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.unchecked_ref(),
            wait.as_millis() as i32,
        ) {
            Ok(id) => self.timer.set(Some(id)),
            Err(e) => tracing::error!("[AutoHyperlink] setTimeout failed: {:?}", e),
        }
    }

    fn disarm(&self) {
        if let (Some(id), Some(window)) = (self.timer.take(), web_sys::window()) {
            window.clear_timeout_with_handle(id);
        }
    }

    /// Hook the observer and the page's click / transitionend events
    fn install(self: &Rc<Self>) {
        let weak: Weak<Self> = Rc::downgrade(self);
        self.doc.borrow().set_mutation_listener(Some(Rc::new(move || {
            if let Some(driver) = weak.upgrade() {
                driver.run();
            }
        })));

        if !self.listeners.borrow().is_empty() {
            return;
        }
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };

        let weak = Rc::downgrade(self);
        let click = EventCallback::new(move |event: web_sys::Event| {
            let Some(driver) = weak.upgrade() else {
                return;
            };
            let Some(target) = event.target() else {
                return;
            };
            let node = driver.doc.borrow().id_of_value(&target);
            if let Some(node) = node {
                driver.session.click(node);
            }
        });

        let weak = Rc::downgrade(self);
        let transition_end = EventCallback::new(move |event: web_sys::Event| {
            let Some(driver) = weak.upgrade() else {
                return;
            };
            let Some(target) = event.target() else {
                return;
            };
            let node = driver.doc.borrow().id_of_value(&target);
            if node.is_some() && node == driver.session.tooltip_element() {
                driver.session.on_transition_end();
            }
        });

        let mut listeners = self.listeners.borrow_mut();
        for (name, callback) in [("click", click), ("transitionend", transition_end)] {
            if let Err(e) = document.add_event_listener_with_callback(name, callback.as_ref().unchecked_ref()) {
                tracing::error!("[AutoHyperlink] addEventListener({}) failed: {:?}", name, e);
                continue;
            }
            listeners.push((name, callback));
        }
    }

    fn uninstall(&self) {
        self.disarm();
        self.doc.borrow().set_mutation_listener(None);
        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };
        for (name, callback) in listeners {
            let _ = document.remove_event_listener_with_callback(name, callback.as_ref().unchecked_ref());
        }
    }
}

// =============================================================================
// WasmAutoHyperlink
// =============================================================================

#[wasm_bindgen(js_name = AutoHyperlink)]
pub struct WasmAutoHyperlink {
    doc: Rc<RefCell<WebDocument>>,
    session: AutoHyperlink,
    driver: Rc<Driver>,
}

impl WasmAutoHyperlink {
    /// Session over `window.document`
    pub fn from_config(config: AutoLinkConfig) -> Result<Self, JsValue> {
        let doc = Rc::new(RefCell::new(WebDocument::new()?));
        let shared: Rc<RefCell<dyn Dom>> = doc.clone();
        let session = AutoHyperlink::new(shared, config);
        let driver = Rc::new(Driver {
            session: session.clone(),
            doc: Rc::clone(&doc),
            timer: Cell::new(None),
            listeners: RefCell::new(Vec::new()),
        });
        Ok(Self { doc, session, driver })
    }

    pub fn session(&self) -> &AutoHyperlink {
        &self.session
    }

    fn container(&self, id: &str) -> Option<NodeId> {
        self.doc.borrow().get_element_by_id(id)
    }

    fn span_views(&self, id: &str) -> Result<js_sys::Array, JsValue> {
        let out = js_sys::Array::new();
        let Some(root) = self.container(id) else {
            return Ok(out);
        };
        let doc = self.doc.borrow();
        for span in self.session.spans() {
            if !doc.contains(root, span.node) {
                continue;
            }
            let view = SpanView {
                term: span.term,
                keyword: span.keyword,
                description: span.definition.description,
                link: span.definition.link,
            };
            let entry = serde_wasm_bindgen::to_value(&view)?;
            if let Some(element) = doc.node_ref(span.node) {
                js_sys::Reflect::set(&entry, &JsValue::from_str("element"), &element)?;
            }
            out.push(&entry);
        }
        Ok(out)
    }
}

#[wasm_bindgen(js_class = AutoHyperlink)]
impl WasmAutoHyperlink {
    /// Create a session (JS binding)
    /// Accepts `{ definitionApiUrl?, debounceDelay?, keywords? }` or nothing
    #[wasm_bindgen(constructor)]
    pub fn js_new(options: JsValue) -> Result<WasmAutoHyperlink, JsValue> {
        let config: AutoLinkConfig = if options.is_undefined() || options.is_null() {
            AutoLinkConfig::default()
        } else {
            serde_wasm_bindgen::from_value(options)
                .map_err(|e| JsValue::from_str(&format!("Failed to parse options: {}", e)))?
        };
        Self::from_config(config)
    }

    /// Start observing an element id or an element. Refusals are logged and
    /// reported as `false`.
    #[wasm_bindgen(js_name = "observe")]
    pub fn js_observe(&self, target: JsValue) -> bool {
        let target = if let Some(id) = target.as_string() {
            ObserveTarget::ElementId(id)
        } else if let Some(node) = self.doc.borrow().id_of_value(&target) {
            ObserveTarget::Node(node)
        } else {
            tracing::error!("[AutoHyperlink] observe target must be an element id or element");
            return false;
        };
        if self.session.observe(target, Instant::now()).is_err() {
            return false;
        }
        self.driver.install();
        self.driver.arm();
        true
    }

    /// Deliver mutations and run every due cycle.
    /// Resolves to the number of cycles run.
    #[wasm_bindgen(js_name = "tick")]
    pub fn js_tick(&self) -> js_sys::Promise {
        let now = Instant::now();
        self.session.pump(now);
        let cycles = self.session.due_cycles(now);
        let driver = Rc::clone(&self.driver);
        future_to_promise(async move {
            let reports = join_all(cycles).await;
            driver.arm();
            Ok(JsValue::from(reports.len() as u32))
        })
    }

    /// Milliseconds until the next debounce deadline, if one is pending
    #[wasm_bindgen(js_name = "nextDeadlineMs")]
    pub fn js_next_deadline_ms(&self) -> Option<f64> {
        let deadline = self.session.next_deadline()?;
        let now = Instant::now();
        let wait = if deadline > now { deadline - now } else { Duration::ZERO };
        Some(wait.as_secs_f64() * 1000.0)
    }

    /// Characters committed for a container
    #[wasm_bindgen(js_name = "processedLength")]
    pub fn js_processed_length(&self, id: &str) -> Option<u32> {
        let root = self.container(id)?;
        self.session.processed_length(root).map(|n| n as u32)
    }

    /// Spans inside a container:
    /// `[{ element, term, keyword, description, link? }]`
    #[wasm_bindgen(js_name = "annotations")]
    pub fn js_annotations(&self, id: &str) -> Result<js_sys::Array, JsValue> {
        self.span_views(id)
    }

    /// Dispatch a click on a page node; returns "shown", "hidden" or "ignored"
    #[wasm_bindgen(js_name = "click")]
    pub fn js_click(&self, target: JsValue) -> String {
        let node = self.doc.borrow().id_of_value(&target);
        let outcome = match node {
            Some(node) => self.session.click(node),
            None => ClickOutcome::Ignored,
        };
        match outcome {
            ClickOutcome::Shown(_) => "shown",
            ClickOutcome::Hidden => "hidden",
            ClickOutcome::Ignored => "ignored",
        }
        .to_string()
    }

    /// The tooltip's fade-out finished
    #[wasm_bindgen(js_name = "transitionEnd")]
    pub fn js_transition_end(&self) -> bool {
        self.session.on_transition_end()
    }

    /// The tooltip element, while open or closing
    #[wasm_bindgen(js_name = "tooltipElement")]
    pub fn js_tooltip_element(&self) -> JsValue {
        self.session
            .tooltip_element()
            .and_then(|node| self.doc.borrow().node_ref(node))
            .map(JsValue::from)
            .unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = "cacheStats")]
    pub fn js_cache_stats(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.session.cache_stats()).unwrap_or(JsValue::NULL)
    }

    /// Route tooltip placement through JS callbacks, e.g.
    /// `setPlacement((a, t, o) => createPopper(a, t, o), p => p.destroy())`
    #[wasm_bindgen(js_name = "setPlacement")]
    pub fn js_set_placement(&self, create: js_sys::Function, destroy: js_sys::Function) {
        self.session.set_placement(Box::new(JsPlacement {
            create,
            destroy,
            doc: Rc::clone(&self.doc),
            instances: HashMap::new(),
            next: 0,
        }));
    }

    #[wasm_bindgen(js_name = "isObserving")]
    pub fn js_is_observing(&self) -> bool {
        self.session.is_initialized()
    }

    #[wasm_bindgen(js_name = "destroy")]
    pub fn js_destroy(&self) {
        self.driver.uninstall();
        self.session.destroy();
    }
}

// =============================================================================
// Tests
// =============================================================================
