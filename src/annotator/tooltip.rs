//! TooltipController: The single definition popover
//!
//! Positioning is delegated to a [`Placement`] implementation (a floating
//! element library on the JS side). The controller only guarantees lifecycle:
//! - `show` tears down whatever tooltip exists before creating a new one,
//!   so the document never holds two.
//! - `hide` starts the close transition; the element is removed only once
//!   `on_transition_end` reports the transition finished.
//!
//! The controller never calls the placement primitive itself. Placement
//! handles are attached after the fact and released ones are queued for the
//! owner to destroy, so positioning code can read the document freely.

use crate::dom::{Dom, NodeId};

use super::engine::TOOLTIP_CLASS;
use super::source::Definition;

/// Class that makes the tooltip visible (drives the CSS opacity transition)
pub const VISIBLE_CLASS: &str = "visible";

/// Shown when a keyword arrived without a description
pub const FALLBACK_DESCRIPTION: &str = "No description available";

// =============================================================================
// Placement
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Top,
    Bottom,
}

/// Options forwarded to the placement primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementOptions {
    pub side: Side,
    /// (skidding, distance) in px
    pub offset: (i32, i32),
    /// Viewport padding for overflow prevention, px
    pub overflow_padding: i32,
}

impl Default for PlacementOptions {
    fn default() -> Self {
        Self {
            side: Side::Top,
            offset: (0, 8),
            overflow_padding: 5,
        }
    }
}

/// Opaque handle returned by a placement primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlacementHandle(pub u32);

/// External floating-element placement
pub trait Placement {
    fn create(&mut self, anchor: NodeId, floating: NodeId, options: &PlacementOptions) -> PlacementHandle;
    fn destroy(&mut self, handle: PlacementHandle);
}

/// Placement that positions nothing; hands out sequential handles
#[derive(Debug, Default)]
pub struct NoopPlacement {
    next: u32,
    live: Vec<PlacementHandle>,
}

impl NoopPlacement {
    pub fn live(&self) -> &[PlacementHandle] {
        &self.live
    }
}

impl Placement for NoopPlacement {
    fn create(&mut self, _anchor: NodeId, _floating: NodeId, _options: &PlacementOptions) -> PlacementHandle {
        let handle = PlacementHandle(self.next);
        self.next += 1;
        self.live.push(handle);
        handle
    }

    fn destroy(&mut self, handle: PlacementHandle) {
        self.live.retain(|&h| h != handle);
    }
}

// =============================================================================
// Content
// =============================================================================

/// What a tooltip shows for one term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TooltipContent {
    pub term: String,
    pub description: String,
    pub link: Option<String>,
}

impl TooltipContent {
    pub fn new(term: &str, definition: &Definition) -> Self {
        Self {
            term: term.to_string(),
            description: definition.description.clone(),
            link: definition.link.clone(),
        }
    }

    /// `<strong>term</strong>: description[<br><a …>More info</a>]`
    fn build(&self, doc: &mut dyn Dom, tooltip: NodeId) {
        let strong = doc.create_element("strong");
        let term = doc.create_text(&self.term);
        doc.append_child(strong, term);
        doc.append_child(tooltip, strong);

        let description = if self.description.trim().is_empty() {
            FALLBACK_DESCRIPTION
        } else {
            self.description.as_str()
        };
        let body = doc.create_text(&format!(": {}", description));
        doc.append_child(tooltip, body);

        if let Some(link) = self.link.as_deref().filter(|l| !l.trim().is_empty()) {
            let br = doc.create_element("br");
            doc.append_child(tooltip, br);
            let a = doc.create_element("a");
            doc.set_attribute(a, "href", link);
            doc.set_attribute(a, "target", "_blank");
            doc.set_attribute(a, "rel", "noopener noreferrer");
            let label = doc.create_text("More info");
            doc.append_child(a, label);
            doc.append_child(tooltip, a);
        }
    }
}

// =============================================================================
// TooltipController
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveTooltip {
    element: NodeId,
    anchor: NodeId,
    placement: Option<PlacementHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TooltipState {
    Hidden,
    Open(ActiveTooltip),
    Closing(ActiveTooltip),
}

#[derive(Debug)]
pub struct TooltipController {
    state: TooltipState,
    options: PlacementOptions,
    /// Handles of removed tooltips, waiting for `Placement::destroy`
    released: Vec<PlacementHandle>,
}

impl Default for TooltipController {
    fn default() -> Self {
        Self::new()
    }
}

impl TooltipController {
    pub fn new() -> Self {
        Self {
            state: TooltipState::Hidden,
            options: PlacementOptions::default(),
            released: Vec::new(),
        }
    }

    pub fn options(&self) -> PlacementOptions {
        self.options
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, TooltipState::Open(_))
    }

    pub fn is_closing(&self) -> bool {
        matches!(self.state, TooltipState::Closing(_))
    }

    /// Tooltip element, open or closing
    pub fn element(&self) -> Option<NodeId> {
        match self.state {
            TooltipState::Open(t) | TooltipState::Closing(t) => Some(t.element),
            TooltipState::Hidden => None,
        }
    }

    pub fn anchor(&self) -> Option<NodeId> {
        match self.state {
            TooltipState::Open(t) => Some(t.anchor),
            _ => None,
        }
    }

    /// Replace any existing tooltip with one anchored at `anchor`
    pub fn show(&mut self, doc: &mut dyn Dom, anchor: NodeId, content: &TooltipContent) -> NodeId {
        self.teardown(doc);

        let element = doc.create_element("div");
        doc.add_class(element, TOOLTIP_CLASS);
        content.build(doc, element);
        let body = doc.body();
        doc.append_child(body, element);
        doc.add_class(element, VISIBLE_CLASS);

        self.state = TooltipState::Open(ActiveTooltip {
            element,
            anchor,
            placement: None,
        });
        element
    }

    /// Record the placement created for `element`. Returns false when that
    /// tooltip is already gone; the caller then owns the handle.
    pub fn attach_placement(&mut self, element: NodeId, handle: PlacementHandle) -> bool {
        match &mut self.state {
            TooltipState::Open(active) | TooltipState::Closing(active)
                if active.element == element && active.placement.is_none() =>
            {
                active.placement = Some(handle);
                true
            }
            _ => false,
        }
    }

    /// Begin closing. Returns false if nothing was open.
    pub fn hide(&mut self, doc: &mut dyn Dom) -> bool {
        match self.state {
            TooltipState::Open(active) => {
                doc.remove_class(active.element, VISIBLE_CLASS);
                self.state = TooltipState::Closing(active);
                true
            }
            _ => false,
        }
    }

    /// The close transition finished: remove the element
    pub fn on_transition_end(&mut self, doc: &mut dyn Dom) -> bool {
        match self.state {
            TooltipState::Closing(_) => {
                self.teardown(doc);
                true
            }
            _ => false,
        }
    }

    /// Remove any tooltip immediately, skipping the transition
    pub fn teardown(&mut self, doc: &mut dyn Dom) {
        if let TooltipState::Open(active) | TooltipState::Closing(active) = self.state {
            self.released.extend(active.placement);
            doc.remove(active.element);
        }
        self.state = TooltipState::Hidden;
    }

    /// Placement handles to destroy, oldest first
    pub fn take_released(&mut self) -> Vec<PlacementHandle> {
        std::mem::take(&mut self.released)
    }
}
