//! ContainerTracker: Per-root progress and debounce state
//!
//! # State machine (per container)
//! ```text
//! Idle ──mutation──▶ Debouncing ──deadline──▶ Processing ──finish──▶ Idle
//!                        ▲  │ mutation (re-arm)        │ mutation
//!                        └──┘                          ▼
//!                                                 Debouncing
//! ```
//! A mutation during Processing arms a new cycle without waiting for the
//! in-flight one; `finish` only drops back to Idle from Processing.

use instant::Instant;

use crate::dom::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Idle,
    Debouncing { deadline: Instant },
    Processing,
}

/// One registered root
#[derive(Debug, Clone)]
pub struct ObservedContainer {
    pub root: NodeId,
    /// Characters already committed to analysis
    pub processed_length: usize,
    pub phase: WatchPhase,
}

/// Registered roots, in registration order
#[derive(Debug, Default)]
pub struct ContainerTracker {
    containers: Vec<ObservedContainer>,
}

impl ContainerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root. Returns false (and logs) if it is already registered.
    pub fn register(&mut self, root: NodeId) -> bool {
        if self.contains(root) {
            tracing::warn!("[ContainerTracker] container {:?} already registered", root);
            return false;
        }
        self.containers.push(ObservedContainer {
            root,
            processed_length: 0,
            phase: WatchPhase::Idle,
        });
        true
    }

    /// Forget a root, its counter and its pending deadline
    pub fn unregister(&mut self, root: NodeId) -> bool {
        let before = self.containers.len();
        self.containers.retain(|c| c.root != root);
        self.containers.len() != before
    }

    pub fn contains(&self, root: NodeId) -> bool {
        self.get(root).is_some()
    }

    pub fn get(&self, root: NodeId) -> Option<&ObservedContainer> {
        self.containers.iter().find(|c| c.root == root)
    }

    fn get_mut(&mut self, root: NodeId) -> Option<&mut ObservedContainer> {
        self.containers.iter_mut().find(|c| c.root == root)
    }

    pub fn roots(&self) -> Vec<NodeId> {
        self.containers.iter().map(|c| c.root).collect()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn processed_length(&self, root: NodeId) -> Option<usize> {
        self.get(root).map(|c| c.processed_length)
    }

    /// Move the counter forward. No-op unless `new_length` is larger.
    pub fn advance(&mut self, root: NodeId, new_length: usize) -> bool {
        match self.get_mut(root) {
            Some(c) if new_length > c.processed_length => {
                c.processed_length = new_length;
                true
            }
            _ => false,
        }
    }

    pub fn phase(&self, root: NodeId) -> Option<WatchPhase> {
        self.get(root).map(|c| c.phase)
    }

    /// (Re)start the debounce deadline; the latest mutation wins
    pub fn arm(&mut self, root: NodeId, deadline: Instant) -> bool {
        match self.get_mut(root) {
            Some(c) => {
                c.phase = WatchPhase::Debouncing { deadline };
                true
            }
            None => false,
        }
    }

    /// Roots whose deadline has passed, now marked Processing
    pub fn take_due(&mut self, now: Instant) -> Vec<NodeId> {
        let mut due = Vec::new();
        for c in &mut self.containers {
            if let WatchPhase::Debouncing { deadline } = c.phase {
                if deadline <= now {
                    c.phase = WatchPhase::Processing;
                    due.push(c.root);
                }
            }
        }
        due
    }

    /// Earliest pending deadline, for hosts that schedule a single timer
    pub fn next_deadline(&self) -> Option<Instant> {
        self.containers
            .iter()
            .filter_map(|c| match c.phase {
                WatchPhase::Debouncing { deadline } => Some(deadline),
                _ => None,
            })
            .min()
    }

    /// End of a processing cycle
    pub fn finish(&mut self, root: NodeId) {
        if let Some(c) = self.get_mut(root) {
            if c.phase == WatchPhase::Processing {
                c.phase = WatchPhase::Idle;
            }
        }
    }

    /// Drop every container (teardown)
    pub fn clear(&mut self) {
        self.containers.clear();
    }
}
