//! MutationWatcher: Map mutation records to containers and debounce them
//!
//! # Observer states
//! ```text
//! Detached ──attach──▶ Observing ──suspend──▶ Suspended
//!     ▲                    │  ▲                   │
//!     └──────detach────────┘  └──────resume───────┘
//! ```
//! Suspended is entered around the pipeline's own DOM writes. While in it,
//! every record is discarded, so a rewrite can never schedule another cycle
//! over the same content.

use instant::Instant;
use std::time::Duration;

use crate::dom::{Dom, MutationRecord, NodeId};

use super::engine::TOOLTIP_CLASS;
use super::tracker::ContainerTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    Detached,
    Observing,
    Suspended,
}

#[derive(Debug)]
pub struct MutationWatcher {
    state: ObserverState,
    debounce: Duration,
    /// Host records drained at suspension time, delivered on the next pump
    deferred: Vec<MutationRecord>,
    discarded: u64,
}

impl MutationWatcher {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: ObserverState::Detached,
            debounce,
            deferred: Vec::new(),
            discarded: 0,
        }
    }

    pub fn state(&self) -> ObserverState {
        self.state
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Records dropped while suspended
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Observe every registered root
    pub fn attach(&mut self, doc: &mut dyn Dom, roots: &[NodeId]) {
        for &root in roots {
            doc.observe(root);
        }
        self.state = ObserverState::Observing;
    }

    pub fn detach(&mut self, doc: &mut dyn Dom) {
        doc.disconnect();
        self.deferred.clear();
        self.state = ObserverState::Detached;
    }

    /// Stop observing before a self-inflicted write. Pending host records are
    /// kept aside so the host's own edits still get debounced.
    pub fn suspend(&mut self, doc: &mut dyn Dom) {
        if self.state != ObserverState::Observing {
            return;
        }
        self.deferred.extend(doc.take_records());
        doc.disconnect();
        self.state = ObserverState::Suspended;
    }

    /// Re-attach to the registered roots (not to whatever node was written)
    pub fn resume(&mut self, doc: &mut dyn Dom, roots: &[NodeId]) {
        if self.state != ObserverState::Suspended {
            return;
        }
        self.attach(doc, roots);
    }

    /// Registered container a record belongs to, if any
    pub fn map_record(
        &self,
        doc: &dyn Dom,
        tracker: &ContainerTracker,
        record: &MutationRecord,
    ) -> Option<NodeId> {
        let target = record.target;
        if doc.closest_with_class(target, TOOLTIP_CLASS).is_some() {
            return None;
        }
        let roots = tracker.roots();
        if let Some(&root) = roots.iter().find(|&&r| r == target) {
            return Some(root);
        }
        if let Some(parent) = doc.parent(target) {
            if let Some(&root) = roots.iter().find(|&&r| r == parent) {
                return Some(root);
            }
        }
        roots.into_iter().find(|&r| doc.contains(r, target))
    }

    /// Arm debounce deadlines for a batch of records. Returns how many
    /// records were mapped to a container.
    pub fn handle_records(
        &mut self,
        doc: &dyn Dom,
        tracker: &mut ContainerTracker,
        records: &[MutationRecord],
        now: Instant,
    ) -> usize {
        if self.state == ObserverState::Suspended {
            self.discarded += records.len() as u64;
            return 0;
        }
        let mut mapped = 0;
        for record in records {
            if let Some(root) = self.map_record(doc, tracker, record) {
                tracker.arm(root, now + self.debounce);
                mapped += 1;
            }
        }
        mapped
    }

    /// Deliver deferred and queued records
    pub fn pump(&mut self, doc: &mut dyn Dom, tracker: &mut ContainerTracker, now: Instant) -> usize {
        let mut records = std::mem::take(&mut self.deferred);
        records.extend(doc.take_records());
        if records.is_empty() {
            return 0;
        }
        self.handle_records(&*doc, tracker, &records, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotator::tracker::WatchPhase;
    use crate::dom::{Document, MutationKind};

    const DEBOUNCE: Duration = Duration::from_millis(700);

    struct Fixture {
        doc: Document,
        tracker: ContainerTracker,
        watcher: MutationWatcher,
        root: NodeId,
        text: NodeId,
    }

    fn fixture() -> Fixture {
        let mut doc = Document::new();
        let root = doc.create_element("div");
        let body = doc.body();
        doc.append_child(body, root);
        let p = doc.create_element("p");
        doc.append_child(root, p);
        let text = doc.create_text("hello");
        doc.append_child(p, text);

        let mut tracker = ContainerTracker::new();
        tracker.register(root);
        let mut watcher = MutationWatcher::new(DEBOUNCE);
        watcher.attach(&mut doc, &[root]);
        Fixture { doc, tracker, watcher, root, text }
    }

    #[test]
    fn test_map_record_self_child_and_descendant() {
        let f = fixture();
        let p = f.doc.children(f.root)[0];
        for target in [f.root, p, f.text] {
            let record = MutationRecord { kind: MutationKind::ChildList, target };
            assert_eq!(f.watcher.map_record(&f.doc, &f.tracker, &record), Some(f.root));
        }

        let record = MutationRecord { kind: MutationKind::ChildList, target: f.doc.body() };
        assert_eq!(f.watcher.map_record(&f.doc, &f.tracker, &record), None);
    }

    #[test]
    fn test_pump_arms_debounce() {
        let mut f = fixture();
        let now = Instant::now();
        f.doc.append_text(f.text, " world");

        assert_eq!(f.watcher.pump(&mut f.doc, &mut f.tracker, now), 1);
        assert_eq!(
            f.tracker.phase(f.root),
            Some(WatchPhase::Debouncing { deadline: now + DEBOUNCE })
        );
    }

    #[test]
    fn test_burst_coalesces_to_last_mutation() {
        let mut f = fixture();
        let t0 = Instant::now();
        f.doc.append_text(f.text, "a");
        f.watcher.pump(&mut f.doc, &mut f.tracker, t0);
        f.doc.append_text(f.text, "b");
        f.watcher.pump(&mut f.doc, &mut f.tracker, t0 + Duration::from_millis(500));

        assert!(f.tracker.take_due(t0 + DEBOUNCE).is_empty());
        assert_eq!(
            f.tracker.take_due(t0 + Duration::from_millis(500) + DEBOUNCE),
            vec![f.root]
        );
    }

    #[test]
    fn test_suspended_discards_records() {
        let mut f = fixture();
        f.watcher.suspend(&mut f.doc);
        assert_eq!(f.watcher.state(), ObserverState::Suspended);
        assert!(!f.doc.is_observing());

        let record = MutationRecord { kind: MutationKind::CharacterData, target: f.text };
        let mapped = f.watcher.handle_records(&f.doc, &mut f.tracker, &[record], Instant::now());
        assert_eq!(mapped, 0);
        assert_eq!(f.watcher.discarded(), 1);
        assert_eq!(f.tracker.phase(f.root), Some(WatchPhase::Idle));
    }

    #[test]
    fn test_writes_while_suspended_are_invisible() {
        let mut f = fixture();
        f.watcher.suspend(&mut f.doc);
        f.doc.set_text(f.text, "rewritten");
        f.watcher.resume(&mut f.doc, &[f.root]);

        assert_eq!(f.watcher.state(), ObserverState::Observing);
        assert_eq!(f.watcher.pump(&mut f.doc, &mut f.tracker, Instant::now()), 0);
        assert_eq!(f.tracker.phase(f.root), Some(WatchPhase::Idle));
    }

    #[test]
    fn test_host_records_before_suspend_survive() {
        let mut f = fixture();
        let now = Instant::now();
        f.doc.append_text(f.text, " from host");
        f.watcher.suspend(&mut f.doc);
        f.watcher.resume(&mut f.doc, &[f.root]);

        assert_eq!(f.watcher.pump(&mut f.doc, &mut f.tracker, now), 1);
        assert!(matches!(f.tracker.phase(f.root), Some(WatchPhase::Debouncing { .. })));
    }

    #[test]
    fn test_tooltip_records_ignored() {
        let mut f = fixture();
        let tip = f.doc.create_element("div");
        f.doc.add_class(tip, TOOLTIP_CLASS);
        f.doc.append_child(f.root, tip);
        f.doc.take_records();

        let tip_text = f.doc.create_text("tip");
        f.doc.append_child(tip, tip_text);
        assert_eq!(f.watcher.pump(&mut f.doc, &mut f.tracker, Instant::now()), 0);
    }

    #[test]
    fn test_detach_stops_everything() {
        let mut f = fixture();
        f.watcher.detach(&mut f.doc);
        f.doc.append_text(f.text, "ignored");
        assert_eq!(f.watcher.state(), ObserverState::Detached);
        assert_eq!(f.watcher.pump(&mut f.doc, &mut f.tracker, Instant::now()), 0);
    }
}
