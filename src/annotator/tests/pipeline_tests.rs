//! Incremental annotation: debounce, segmentation, caching, progress

use futures::future::FutureExt;
use std::rc::Rc;

use super::{chat_document, defs, ms, DeferredSource, Harness, MapSource, DEBOUNCE};
use crate::annotator::session::{AutoHyperlink, ObserveError, STYLE_ELEMENT_ID};
use crate::annotator::source::{Definition, DefinitionMap};
use crate::annotator::tracker::WatchPhase;
use crate::annotator::watcher::ObserverState;
use crate::annotator::CacheStats;
use crate::config::AutoLinkConfig;
use crate::dom::Dom;

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn test_streamed_sentence_gets_annotated() {
    let source = MapSource::with(&[("大模型很强大。", defs(&[("大模型", "Large language model")]))]);
    let h = Harness::new(source.clone());

    h.stream("大模型很强大。");
    let reports = h.settle(h.t0 + ms(10));

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].units_submitted, 1);
    assert_eq!(reports[0].spans_created, 1);
    assert_eq!(h.processed(), Some(7));
    assert_eq!(
        h.html(),
        "<div id=\"chat\"><a class=\"auto-hyperlink-link\" data-term=\"大模型\" \
         href=\"javascript:void(0)\">大模型</a>很强大。</div>"
    );
    assert_eq!(source.calls.borrow().as_slice(), ["大模型很强大。"]);
}

#[test]
fn test_cycle_waits_for_quiet_period() {
    let source = MapSource::with(&[]);
    let h = Harness::new(source.clone());
    let t1 = h.t0 + ms(10);

    h.stream("Tokens keep arriving.");
    h.pump(t1);
    assert!(h.run_due(t1 + DEBOUNCE - ms(1)).is_empty());

    // Another token re-arms the deadline
    h.stream(" More.");
    h.pump(t1 + ms(400));
    assert!(h.run_due(t1 + DEBOUNCE).is_empty());
    assert_eq!(h.run_due(t1 + ms(400) + DEBOUNCE).len(), 1);
    assert_eq!(source.call_count(), 2);
}

#[test]
fn test_content_present_before_observe_is_processed() {
    let source = MapSource::with(&[("Rust compiles to WASM.", defs(&[("WASM", "WebAssembly")]))]);
    let doc = chat_document(Some("Rust compiles to WASM."));
    let session = AutoHyperlink::with_source(doc.clone(), AutoLinkConfig::default(), source);
    let h = Harness::observed(doc, session, "chat");

    assert_eq!(h.session.spans().len(), 1);
    assert_eq!(h.processed(), Some("Rust compiles to WASM.".chars().count()));
}

// ============================================================================
// Progress tracking
// ============================================================================

#[test]
fn test_definition_miss_leaves_text_but_advances() {
    let source = MapSource::with(&[]);
    let h = Harness::new(source.clone());

    h.stream("Nothing worth linking here.");
    let before = h.html();
    h.settle(h.t0 + ms(10));

    assert_eq!(h.html(), before);
    assert_eq!(h.processed(), Some(h.text().chars().count()));
    assert_eq!(source.call_count(), 1);
}

#[test]
fn test_short_delta_is_deferred() {
    let source = MapSource::with(&[]);
    let h = Harness::new(source.clone());

    h.stream("ok");
    let reports = h.settle(h.t0 + ms(10));
    assert_eq!(reports[0].units_submitted, 0);
    assert_eq!(source.call_count(), 0);
    assert_eq!(h.processed(), Some(0));

    // Picked up once enough text accumulates
    h.stream(", the stream goes on.");
    h.settle(h.t0 + ms(2000));
    assert_eq!(source.calls.borrow().as_slice(), ["ok, the stream goes on."]);
    assert_eq!(h.processed(), Some(h.text().chars().count()));
}

#[test]
fn test_only_new_text_is_submitted() {
    let source = MapSource::with(&[]);
    let h = Harness::new(source.clone());

    h.stream("First sentence. Second");
    h.settle(h.t0 + ms(10));
    h.stream(" half arrives.");
    h.settle(h.t0 + ms(2000));

    assert_eq!(
        source.calls.borrow().as_slice(),
        ["First sentence.", "Second", "half arrives."]
    );
}

#[test]
fn test_remainder_without_delimiter_is_annotated() {
    let source = MapSource::with(&[("The DOM is", defs(&[("DOM", "Document Object Model")]))]);
    let h = Harness::new(source);

    h.stream("The DOM is");
    let reports = h.settle(h.t0 + ms(10));
    assert_eq!(reports[0].spans_created, 1);
    assert_eq!(h.processed(), Some(10));
}

#[test]
fn test_out_of_order_completion_never_lowers_progress() {
    let source = Rc::new(DeferredSource::default());
    let h = Harness::new(source.clone());
    let t1 = h.t0 + ms(10);

    h.stream("First sentence here.");
    h.pump(t1);
    let mut first = h.session.due_cycles(t1 + DEBOUNCE).pop().unwrap();
    assert!((&mut first).now_or_never().is_none());

    // More text lands while the first fetch is in flight
    let t2 = t1 + ms(100);
    h.stream(" Second one too.");
    assert_eq!(h.pump(t2), 1);
    let mut second = h.session.due_cycles(t2 + DEBOUNCE).pop().unwrap();
    assert!((&mut second).now_or_never().is_none());

    // The later cycle finishes first
    assert!(source.respond("First sentence here.", DefinitionMap::new()));
    assert!((&mut second).now_or_never().is_none());
    assert!(source.respond("Second one too.", DefinitionMap::new()));
    let report = (&mut second).now_or_never().unwrap();
    let full = h.text().chars().count();
    assert_eq!(report.processed_length, full);

    assert!(source.respond("First sentence here.", DefinitionMap::new()));
    let report = (&mut first).now_or_never().unwrap();
    assert!(!report.stale);
    assert_eq!(report.processed_length, full);
    assert_eq!(h.processed(), Some(full));
    assert_eq!(h.session.phase(h.root), Some(WatchPhase::Idle));
}

#[test]
fn test_progress_never_exceeds_current_text() {
    let source = Rc::new(DeferredSource::default());
    let h = Harness::new(source.clone());
    let t1 = h.t0 + ms(10);

    let node = h.append_node("A sentence that will shrink.");
    h.pump(t1);
    let mut cycle = h.session.due_cycles(t1 + DEBOUNCE).pop().unwrap();
    assert!((&mut cycle).now_or_never().is_none());

    h.doc.borrow_mut().set_text(node, "Short.");
    assert!(source.respond("A sentence that will shrink.", DefinitionMap::new()));
    let report = (&mut cycle).now_or_never().unwrap();
    assert_eq!(report.processed_length, 6);
}

// ============================================================================
// Caching and failures
// ============================================================================

#[test]
fn test_identical_units_fetch_once() {
    let source = MapSource::with(&[("Hello world.", defs(&[("world", "the planet")]))]);
    let h = Harness::new(source.clone());

    h.stream("Hello world. Hello world.");
    let reports = h.settle(h.t0 + ms(10));

    assert_eq!(reports[0].units_submitted, 2);
    assert_eq!(source.call_count(), 1);
    assert_eq!(h.session.spans().len(), 2);
    let stats = h.session.cache_stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
}

#[test]
fn test_failed_fetch_is_retried_for_same_text() {
    let source = MapSource::with(&[("Retry this sentence.", defs(&[("Retry", "again")]))]);
    let h = Harness::new(source.clone());

    source.failing.set(true);
    h.stream("Retry this sentence.");
    let reports = h.settle(h.t0 + ms(10));
    assert_eq!(reports[0].spans_created, 0);
    assert_eq!(h.session.cache_stats().failures, 1);

    // The pipeline stays live and the same unit goes out again
    source.failing.set(false);
    h.stream(" Retry this sentence.");
    let reports = h.settle(h.t0 + ms(2000));
    assert_eq!(source.call_count(), 2);
    assert_eq!(reports[0].spans_created, 2);
}

#[test]
fn test_longest_keyword_wins() {
    let source = MapSource::with(&[(
        "机器学习很有趣。",
        defs(&[("机器", "machine"), ("机器学习", "machine learning")]),
    )]);
    let h = Harness::new(source);

    h.stream("机器学习很有趣。");
    h.settle(h.t0 + ms(10));

    let spans = h.session.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].term, "机器学习");
    assert_eq!(spans[0].definition.description, "machine learning");
}

// ============================================================================
// Re-entrancy
// ============================================================================

#[test]
fn test_own_rewrites_do_not_schedule_cycles() {
    let source = MapSource::with(&[("The DOM is a tree.", defs(&[("DOM", "d"), ("tree", "t")]))]);
    let h = Harness::new(source.clone());

    h.stream("The DOM is a tree.");
    let reports = h.settle(h.t0 + ms(10));
    assert_eq!(reports[0].spans_created, 2);

    assert_eq!(h.pump(h.t0 + ms(5000)), 0);
    assert_eq!(h.session.next_deadline(), None);
    assert_eq!(h.session.phase(h.root), Some(WatchPhase::Idle));
    assert_eq!(h.session.watcher_state(), ObserverState::Observing);
    assert_eq!(source.call_count(), 1);
}

#[test]
fn test_host_edit_during_rewrite_still_schedules() {
    let source = Rc::new(DeferredSource::default());
    let h = Harness::new(source.clone());
    let t1 = h.t0 + ms(10);

    h.stream("GPU kernels are fast.");
    h.pump(t1);
    let mut cycle = h.session.due_cycles(t1 + DEBOUNCE).pop().unwrap();
    assert!((&mut cycle).now_or_never().is_none());

    h.append_node(" Next token.");
    assert!(source.respond("GPU kernels are fast.", defs(&[("GPU", "graphics processor")])));
    let report = (&mut cycle).now_or_never().unwrap();
    assert_eq!(report.spans_created, 1);

    // The host's append is delivered after the rewrite
    assert_eq!(h.pump(t1 + ms(800)), 1);
    assert!(matches!(h.session.phase(h.root), Some(WatchPhase::Debouncing { .. })));
}

#[test]
fn test_rerun_over_annotated_text_changes_nothing() {
    let source = MapSource::with(&[("大模型很强大。", defs(&[("大模型", "LLM")]))]);
    let h = Harness::new(source.clone());
    h.stream("大模型很强大。");
    h.settle(h.t0 + ms(10));
    let html = h.html();

    // Start over: progress and cache reset, same text analyzed again
    h.session.destroy();
    let t1 = h.t0 + ms(5000);
    h.session.observe(h.root, t1).unwrap();
    let reports = h.run_due(t1);

    assert_eq!(reports[0].units_submitted, 1);
    assert_eq!(reports[0].spans_created, 0);
    assert_eq!(h.html(), html);
    assert_eq!(h.doc.borrow().pending_records(), 0);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_completion_after_destroy_is_dropped() {
    let source = Rc::new(DeferredSource::default());
    let h = Harness::new(source.clone());
    let t1 = h.t0 + ms(10);

    h.stream("Late answers are ignored.");
    h.pump(t1);
    let mut cycle = h.session.due_cycles(t1 + DEBOUNCE).pop().unwrap();
    assert!((&mut cycle).now_or_never().is_none());
    let before = h.html();

    h.session.destroy();
    assert!(source.respond("Late answers are ignored.", defs(&[("answers", "a")])));
    let report = (&mut cycle).now_or_never().unwrap();

    assert!(report.stale);
    assert_eq!(report.spans_created, 0);
    assert_eq!(h.html(), before);
    assert_eq!(h.processed(), None);
    assert!(h.session.spans().is_empty());
}

#[test]
fn test_answer_arriving_after_destroy_is_not_cached() {
    let source = Rc::new(DeferredSource::default());
    let h = Harness::new(source.clone());
    let t1 = h.t0 + ms(10);

    h.stream("Old answers stay old.");
    h.pump(t1);
    let mut cycle = h.session.due_cycles(t1 + DEBOUNCE).pop().unwrap();
    assert!((&mut cycle).now_or_never().is_none());

    h.session.destroy();
    assert!(source.respond("Old answers stay old.", defs(&[("answers", "stale")])));
    assert!((&mut cycle).now_or_never().unwrap().stale);
    assert_eq!(h.session.cache_stats().entries, 0);

    // A fresh observation asks the service again and uses the new answer
    let t2 = h.t0 + ms(5000);
    h.session.observe("chat", t2).unwrap();
    let mut rerun = h.session.due_cycles(t2).pop().unwrap();
    assert!((&mut rerun).now_or_never().is_none());
    assert_eq!(source.pending_count(), 1);
    assert!(source.respond("Old answers stay old.", defs(&[("answers", "fresh")])));
    assert_eq!((&mut rerun).now_or_never().unwrap().spans_created, 1);
    assert_eq!(h.session.spans()[0].definition.description, "fresh");
}

#[test]
fn test_detached_container_drops_completion() {
    let source = Rc::new(DeferredSource::default());
    let h = Harness::new(source.clone());
    let t1 = h.t0 + ms(10);

    h.stream("This container goes away.");
    h.pump(t1);
    let mut cycle = h.session.due_cycles(t1 + DEBOUNCE).pop().unwrap();
    assert!((&mut cycle).now_or_never().is_none());

    h.doc.borrow_mut().remove(h.root);
    assert!(source.respond("This container goes away.", defs(&[("container", "c")])));
    assert!((&mut cycle).now_or_never().unwrap().stale);
    assert_eq!(source.pending_count(), 0);
}

#[test]
fn test_observe_rejects_bad_targets_and_double_init() {
    let source = MapSource::with(&[]);
    let h = Harness::new(source);
    let now = h.t0;

    assert_eq!(
        h.session.observe("chat", now),
        Err(ObserveError::AlreadyInitialized)
    );

    h.session.destroy();
    assert_eq!(
        h.session.observe("missing", now),
        Err(ObserveError::UnknownElementId("missing".into()))
    );
    let text = h.append_node("plain");
    assert_eq!(h.session.observe(text, now), Err(ObserveError::NotAnElement(text)));
    let orphan = h.doc.borrow_mut().create_element("div");
    assert_eq!(h.session.observe(orphan, now), Err(ObserveError::NotConnected(orphan)));
    assert!(!h.session.is_initialized());

    assert_eq!(h.session.observe("chat", now), Ok(h.root));
    assert!(h.session.is_initialized());
}

#[test]
fn test_destroy_releases_everything_and_is_repeatable() {
    let source = MapSource::with(&[("Destroy me now.", defs(&[("Destroy", "d")]))]);
    let h = Harness::new(source);
    h.stream("Destroy me now.");
    h.settle(h.t0 + ms(10));
    assert!(h.doc.borrow().get_element_by_id(STYLE_ELEMENT_ID).is_some());

    h.session.destroy();
    h.session.destroy();

    assert!(h.doc.borrow().get_element_by_id(STYLE_ELEMENT_ID).is_none());
    assert_eq!(h.session.watcher_state(), ObserverState::Detached);
    assert_eq!(h.session.cache_stats(), CacheStats::default());
    assert_eq!(h.session.processed_length(h.root), None);
    assert!(!h.session.is_initialized());

    // Edits after teardown are not observed
    h.stream(" More text after teardown.");
    assert_eq!(h.pump(h.t0 + ms(3000)), 0);
}

#[test]
fn test_static_keyword_list_needs_no_service() {
    let config = AutoLinkConfig::default().with_keywords(vec!["Rust".into(), "WASM".into()]);
    let doc = chat_document(None);
    let session = AutoHyperlink::new(doc.clone(), config);
    let h = Harness::observed(doc, session, "chat");

    h.stream("rust targets WASM.");
    let reports = h.settle(h.t0 + ms(10));

    assert_eq!(reports[0].spans_created, 2);
    let spans = h.session.spans();
    assert_eq!(spans[0].term, "rust");
    assert_eq!(spans[0].keyword, "Rust");
    assert_eq!(spans[0].definition, Definition::default());
}
