//! DefinitionCache: Memoized extraction results per text unit
//!
//! Keyed by the exact (trimmed) unit string. Only successful responses are
//! stored, so a transient failure is retried the next time the same text shows
//! up. No eviction: the cache lives as long as its session and is cleared on
//! teardown. A fetch that was in flight across a `clear()` is not stored.

use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::source::{DefinitionMap, DefinitionSource};

/// Characters of unit text shown in log lines
const LOG_PREVIEW_CHARS: usize = 50;

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub failures: u64,
}

/// Unit text → definitions.
///
/// Interior mutability keeps `resolve` usable through a shared reference while
/// a fetch is in flight; no borrow is held across the await.
#[derive(Debug, Default)]
pub struct DefinitionCache {
    entries: RefCell<HashMap<String, Rc<DefinitionMap>>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
    failures: Cell<u64>,
    /// Bumped by `clear()`
    generation: Cell<u64>,
}

impl DefinitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached definitions for `text`, if any
    pub fn get(&self, text: &str) -> Option<Rc<DefinitionMap>> {
        self.entries.borrow().get(text).cloned()
    }

    /// Cached definitions, or fetch and store them.
    /// Failures are logged and degrade to an empty, uncached map.
    pub async fn resolve(&self, text: &str, source: &dyn DefinitionSource) -> Rc<DefinitionMap> {
        if let Some(hit) = self.get(text) {
            self.hits.set(self.hits.get() + 1);
            tracing::debug!("[DefinitionCache] hit: {}...", preview(text));
            return hit;
        }

        self.misses.set(self.misses.get() + 1);
        tracing::debug!("[DefinitionCache] fetching: {}...", preview(text));

        let generation = self.generation.get();
        match source.fetch(text).await {
            Ok(map) => {
                let map = Rc::new(map);
                if self.generation.get() == generation {
                    self.entries
                        .borrow_mut()
                        .insert(text.to_string(), Rc::clone(&map));
                } else {
                    tracing::debug!("[DefinitionCache] cleared mid-fetch, not storing: {}...", preview(text));
                }
                map
            }
            Err(e) => {
                self.failures.set(self.failures.get() + 1);
                tracing::error!("[DefinitionCache] extraction failed: {}", e);
                Rc::new(DefinitionMap::new())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drop every entry and reset counters
    pub fn clear(&self) {
        self.generation.set(self.generation.get() + 1);
        self.entries.borrow_mut().clear();
        self.hits.set(0);
        self.misses.set(0);
        self.failures.set(0);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.get(),
            misses: self.misses.get(),
            failures: self.failures.get(),
        }
    }
}

/// First few characters of `text`, for logs
pub(crate) fn preview(text: &str) -> &str {
    match text.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
