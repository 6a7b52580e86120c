//! Keyspot: Incremental keyword hyperlinking for streaming text
//!
//! A Rust/WASM implementation of the KittClouds auto-hyperlink pipeline.
//! Text grows inside observed containers (a chat transcript, a token
//! stream); new text is cut into sentence units, each unit is sent once to a
//! keyword extraction service, and matching keywords are rewritten into
//! clickable spans that open a definition tooltip.
//!
//! # Architecture
//!
//! ## Document
//! - `dom/mod.rs` - Dom: the host tree trait, NodeId handles, mutation records
//! - `dom/arena.rs` - Document: arena tree, used natively and in tests
//! - `dom/web.rs` - WebDocument: the live page via web_sys (wasm32)
//!
//! ## Annotator
//! - `source.rs` - DefinitionSource: extraction service boundary (HTTP, static list)
//! - `cache.rs` - DefinitionCache: one fetch per distinct unit text
//! - `segment.rs` - SegmentExtractor: delimiter-based units of new text
//! - `matcher.rs` - KeywordMatcher: longest-first, language-aware pattern
//! - `engine.rs` - AnnotationEngine: text node → text + span rewriting
//! - `tracker.rs` - ContainerTracker: processed length + debounce phase per root
//! - `watcher.rs` - MutationWatcher: record mapping, self-write suppression
//! - `tooltip.rs` - TooltipController: single popover lifecycle
//! - `session.rs` - AutoHyperlink: owns the above, runs processing cycles
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { AutoHyperlink } from 'keyspot';
//!
//! await init();
//!
//! const linker = new AutoHyperlink({ debounceDelay: 700 });
//! linker.setPlacement((anchor, tooltip, options) => createPopper(anchor, tooltip, options),
//!                     (popper) => popper.destroy());
//! linker.observe('chat');
//!
//! // Streamed text is picked up by the MutationObserver and annotated once
//! // the stream goes quiet
//! document.getElementById('chat').append('大模型很强大。');
//!
//! console.log(linker.annotations('chat'));
//! console.log(linker.cacheStats());
//! linker.destroy();
//! ```

pub mod dom;
pub mod config;
pub mod annotator;
#[cfg(target_arch = "wasm32")]
pub mod wasm;

// Public exports
pub use dom::{Document, Dom, MutationKind, MutationRecord, NodeId};
pub use config::AutoLinkConfig;
pub use annotator::*;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Install panic hook and console logging
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    #[cfg(target_arch = "wasm32")]
    tracing_wasm::set_as_global_default();
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("keyspot v{}", env!("CARGO_PKG_VERSION"))
}
