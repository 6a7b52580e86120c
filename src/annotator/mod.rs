pub mod source;
pub mod cache;
pub mod segment;
pub mod matcher;
pub mod engine;
pub mod tracker;
pub mod watcher;
pub mod tooltip;
pub mod session;

pub use source::{Definition, DefinitionMap, DefinitionSource, FetchError, HttpDefinitionSource, StaticKeywordSource};
pub use cache::{CacheStats, DefinitionCache};
pub use segment::{Segmentation, TextUnit, UnitKind};
pub use matcher::{KeyClass, KeywordMatch, KeywordMatcher};
pub use engine::{AnnotatedSpan, ApplyTarget, LINK_CLASS, TERM_ATTRIBUTE, TOOLTIP_CLASS};
pub use tracker::{ContainerTracker, ObservedContainer, WatchPhase};
pub use watcher::{MutationWatcher, ObserverState};
pub use tooltip::{NoopPlacement, Placement, PlacementHandle, PlacementOptions, Side, TooltipContent, TooltipController};
pub use session::{AutoHyperlink, ClickOutcome, CycleReport, ObserveError, ObserveTarget};

#[cfg(test)]
mod tests;
