//! AnnotationEngine: Rewrite matched keywords into interactive spans
//!
//! Walks text nodes under a container (or a single text node), runs the
//! [`KeywordMatcher`] over each, and replaces a node with
//! `text, <a>term</a>, text, ...` only when at least one match had a
//! definition. Text already inside a span, or inside the tooltip, is never
//! selected again.
//!
//! The engine writes to the document unconditionally; the session suspends
//! the mutation watcher around every call.

use crate::dom::{Dom, NodeId};

use super::matcher::KeywordMatcher;
use super::source::{Definition, DefinitionMap};

/// Class carried by every annotated span
pub const LINK_CLASS: &str = "auto-hyperlink-link";

/// Class carried by the tooltip element
pub const TOOLTIP_CLASS: &str = "auto-hyperlink-tooltip";

/// Attribute holding the matched term
pub const TERM_ATTRIBUTE: &str = "data-term";

// =============================================================================
// Types
// =============================================================================

/// Where to apply annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyTarget {
    /// Every eligible text node in the subtree
    Container(NodeId),
    /// Just this text node
    TextNode(NodeId),
}

/// A span created by [`apply`]
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedSpan {
    /// The `<a>` element
    pub node: NodeId,
    /// Matched text, as it appeared in the document
    pub term: String,
    /// Definition key the term resolved to
    pub keyword: String,
    pub definition: Definition,
}

// =============================================================================
// Core Functions
// =============================================================================

/// True for non-blank text nodes outside spans and tooltips
pub fn is_annotatable(doc: &dyn Dom, node: NodeId) -> bool {
    let Some(text) = doc.text(node) else {
        return false;
    };
    if text.trim().is_empty() {
        return false;
    }
    doc.closest_with_class(node, LINK_CLASS).is_none()
        && doc.closest_with_class(node, TOOLTIP_CLASS).is_none()
}

/// Rewrite matching keywords under `target`. Returns the spans created, in
/// document order.
pub fn apply(doc: &mut dyn Dom, target: ApplyTarget, definitions: &DefinitionMap) -> Vec<AnnotatedSpan> {
    if definitions.is_empty() {
        return Vec::new();
    }
    let Some(matcher) = KeywordMatcher::build(definitions) else {
        return Vec::new();
    };

    let nodes = match target {
        ApplyTarget::Container(root) => {
            if doc.has_class(root, TOOLTIP_CLASS) {
                return Vec::new();
            }
            let candidates = doc.text_nodes(root);
            candidates
                .into_iter()
                .filter(|&n| is_annotatable(&*doc, n))
                .collect()
        }
        ApplyTarget::TextNode(node) if is_annotatable(&*doc, node) => vec![node],
        ApplyTarget::TextNode(_) => Vec::new(),
    };

    tracing::debug!(
        "[AnnotationEngine] {} text nodes, pattern {}",
        nodes.len(),
        matcher.pattern()
    );

    let mut spans = Vec::new();
    for node in nodes {
        spans.extend(rewrite_text_node(doc, node, &matcher, definitions));
    }
    spans
}

/// Replace one text node with text/span pieces. Leaves the node alone when
/// nothing matched.
fn rewrite_text_node(
    doc: &mut dyn Dom,
    node: NodeId,
    matcher: &KeywordMatcher,
    definitions: &DefinitionMap,
) -> Vec<AnnotatedSpan> {
    let Some(original) = doc.text(node) else {
        return Vec::new();
    };
    if doc.parent(node).is_none() {
        return Vec::new();
    }

    let mut pieces: Vec<NodeId> = Vec::new();
    let mut spans: Vec<AnnotatedSpan> = Vec::new();
    let mut last = 0;

    for m in matcher.find_matches(&original) {
        let Some((keyword, definition)) = matcher.lookup(m.text, definitions) else {
            continue;
        };
        if m.start > last {
            pieces.push(doc.create_text(&original[last..m.start]));
        }
        let span = create_span(doc, m.text);
        pieces.push(span);
        spans.push(AnnotatedSpan {
            node: span,
            term: m.text.to_string(),
            keyword: keyword.to_string(),
            definition: definition.clone(),
        });
        last = m.end;
    }

    if spans.is_empty() {
        return spans;
    }
    if last < original.len() {
        pieces.push(doc.create_text(&original[last..]));
    }

    doc.replace_with(node, &pieces);
    spans
}

fn create_span(doc: &mut dyn Dom, term: &str) -> NodeId {
    let a = doc.create_element("a");
    doc.add_class(a, LINK_CLASS);
    doc.set_attribute(a, "href", "javascript:void(0)");
    doc.set_attribute(a, TERM_ATTRIBUTE, term);
    let text = doc.create_text(term);
    doc.append_child(a, text);
    a
}

// =============================================================================
// Tests
// =============================================================================
