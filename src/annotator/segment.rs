//! SegmentExtractor: Split newly appended text into analyzable units
//!
//! Given a container's full text and how much of it was already committed,
//! the unprocessed suffix is cut at sentence delimiters. Each delimiter closes
//! a complete unit (delimiter included). Whatever follows the last delimiter
//! becomes a remainder unit: a live stream may never send terminal
//! punctuation, so remainders are submitted too.
//!
//! Offsets are in characters (Unicode scalar values), not bytes.

use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Unit delimiters, in priority order
pub const DELIMITERS: [char; 7] = ['.', '。', '?', '？', '!', '！', '\n'];

/// New text shorter than this (after trimming) is left for a later cycle
pub const MIN_NEW_TEXT_CHARS: usize = 5;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    /// Ended on a delimiter
    Complete,
    /// Trailing text with no delimiter yet
    Remainder,
}

/// One unit ready for extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    /// Trimmed unit text (the cache key)
    pub text: String,
    /// Char offset of the untrimmed unit start in the full text
    pub start: usize,
    /// Char offset one past the untrimmed unit end
    pub end: usize,
    pub kind: UnitKind,
}

impl TextUnit {
    pub fn is_complete(&self) -> bool {
        self.kind == UnitKind::Complete
    }
}

/// Output of one extraction pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segmentation {
    pub units: Vec<TextUnit>,
    /// Char length of the full text the units were cut from
    pub full_length: usize,
}

// =============================================================================
// Core Functions
// =============================================================================

/// Char offset one past the next delimiter at or after `from`, if any
pub fn find_next_segment_end(chars: &[char], from: usize) -> Option<usize> {
    chars
        .iter()
        .skip(from)
        .position(|c| DELIMITERS.contains(c))
        .map(|offset| from + offset + 1)
}

/// Cut the text after `processed_length` into units
pub fn segment(full_text: &str, processed_length: usize) -> Segmentation {
    let chars: Vec<char> = full_text.chars().collect();
    let mut result = Segmentation {
        units: Vec::new(),
        full_length: chars.len(),
    };

    if processed_length >= chars.len() {
        return result;
    }

    let suffix = &chars[processed_length..];
    if trimmed_len(suffix) < MIN_NEW_TEXT_CHARS {
        return result;
    }

    let mut start = 0;
    while let Some(end) = find_next_segment_end(suffix, start) {
        push_unit(&mut result.units, suffix, processed_length, start, end, UnitKind::Complete);
        start = end;
    }
    push_unit(&mut result.units, suffix, processed_length, start, suffix.len(), UnitKind::Remainder);

    result
}

fn push_unit(
    units: &mut Vec<TextUnit>,
    suffix: &[char],
    base: usize,
    start: usize,
    end: usize,
    kind: UnitKind,
) {
    let raw: String = suffix[start..end].iter().collect();
    let text = raw.trim();
    if text.is_empty() {
        return;
    }
    units.push(TextUnit {
        text: text.to_string(),
        start: base + start,
        end: base + end,
        kind,
    });
}

/// Length after trimming whitespace at both ends
fn trimmed_len(chars: &[char]) -> usize {
    let first = chars.iter().position(|c| !c.is_whitespace());
    let last = chars.iter().rposition(|c| !c.is_whitespace());
    match (first, last) {
        (Some(first), Some(last)) => last - first + 1,
        _ => 0,
    }
}

// =============================================================================
// Tests
// =============================================================================
