//! KeywordMatcher: Keys → one case-insensitive pattern
//!
//! Pure function of the definition map, no DOM involved.
//!
//! | Key class | Example      | Wrapped as                         |
//! |-----------|--------------|------------------------------------|
//! | Cjk       | `大模型`      | `大模型` (no boundary concept)      |
//! | Word      | `DOM`        | `\bDOM\b` (ASCII word boundaries)  |
//! | Mixed     | `Node.js`    | boundary only on word-char edges   |
//!
//! Keys are ordered longest first so the leftmost-first alternation never lets
//! `机器` pre-empt `机器学习`.

use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

use super::source::{Definition, DefinitionMap};

/// ASCII word boundary. Matches JS `\b`: CJK characters count as non-word.
const ASCII_BOUNDARY: &str = r"(?-u:\b)";

// =============================================================================
// Key classification
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    /// Contains at least one CJK ideograph
    Cjk,
    /// `^[A-Za-z0-9_]+$`
    Word,
    /// Anything else that is not blank ("machine learning", "C++")
    Mixed,
}

fn is_cjk_ideograph(c: char) -> bool {
    matches!(c, '\u{3400}'..='\u{4DBF}' | '\u{4E00}'..='\u{9FFF}')
}

fn is_ascii_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Classify a key; blank keys are never matched
pub fn classify(key: &str) -> Option<KeyClass> {
    if key.trim().is_empty() {
        None
    } else if key.chars().any(is_cjk_ideograph) {
        Some(KeyClass::Cjk)
    } else if key.chars().all(is_ascii_word) {
        Some(KeyClass::Word)
    } else {
        Some(KeyClass::Mixed)
    }
}

/// Regex fragment for one key
fn key_fragment(key: &str, class: KeyClass) -> String {
    let escaped = regex::escape(key);
    match class {
        KeyClass::Cjk => escaped,
        KeyClass::Word => format!("{ASCII_BOUNDARY}{escaped}{ASCII_BOUNDARY}"),
        KeyClass::Mixed => {
            let lead = key.chars().next().is_some_and(is_ascii_word);
            let trail = key.chars().last().is_some_and(is_ascii_word);
            format!(
                "{}{}{}",
                if lead { ASCII_BOUNDARY } else { "" },
                escaped,
                if trail { ASCII_BOUNDARY } else { "" }
            )
        }
    }
}

/// Keys ordered longest first (by chars), ties broken by key text
pub fn ordered_keys<'a, I>(keys: I) -> Vec<(&'a str, KeyClass)>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut keyed: Vec<(&str, KeyClass)> = keys
        .into_iter()
        .filter_map(|k| classify(k).map(|class| (k.as_str(), class)))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });
    keyed
}

/// Pattern source for a key set, or None if nothing is matchable
pub fn build_pattern<'a, I>(keys: I) -> Option<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let fragments: Vec<String> = ordered_keys(keys)
        .into_iter()
        .map(|(key, class)| key_fragment(key, class))
        .collect();
    if fragments.is_empty() {
        return None;
    }
    Some(format!("(?:{})", fragments.join("|")))
}

// =============================================================================
// KeywordMatcher
// =============================================================================

/// A keyword occurrence (byte offsets into the scanned text)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordMatch<'t> {
    pub start: usize,
    pub end: usize,
    pub text: &'t str,
}

/// Compiled pattern plus a case-folded key index
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    regex: Regex,
    folded: HashMap<String, String>,
}

impl KeywordMatcher {
    /// Compile a matcher for the map's keys
    pub fn build(definitions: &DefinitionMap) -> Option<Self> {
        let pattern = build_pattern(definitions.keys())?;
        let regex = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(regex) => regex,
            Err(e) => {
                tracing::error!("[KeywordMatcher] pattern failed to compile: {}", e);
                return None;
            }
        };

        let mut folded = HashMap::new();
        for (key, _) in ordered_keys(definitions.keys()) {
            folded.entry(key.to_lowercase()).or_insert_with(|| key.to_string());
        }

        Some(Self { regex, folded })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Non-overlapping matches, left to right
    pub fn find_matches<'t>(&self, text: &'t str) -> Vec<KeywordMatch<'t>> {
        self.regex
            .find_iter(text)
            .map(|m| KeywordMatch {
                start: m.start(),
                end: m.end(),
                text: m.as_str(),
            })
            .collect()
    }

    /// Definition for matched text: exact key, lowercase key, then any key
    /// equal under case folding
    pub fn lookup<'d>(
        &self,
        matched: &str,
        definitions: &'d DefinitionMap,
    ) -> Option<(&'d str, &'d Definition)> {
        let lower = matched.to_lowercase();
        let found = [matched, lower.as_str()]
            .into_iter()
            .chain(self.folded.get(&lower).map(String::as_str))
            .find_map(|key| definitions.get_key_value(key))
            .map(|(k, v)| (k.as_str(), v));
        found
    }
}

// =============================================================================
// Tests
// =============================================================================
