//! DefinitionSource: The keyword extraction boundary
//!
//! Everything behind this trait is an external collaborator. Two sources ship
//! with the crate:
//! - [`HttpDefinitionSource`]: `POST { "text": ... }` to the extraction service
//! - [`StaticKeywordSource`]: Aho-Corasick over a fixed keyword list, no network

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use futures::future::{self, FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Types
// =============================================================================

/// Payload attached to one keyword
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Definition {
    pub fn new(description: &str, link: Option<&str>) -> Self {
        Self {
            description: description.to_string(),
            link: link.map(str::to_string),
        }
    }
}

/// Keyword (case preserved) → definition
pub type DefinitionMap = HashMap<String, Definition>;

/// Request body sent to the extraction service
#[derive(Debug, Clone, Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
}

/// Failure at the extraction boundary
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Network unreachable, request aborted, body unreadable
    Transport(String),
    /// Non-2xx response
    Status { status: u16, body: String },
    /// Body is not a JSON object of `term -> { description, link? }`
    Malformed(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Transport(msg) => write!(f, "Transport error: {}", msg),
            FetchError::Status { status, body } => {
                write!(f, "HTTP error! status: {}, message: {}", status, body)
            }
            FetchError::Malformed(msg) => write!(f, "Malformed response: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

// =============================================================================
// Trait
// =============================================================================

/// Async text → definitions boundary.
///
/// Futures are local (not `Send`): the whole pipeline runs on one logical
/// thread, and in the browser `reqwest` futures are `!Send` anyway.
pub trait DefinitionSource {
    fn fetch<'a>(&'a self, text: &'a str) -> LocalBoxFuture<'a, Result<DefinitionMap, FetchError>>;
}

/// Parse an extraction-service response body
pub fn parse_definitions(body: &str) -> Result<DefinitionMap, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))
}

// =============================================================================
// HttpDefinitionSource
// =============================================================================

/// Extraction service client
#[derive(Debug, Clone)]
pub struct HttpDefinitionSource {
    client: reqwest::Client,
    url: String,
}

impl HttpDefinitionSource {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, text: &str) -> Result<DefinitionMap, FetchError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ExtractRequest { text })
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        parse_definitions(&body)
    }
}

impl DefinitionSource for HttpDefinitionSource {
    fn fetch<'a>(&'a self, text: &'a str) -> LocalBoxFuture<'a, Result<DefinitionMap, FetchError>> {
        self.post(text).boxed_local()
    }
}

// =============================================================================
// StaticKeywordSource
// =============================================================================

/// Fixed keyword list matched locally.
///
/// Every keyword found in the text is returned with an empty definition, so
/// the tooltip falls back to its placeholder description.
pub struct StaticKeywordSource {
    automaton: Option<AhoCorasick>,
    keywords: Vec<String>,
}

impl StaticKeywordSource {
    pub fn new(keywords: &[String]) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for keyword in keywords {
            let trimmed = keyword.trim();
            if !trimmed.is_empty() && !unique.iter().any(|k| k == trimmed) {
                unique.push(trimmed.to_string());
            }
        }

        let automaton = if unique.is_empty() {
            None
        } else {
            match AhoCorasickBuilder::new()
                .match_kind(MatchKind::LeftmostLongest)
                .ascii_case_insensitive(true)
                .build(&unique)
            {
                Ok(ac) => Some(ac),
                Err(e) => {
                    tracing::error!("[StaticKeywordSource] Failed to build automaton: {}", e);
                    None
                }
            }
        };

        Self {
            automaton,
            keywords: unique,
        }
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    /// Distinct keywords present in `text`
    pub fn find(&self, text: &str) -> DefinitionMap {
        let mut found = DefinitionMap::new();
        if let Some(ac) = &self.automaton {
            for m in ac.find_iter(text) {
                let keyword = &self.keywords[m.pattern().as_usize()];
                found.entry(keyword.clone()).or_default();
            }
        }
        found
    }
}

impl DefinitionSource for StaticKeywordSource {
    fn fetch<'a>(&'a self, text: &'a str) -> LocalBoxFuture<'a, Result<DefinitionMap, FetchError>> {
        future::ready(Ok(self.find(text))).boxed_local()
    }
}

// =============================================================================
// Tests
// =============================================================================
