// keyspot/src/config.rs
//
// Session options, as passed from the host page

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Extraction service used when no URL is configured
pub const DEFAULT_DEFINITION_API_URL: &str = "http://localhost:943/api/extract_keywords";

/// Quiet period after the last mutation, in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 700;

/// AutoHyperlink configuration
///
/// Field names are camelCase on the wire. Unknown fields are ignored, missing
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoLinkConfig {
    /// Keyword extraction endpoint
    #[serde(alias = "llmApiUrl")]
    pub definition_api_url: String,

    /// Debounce delay in ms (0 = default)
    pub debounce_delay: u64,

    /// Fixed keyword list. When present, keywords are found locally and
    /// the extraction service is never called.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

impl Default for AutoLinkConfig {
    fn default() -> Self {
        Self {
            definition_api_url: DEFAULT_DEFINITION_API_URL.to_string(),
            debounce_delay: DEFAULT_DEBOUNCE_MS,
            keywords: None,
        }
    }
}

impl AutoLinkConfig {
    /// Parse from a JSON options object
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Builder: set extraction endpoint
    pub fn with_definition_api_url(mut self, url: &str) -> Self {
        self.definition_api_url = url.to_string();
        self
    }

    /// Builder: set debounce delay (ms)
    pub fn with_debounce_delay(mut self, ms: u64) -> Self {
        self.debounce_delay = ms;
        self
    }

    /// Builder: use a static keyword list
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = Some(keywords);
        self
    }

    /// Effective debounce interval
    pub fn debounce(&self) -> Duration {
        match self.debounce_delay {
            0 => Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            ms => Duration::from_millis(ms),
        }
    }

    /// Effective endpoint (blank falls back to the default)
    pub fn api_url(&self) -> &str {
        if self.definition_api_url.trim().is_empty() {
            DEFAULT_DEFINITION_API_URL
        } else {
            &self.definition_api_url
        }
    }

    /// Static keyword list, if one was configured
    pub fn static_keywords(&self) -> Option<&[String]> {
        self.keywords.as_deref()
    }
}
