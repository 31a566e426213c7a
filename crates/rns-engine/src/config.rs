//! Configuration for the Engine

use crate::sanitize::{DEFAULT_FALLBACK_NAME, MAX_FILENAME_CHARS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Phrases that indicate the backend echoed its instructions
pub const DEFAULT_LEAK_PHRASES: &[&str] = &[
    "previous reply did not match",
    "do not include",
    "return only",
    "schema",
    "tags below",
];

/// Template text a backend sometimes copies into `<reason>` verbatim
pub const DEFAULT_PLACEHOLDER_REASONS: &[&str] = &[
    "short justification",
    "one sentence",
    "refer to one feature flag",
    "brief reason",
];

/// Literal tokens a backend sometimes leaves inside a suggested name
pub const DEFAULT_PLACEHOLDER_TOKENS: &[&str] = &["current_name", "new_name", "original_name"];

/// Categories offered to the sort task when the caller has no list of its own
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Document",
    "Spreadsheet",
    "Presentation",
    "Image",
    "Audio",
    "Video",
    "Archive",
    "Code",
    "Ebook",
    "Other",
];

/// Configuration for the Engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Token budget for rename calls
    pub rename_max_tokens: u32,

    /// Token budget for stem-action calls
    pub stem_action_max_tokens: u32,

    /// Token budget for sort calls
    pub sort_max_tokens: u32,

    /// Hard cap on a sanitized file name (characters)
    pub max_filename_chars: usize,

    /// Length the rename prompt asks the backend to stay under
    pub prompt_filename_chars: usize,

    /// Name used when sanitizing leaves nothing usable
    pub fallback_name: String,

    /// Prompt-echo phrases rejected in rename reasons
    pub leak_phrases: Vec<String>,

    /// Template reasons cleared from stem-action results
    pub placeholder_reasons: Vec<String>,

    /// Literal tokens stripped from suggested names
    pub placeholder_tokens: Vec<String>,

    /// Category used when the backend answers outside the allowed set
    pub fallback_category: String,

    /// Context line added to prompts when a request carries none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.rename_max_tokens == 0
            || self.stem_action_max_tokens == 0
            || self.sort_max_tokens == 0
        {
            return Err("token budgets must be greater than 0".to_string());
        }
        if self.max_filename_chars < 8 {
            return Err("max_filename_chars must be at least 8".to_string());
        }
        if self.prompt_filename_chars == 0 {
            return Err("prompt_filename_chars must be greater than 0".to_string());
        }
        if self.fallback_name.is_empty()
            || !self
                .fallback_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(format!(
                "fallback_name '{}' must be non-empty and filename-safe",
                self.fallback_name
            ));
        }
        if self.fallback_category.trim().is_empty() {
            return Err("fallback_category must not be empty".to_string());
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str)
            .map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }

    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let config = Self::from_toml(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// The default category list as owned strings
    pub fn default_categories() -> Vec<String> {
        DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rename_max_tokens: 160,
            stem_action_max_tokens: 120,
            sort_max_tokens: 48,
            max_filename_chars: MAX_FILENAME_CHARS,
            prompt_filename_chars: 60,
            fallback_name: DEFAULT_FALLBACK_NAME.to_string(),
            leak_phrases: to_strings(DEFAULT_LEAK_PHRASES),
            placeholder_reasons: to_strings(DEFAULT_PLACEHOLDER_REASONS),
            placeholder_tokens: to_strings(DEFAULT_PLACEHOLDER_TOKENS),
            fallback_category: "Other".to_string(),
            context: None,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
