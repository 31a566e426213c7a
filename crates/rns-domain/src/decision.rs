//! Decisions - typed answers produced by the engine

use std::collections::BTreeMap;
use std::fmt;

/// A suggested new file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameResult {
    /// Sanitized new name; never empty
    pub new_name: String,

    /// Short justification; may be empty
    pub reason: String,

    /// The backend text the result was parsed from
    pub raw_text: String,
}

/// What to do with the original file stem when applying a rename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StemAction {
    /// Keep the original stem as-is
    Keep,

    /// Keep the useful part of the stem, normalized
    Normalize,

    /// Discard the original stem
    Drop,
}

impl StemAction {
    /// Get the action name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            StemAction::Keep => "keep",
            StemAction::Normalize => "normalize",
            StemAction::Drop => "drop",
        }
    }

    /// Parse an action name (case-insensitive, surrounding whitespace ignored)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "keep" => Some(StemAction::Keep),
            "normalize" => Some(StemAction::Normalize),
            "drop" => Some(StemAction::Drop),
            _ => None,
        }
    }

    /// Decode the legacy boolean `keep_original` form
    pub fn from_keep_original(keep: bool) -> Self {
        if keep {
            StemAction::Keep
        } else {
            StemAction::Drop
        }
    }

    /// Encode into the legacy boolean form; `Normalize` still keeps the stem
    pub fn keeps_original(&self) -> bool {
        !matches!(self, StemAction::Drop)
    }
}

impl fmt::Display for StemAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision about the original stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemActionResult {
    /// The chosen action
    pub stem_action: StemAction,

    /// Short justification; may be empty
    pub reason: String,

    /// The backend text the result was parsed from
    pub raw_text: String,
}

/// Category assignments keyed by file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortResult {
    /// path -> category; exactly one entry for single-file requests
    pub assignments: BTreeMap<String, String>,

    /// The backend text the result was parsed from
    pub raw_text: String,
}

impl SortResult {
    /// Look up the category assigned to `path`
    pub fn category_for(&self, path: &str) -> Option<&str> {
        self.assignments.get(path).map(String::as_str)
    }
}

/// Result of running any task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Answer to a rename task
    Rename(RenameResult),

    /// Answer to a stem-action task
    StemAction(StemActionResult),

    /// Answer to a sort task
    Sort(SortResult),
}
