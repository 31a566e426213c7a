//! Post-parse cleanup of backend decisions
//!
//! Everything here is pure: no I/O, no state beyond the compiled token
//! patterns. The engine runs every successful parse through a [`Sanitizer`]
//! before handing it back to the caller.

use crate::config::{EngineConfig, DEFAULT_PLACEHOLDER_TOKENS};
use crate::error::ParseError;
use crate::parser::LeakDetector;
use regex::{Captures, Regex};
use rns_domain::{RenameResult, SortResult, StemActionResult};
use std::collections::BTreeMap;
use tracing::debug;

/// Maximum length of a sanitized file name, in characters
pub const MAX_FILENAME_CHARS: usize = 80;

/// Name returned when nothing usable survives sanitizing
pub const DEFAULT_FALLBACK_NAME: &str = "file";

const MAX_EXTENSION_CHARS: usize = 10;

/// Make `name` safe to use as a file name, with the default limits
///
/// ```
/// use rns_engine::sanitize_filename;
///
/// assert_eq!(sanitize_filename("My File 2025.pdf"), "My-File-2025.pdf");
/// assert_eq!(sanitize_filename("___"), "file");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    sanitize_filename_with(name, MAX_FILENAME_CHARS, DEFAULT_FALLBACK_NAME)
}

/// Make `name` safe to use as a file name
///
/// Characters other than letters, digits, `.`, `_` and `-` become `-`; runs
/// of the same separator collapse to one; separators are trimmed from both
/// ends. The result is cut to `max_chars` characters, keeping a short
/// extension intact when there is room for it.
pub fn sanitize_filename_with(name: &str, max_chars: usize, fallback: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev: Option<char> = None;

    for c in name.trim().chars() {
        let c = if is_safe_char(c) { c } else { '-' };
        if is_separator(c) && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }

    let trimmed = out.trim_matches(is_separator);
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    truncate_name(trimmed, max_chars.max(1))
}

/// Normalize a rename suggestion with the default placeholder tokens
///
/// See [`NameNormalizer::normalize`].
pub fn normalize_new_name(current_name: &str, new_name: &str) -> String {
    NameNormalizer::default().normalize(current_name, new_name, None)
}

/// Repairs the usual ways a backend mangles a suggested name
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    tokens: Vec<Regex>,
}

impl NameNormalizer {
    /// Build a normalizer that strips `tokens` (case-insensitive)
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .filter_map(|t| Regex::new(&format!(r"(?i)[\s_\-]*{}", regex::escape(&t))).ok())
            .collect();
        Self { tokens }
    }

    /// Clean `new_name` relative to the file it is meant to replace
    ///
    /// `extension` overrides the one taken from `current_name`. The result
    /// always ends with the original extension (when there is one) and is
    /// never empty, but it is not yet filename-safe.
    pub fn normalize(&self, current_name: &str, new_name: &str, extension: Option<&str>) -> String {
        let (orig_stem, orig_ext) = split_extension(current_name.trim());
        let ext = extension
            .map(|e| e.trim().trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .or(orig_ext);

        let mut name = new_name.trim().to_string();
        for token in &self.tokens {
            name = token.replace_all(&name, "").into_owned();
        }
        name = name
            .trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '_'))
            .to_string();

        if orig_ext.is_some() {
            name = collapse_embedded_name(&name, current_name.trim(), orig_stem);
        }

        if let Some(ext) = ext {
            let double = format!(".{ext}.{ext}");
            while ends_with_ignore_case(&name, &double) {
                name.truncate(name.len() - ext.len() - 1);
            }
        }

        let (stem, suffix) = match ext {
            Some(ext) if ends_with_ignore_case(&name, &format!(".{ext}")) => {
                let cut = name.len() - ext.len() - 1;
                (name[..cut].to_string(), name[cut..].to_string())
            }
            Some(ext) => (name.clone(), format!(".{ext}")),
            None => (name.clone(), String::new()),
        };

        let stem = trim_name_edges(&stem);
        let stem = if stem.chars().any(char::is_alphanumeric) {
            stem
        } else {
            debug!("Suggested name '{}' had no usable stem", new_name);
            orig_stem
        };

        format!("{stem}{suffix}")
    }
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_TOKENS)
    }
}

/// Collapse whitespace and undo escaped quotes in a reason string
pub fn clean_reason(reason: &str) -> String {
    reason
        .replace("\\\"", "\"")
        .replace("\\'", "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Match `category` against the allowed set, case-insensitively
///
/// Returns the canonical spelling from `allowed`. An answer outside the set
/// maps to `fallback`, but only when `fallback` is itself allowed; otherwise
/// there is no acceptable category and the result is `None`.
pub fn normalize_category(category: &str, allowed: &[String], fallback: &str) -> Option<String> {
    let canonical = |wanted: &str| {
        let wanted = wanted.trim().to_lowercase();
        allowed
            .iter()
            .find(|c| c.trim().to_lowercase() == wanted)
            .map(|c| c.trim().to_string())
    };
    canonical(category).or_else(|| {
        let fallback = canonical(fallback);
        debug!("Category '{}' not allowed, falling back to {:?}", category, fallback);
        fallback
    })
}

/// Applies every post-parse rule the engine configuration asks for
#[derive(Debug, Clone)]
pub struct Sanitizer {
    max_filename_chars: usize,
    fallback_name: String,
    fallback_category: String,
    names: NameNormalizer,
    leaks: LeakDetector,
    placeholder_reasons: Vec<String>,
}

impl Sanitizer {
    /// Build a sanitizer from engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_filename_chars: config.max_filename_chars,
            fallback_name: config.fallback_name.clone(),
            fallback_category: config.fallback_category.clone(),
            names: NameNormalizer::new(&config.placeholder_tokens),
            leaks: LeakDetector::new(&config.leak_phrases),
            placeholder_reasons: config
                .placeholder_reasons
                .iter()
                .map(|r| r.trim().to_lowercase())
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }

    /// Sanitize a file name with the configured limits
    pub fn filename(&self, name: &str) -> String {
        sanitize_filename_with(name, self.max_filename_chars, &self.fallback_name)
    }

    /// Normalize and sanitize a rename result
    pub fn rename(
        &self,
        current_name: &str,
        extension: Option<&str>,
        result: RenameResult,
    ) -> RenameResult {
        let normalized = self.names.normalize(current_name, &result.new_name, extension);
        RenameResult {
            new_name: self.filename(&normalized),
            reason: clean_reason(&result.reason),
            raw_text: result.raw_text,
        }
    }

    /// Clear template or prompt-echo reasons from a stem-action result
    pub fn stem_action(&self, result: StemActionResult) -> StemActionResult {
        StemActionResult {
            reason: self.relaxed_reason(&result.reason),
            ..result
        }
    }

    /// Map every assigned category onto the allowed set
    ///
    /// Fails when a category is outside `allowed` and the configured fallback
    /// is not allowed either.
    pub fn sort(&self, result: SortResult, allowed: &[String]) -> Result<SortResult, ParseError> {
        let mut assignments = BTreeMap::new();
        for (path, category) in result.assignments {
            match normalize_category(&category, allowed, &self.fallback_category) {
                Some(canonical) => {
                    assignments.insert(path, canonical);
                }
                None => {
                    return Err(ParseError::new(
                        format!("Category '{}' is not one of the allowed categories", category),
                        result.raw_text,
                    ));
                }
            }
        }
        Ok(SortResult {
            assignments,
            raw_text: result.raw_text,
        })
    }

    /// The cleaned reason, or `""` when it is template text
    pub fn relaxed_reason(&self, reason: &str) -> String {
        let cleaned = clean_reason(reason);
        let lower = cleaned.to_lowercase();
        if self.leaks.is_leak(&cleaned)
            || self
                .placeholder_reasons
                .iter()
                .any(|p| lower.contains(p.as_str()))
        {
            return String::new();
        }
        cleaned
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

fn is_safe_char(c: char) -> bool {
    c.is_alphanumeric() || is_separator(c)
}

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '_' | '-')
}

fn truncate_name(name: &str, max_chars: usize) -> String {
    if name.chars().count() <= max_chars {
        return name.to_string();
    }

    if let (stem, Some(ext)) = split_extension(name) {
        let ext_len = ext.chars().count();
        if max_chars > ext_len + 1 {
            let head: String = stem.chars().take(max_chars - ext_len - 1).collect();
            let head = head.trim_end_matches(is_separator);
            if !head.is_empty() {
                return format!("{head}.{ext}");
            }
        }
    }

    let head: String = name.chars().take(max_chars).collect();
    head.trim_end_matches(is_separator).to_string()
}

/// Split `name` into stem and a plausible extension
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_CHARS
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (stem, Some(ext))
        }
        _ => (name, None),
    }
}

/// Replace `report.pdf-` style copies of the full original name with its stem
fn collapse_embedded_name(name: &str, current_name: &str, orig_stem: &str) -> String {
    let pattern = format!(r"(?i){}([\s_\-])", regex::escape(current_name));
    match Regex::new(&pattern) {
        Ok(re) => re
            .replace_all(name, |caps: &Captures| format!("{}{}", orig_stem, &caps[1]))
            .into_owned(),
        Err(_) => name.to_string(),
    }
}

fn trim_name_edges(name: &str) -> &str {
    name.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | '.'))
}

fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name.is_char_boundary(name.len() - suffix.len())
        && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
