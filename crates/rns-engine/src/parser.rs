//! Parse backend output into typed decisions
//!
//! Responses nominally look like `<new_name>…</new_name><reason>…</reason>`,
//! but real backends wrap them in code fences, HTML-escape them, repeat the
//! wrapper after correcting themselves, or stop before the closing tag. Every
//! entry point runs the same cleanup before looking for tags:
//!
//! 1. unwrap code fences and trim surrounding quotes/whitespace
//! 2. HTML-unescape once if the text contains `&lt;`
//! 3. keep only the body of the last `<response>` block (to end of text when
//!    the wrapper is unclosed)
//!
//! Tag names match case-insensitively. A tag without a closing delimiter
//! extends to the next tag or the end of the body.

use crate::config::DEFAULT_LEAK_PHRASES;
use crate::error::ParseError;
use regex::{Captures, Regex};
use rns_domain::{RenameResult, SortResult, StemAction, StemActionResult};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+\-]*[ \t]*\r?\n(.*?)```")
        .expect("valid code fence pattern")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*(/)?\s*([A-Za-z_][A-Za-z0-9_\-]*)(?:\s[^<>]*?)?\s*(/)?\s*>")
        .expect("valid tag pattern")
});

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z]{2,8});")
        .expect("valid entity pattern")
});

/// Detects responses that parrot the prompt instead of answering it
///
/// A narrowly scoped heuristic: a case-insensitive substring match against a
/// configurable phrase list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakDetector {
    phrases: Vec<String>,
}

impl LeakDetector {
    /// Build a detector from a phrase list
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// Add one more phrase
    pub fn with_phrase(mut self, phrase: impl AsRef<str>) -> Self {
        let phrase = phrase.as_ref().trim().to_lowercase();
        if !phrase.is_empty() && !self.phrases.contains(&phrase) {
            self.phrases.push(phrase);
        }
        self
    }

    /// The active phrases (lowercased)
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Whether `text` contains any of the phrases
    pub fn is_leak(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let lower = text.to_lowercase();
        self.phrases.iter().any(|p| lower.contains(p.as_str()))
    }
}

impl Default for LeakDetector {
    fn default() -> Self {
        Self::new(DEFAULT_LEAK_PHRASES)
    }
}

/// Parser for the three response shapes
#[derive(Debug, Clone, Default)]
pub struct TagParser {
    leaks: LeakDetector,
}

impl TagParser {
    /// Create a parser with a custom leak detector
    pub fn new(leaks: LeakDetector) -> Self {
        Self { leaks }
    }

    /// The leak detector in use
    pub fn leak_detector(&self) -> &LeakDetector {
        &self.leaks
    }

    /// Parse a rename response
    ///
    /// Requires exactly one non-empty `<new_name>`; `<reason>` is optional but
    /// must be unique and must not echo the prompt.
    pub fn parse_rename(&self, text: &str) -> Result<RenameResult, ParseError> {
        let body = response_body(text, "rename")?;

        let new_name = required_unique(&body, "new_name", "rename", text)?;
        if new_name.is_empty() {
            return Err(reject("Empty <new_name> in rename response", text));
        }

        let reason = optional_unique(&body, "reason", "rename", text)?.unwrap_or_default();
        if self.leaks.is_leak(&reason) {
            return Err(reject("Reason appears to echo prompt instructions", text));
        }

        Ok(RenameResult {
            new_name,
            reason,
            raw_text: text.to_string(),
        })
    }

    /// Parse a stem-action response
    ///
    /// `<stem_action>` is canonical; the legacy `<keep_original>` boolean is
    /// decoded only when it is absent. Reasons are not leak-checked here; the
    /// sanitizer clears template text for this task instead.
    pub fn parse_stem_action(&self, text: &str) -> Result<StemActionResult, ParseError> {
        let body = response_body(text, "stem action")?;

        let stem_action = match optional_unique(&body, "stem_action", "stem action", text)? {
            Some(value) => StemAction::parse(&value).ok_or_else(|| {
                reject(&format!("Invalid <stem_action> value '{}'", value), text)
            })?,
            None => match optional_unique(&body, "keep_original", "stem action", text)? {
                Some(value) => StemAction::from_keep_original(parse_legacy_bool(&value)),
                None => {
                    return Err(reject("Missing <stem_action> in stem action response", text));
                }
            },
        };

        let reason = optional_unique(&body, "reason", "stem action", text)?.unwrap_or_default();

        Ok(StemActionResult {
            stem_action,
            reason,
            raw_text: text.to_string(),
        })
    }

    /// Parse a single-file sort response, keyed by `path`
    pub fn parse_sort(&self, text: &str, path: &str) -> Result<SortResult, ParseError> {
        let body = response_body(text, "sort")?;

        let category = required_unique(&body, "category", "sort", text)?;
        if category.is_empty() {
            return Err(reject("Empty <category> in sort response", text));
        }

        let mut assignments = BTreeMap::new();
        assignments.insert(path.to_string(), category);
        Ok(SortResult {
            assignments,
            raw_text: text.to_string(),
        })
    }
}

/// Parse a rename response with the default leak phrases
pub fn parse_rename_response(text: &str) -> Result<RenameResult, ParseError> {
    TagParser::default().parse_rename(text)
}

/// Parse a stem-action response
pub fn parse_stem_action_response(text: &str) -> Result<StemActionResult, ParseError> {
    TagParser::default().parse_stem_action(text)
}

/// Parse a single-file sort response
pub fn parse_sort_response(text: &str, path: &str) -> Result<SortResult, ParseError> {
    TagParser::default().parse_sort(text, path)
}

/// Unwrap code fences, trim quotes, and HTML-unescape once
pub fn clean_response(text: &str) -> String {
    let unfenced = strip_code_fences(text);
    let cleaned = unfenced
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();
    if cleaned.contains("&lt;") {
        let unescaped = html_unescape(cleaned);
        if !unescaped.trim().is_empty() {
            return unescaped.trim().to_string();
        }
    }
    cleaned.to_string()
}

/// Content of the last `<tag>` block in `text`
///
/// An unclosed final block runs to the end of the text.
pub fn extract_tag_content<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let tag = tag.to_ascii_lowercase();
    let tokens = tokenize(text);
    let open_idx = tokens
        .iter()
        .rposition(|t| !t.closing && !t.self_closing && t.name == tag)?;
    let open = &tokens[open_idx];
    let end = tokens[open_idx + 1..]
        .iter()
        .find(|t| t.closing && t.name == tag)
        .map_or(text.len(), |t| t.start);
    Some(&text[open.end..end])
}

/// Every value of `tag` in `body`, in order, trimmed
pub fn find_tag_values(body: &str, tag: &str) -> Vec<String> {
    let tag = tag.to_ascii_lowercase();
    let tokens = tokenize(body);
    let mut values = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        if token.closing || token.name != tag {
            continue;
        }
        if token.self_closing {
            values.push(String::new());
            continue;
        }
        let rest = &tokens[idx + 1..];
        let close = rest
            .iter()
            .take_while(|t| t.closing || t.name != tag)
            .find(|t| t.closing && t.name == tag);
        let end = match close {
            Some(close) => close.start,
            None => rest.first().map_or(body.len(), |t| t.start),
        };
        values.push(body[token.end..end].trim().to_string());
    }

    values
}

struct TagToken {
    start: usize,
    end: usize,
    name: String,
    closing: bool,
    self_closing: bool,
}

fn tokenize(text: &str) -> Vec<TagToken> {
    TAG_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(TagToken {
                start: whole.start(),
                end: whole.end(),
                name: caps.get(2)?.as_str().to_ascii_lowercase(),
                closing: caps.get(1).is_some(),
                self_closing: caps.get(3).is_some(),
            })
        })
        .collect()
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.contains("```") {
        return trimmed.to_string();
    }
    let unwrapped = CODE_FENCE_RE.replace_all(trimmed, "$1");
    let mut rest = unwrapped.trim();

    // A fence the backend never closed, or one opened and closed on one line
    if let Some(after) = rest.strip_prefix("```") {
        rest = skip_fence_language(after);
    }
    rest.trim_end_matches("```").trim().to_string()
}

/// Drop the info string after an opening fence
///
/// Only a word followed by whitespace, a tag, an entity or the end of the
/// text counts as a language; ```` ```abc``` ```` keeps `abc`.
fn skip_fence_language(after_fence: &str) -> &str {
    let word_len = after_fence
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-')))
        .unwrap_or(after_fence.len());
    let rest = &after_fence[word_len..];
    if rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == '<' || c == '&') {
        rest
    } else {
        after_fence
    }
}

fn html_unescape(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| match decode_entity(&caps[1]) {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn response_body(text: &str, task: &str) -> Result<String, ParseError> {
    let cleaned = clean_response(text);
    let body = extract_tag_content(&cleaned, "response")
        .unwrap_or(&cleaned)
        .trim()
        .to_string();
    if body.is_empty() {
        let message = format!("Missing required tags in {} response", task);
        return Err(reject(&message, text));
    }
    Ok(body)
}

fn optional_unique(
    body: &str,
    tag: &str,
    task: &str,
    raw: &str,
) -> Result<Option<String>, ParseError> {
    let mut values = find_tag_values(body, tag);
    if values.len() > 1 {
        let message = format!("Duplicate <{}> tags in {} response", tag, task);
        return Err(reject(&message, raw));
    }
    Ok(values.pop())
}

fn required_unique(body: &str, tag: &str, task: &str, raw: &str) -> Result<String, ParseError> {
    optional_unique(body, tag, task, raw)?
        .ok_or_else(|| reject(&format!("Missing <{}> in {} response", tag, task), raw))
}

fn parse_legacy_bool(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value.starts_with('t') || value == "1" || value == "yes" || value == "y"
}

fn reject(message: &str, raw: &str) -> ParseError {
    debug!("Rejected response ({} chars): {}", raw.len(), message);
    ParseError::new(message, raw)
}
