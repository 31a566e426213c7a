//! Prompt construction for the three tasks

use crate::config::EngineConfig;
use regex::Regex;
use rns_domain::{FileMetadata, RenameRequest, SortRequest, StemActionRequest, Task};
use std::sync::LazyLock;

/// Example shown at the end of every rename prompt
pub const RENAME_EXAMPLE_OUTPUT: &str =
    "<new_name>Invoice_20240115_Acorn_Supply.pdf</new_name>\n<reason>invoice with vendor and date</reason>";

/// Example shown at the end of every stem-action prompt
pub const STEM_ACTION_EXAMPLE_OUTPUT: &str =
    "<stem_action>normalize</stem_action>\n<reason>date and topic in stem are useful</reason>";

/// Example shown at the end of every sort prompt
pub const SORT_EXAMPLE_OUTPUT: &str = "<category>Document</category>";

const TAGS_ONLY_INSTRUCTION: &str = "Return only the tags shown below.";

const FORMAT_FIX_REMINDER: &str =
    "Your previous reply did not match the required format.\nReply with tags only.";

const TITLE_CHARS: usize = 200;
const DESCRIPTION_CHARS: usize = 1200;
const CAPTION_CHARS: usize = 800;
const EXCERPT_CHARS: usize = 300;
const SHORT_FIELD_CHARS: usize = 200;
const MAX_KEYWORDS: usize = 20;

static DATE_LIKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{8}|\d{4}[-_.]\d{1,2}[-_.]\d{1,2}").expect("valid date pattern")
});

static GENERATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(img|dsc[nf]?|dcim|pxl|vid|mvimg|scan|screenshot|untitled)([\s_\-]|\d|$)|[0-9a-f]{12,}|[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}",
    )
    .expect("valid generated-name pattern")
});

/// The prompts and example output for one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPrompts {
    /// Prompt used on the first attempt against a transport
    pub full: String,
    /// Reduced prompt for guardrail/context-window retries
    pub minimal: String,
    /// Literal example of the expected tags
    pub example: &'static str,
}

/// Builds prompts from task requests
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    prompt_filename_chars: usize,
    default_context: Option<String>,
}

impl PromptBuilder {
    /// Create a builder that asks for names under `prompt_filename_chars`
    pub fn new(prompt_filename_chars: usize) -> Self {
        Self {
            prompt_filename_chars,
            default_context: None,
        }
    }

    /// Create a builder from engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            prompt_filename_chars: config.prompt_filename_chars,
            default_context: config.context.clone(),
        }
    }

    /// Context used when a request carries none
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.default_context = Some(context.into());
        self
    }

    /// Full and minimal prompts for `task`
    pub fn prompts(&self, task: &Task) -> TaskPrompts {
        match task {
            Task::Rename(req) => TaskPrompts {
                full: self.rename(req),
                minimal: self.rename_minimal(req),
                example: RENAME_EXAMPLE_OUTPUT,
            },
            Task::StemAction(req) => TaskPrompts {
                full: self.stem_action(req),
                minimal: self.stem_action_minimal(req),
                example: STEM_ACTION_EXAMPLE_OUTPUT,
            },
            Task::Sort(req) => TaskPrompts {
                full: self.sort(req),
                minimal: self.sort_minimal(req),
                example: SORT_EXAMPLE_OUTPUT,
            },
        }
    }

    /// Build the full rename prompt
    pub fn rename(&self, req: &RenameRequest) -> String {
        let meta = &req.metadata;
        let mut lines = self.rename_header(req);

        if let Some(title) = clean_prompt_text(meta.title.as_deref(), TITLE_CHARS) {
            lines.push(format!("title: {}", title));
        }
        if let Some(keywords) = clean_prompt_list(&meta.keywords) {
            lines.push(format!("keywords: {}", keywords));
        }
        if let Some(description) =
            clean_prompt_text(meta.summary_or_description(), DESCRIPTION_CHARS)
        {
            lines.push(format!("description: {}", description));
        }
        if let Some(caption) = clean_prompt_text(meta.caption.as_deref(), CAPTION_CHARS) {
            lines.push(format!("caption: {}", caption));
        }
        if let Some(ocr_text) = clean_prompt_text(meta.ocr_text.as_deref(), CAPTION_CHARS) {
            lines.push(format!("ocr_text: {}", ocr_text));
        }
        if let Some(note) = clean_prompt_text(meta.caption_note.as_deref(), SHORT_FIELD_CHARS) {
            lines.push(format!("caption_note: {}", note));
        }

        self.rename_footer(req, lines)
    }

    /// Build the reduced rename prompt
    ///
    /// Keeps the title and replaces every descriptive field with one short
    /// excerpt.
    pub fn rename_minimal(&self, req: &RenameRequest) -> String {
        let mut lines = self.rename_header(req);

        if let Some(title) = clean_prompt_text(req.metadata.title.as_deref(), TITLE_CHARS) {
            lines.push(format!("title: {}", title));
        }
        if let Some(excerpt) = prompt_excerpt(&req.metadata) {
            lines.push(format!("excerpt: {}", excerpt));
        }

        self.rename_footer(req, lines)
    }

    /// Build the stem-action prompt
    pub fn stem_action(&self, req: &StemActionRequest) -> String {
        let mut lines = stem_action_header(req);
        lines.push("features:".to_string());
        for (key, value) in StemFeatures::of(&req.original_stem).entries() {
            lines.push(format!("- {}: {}", key, value));
        }
        with_instructions(lines, STEM_ACTION_EXAMPLE_OUTPUT)
    }

    /// Build the stem-action prompt without the features list
    pub fn stem_action_minimal(&self, req: &StemActionRequest) -> String {
        with_instructions(stem_action_header(req), STEM_ACTION_EXAMPLE_OUTPUT)
    }

    /// Build the sort prompt
    pub fn sort(&self, req: &SortRequest) -> String {
        let mut lines = Vec::new();
        if let Some(context) = self.context(req.context.as_deref()) {
            lines.push(format!("Context: {}", context));
        }
        push_sort_body(&mut lines, req, true);
        with_instructions(lines, SORT_EXAMPLE_OUTPUT)
    }

    /// Build the sort prompt without context or description
    pub fn sort_minimal(&self, req: &SortRequest) -> String {
        let mut lines = Vec::new();
        push_sort_body(&mut lines, req, false);
        with_instructions(lines, SORT_EXAMPLE_OUTPUT)
    }

    fn rename_header(&self, req: &RenameRequest) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(context) = self.context(req.context.as_deref()) {
            lines.push(format!("Context: {}", context));
        }
        lines.push(format!(
            "Rename this file concisely (max {} chars).",
            self.prompt_filename_chars
        ));
        lines.push(format!("current_name: {}", req.current_name));
        if let Some(hint) =
            clean_prompt_text(req.metadata.filetype_hint.as_deref(), SHORT_FIELD_CHARS)
        {
            lines.push(format!("filetype: {}", hint));
        }
        lines
    }

    fn rename_footer(&self, req: &RenameRequest, mut lines: Vec<String>) -> String {
        lines.push(format!(
            "extension: {}",
            req.extension().unwrap_or_else(|| "none".to_string())
        ));
        with_instructions(lines, RENAME_EXAMPLE_OUTPUT)
    }

    fn context(&self, request_context: Option<&str>) -> Option<String> {
        clean_prompt_text(
            request_context.or(self.default_context.as_deref()),
            SHORT_FIELD_CHARS,
        )
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Wrap `original` with a reminder to answer in tags only
pub fn format_fix_prompt(original: &str, example: &str) -> String {
    format!("{}\n\n{}\n{}", original.trim_end(), FORMAT_FIX_REMINDER, example)
}

/// Character-level features of a file stem, shown to the stem-action task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StemFeatures {
    /// Contains at least one letter
    pub has_letters: bool,
    /// Contains at least one digit
    pub has_digits: bool,
    /// Contains an 8-digit run or a `YYYY-MM-DD` style date
    pub has_date_like: bool,
    /// Digits and separators only
    pub is_numeric_only: bool,
    /// Looks like a camera, scanner, or hash-style name
    pub looks_generated: bool,
    /// Number of alphanumeric runs
    pub word_count: usize,
    /// Length in characters
    pub length: usize,
}

impl StemFeatures {
    /// Compute features for `stem`
    pub fn of(stem: &str) -> Self {
        let stem = stem.trim();
        let has_letters = stem.chars().any(char::is_alphabetic);
        let has_digits = stem.chars().any(|c| c.is_ascii_digit());
        Self {
            has_letters,
            has_digits,
            has_date_like: DATE_LIKE_RE.is_match(stem),
            is_numeric_only: has_digits && !has_letters,
            looks_generated: GENERATED_RE.is_match(stem),
            word_count: stem
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .count(),
            length: stem.chars().count(),
        }
    }

    fn entries(&self) -> [(&'static str, String); 7] {
        [
            ("has_letters", self.has_letters.to_string()),
            ("has_digits", self.has_digits.to_string()),
            ("has_date_like", self.has_date_like.to_string()),
            ("is_numeric_only", self.is_numeric_only.to_string()),
            ("looks_generated", self.looks_generated.to_string()),
            ("word_count", self.word_count.to_string()),
            ("length", self.length.to_string()),
        ]
    }
}

/// Make a metadata value safe to embed in a prompt
///
/// Control characters become spaces, whitespace collapses, and over-long
/// values are cut on a character boundary with a trailing `...`. Returns
/// `None` for missing or blank input.
pub fn clean_prompt_text(text: Option<&str>, max_chars: usize) -> Option<String> {
    let cleaned = text?
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.chars().count() <= max_chars {
        return Some(cleaned);
    }
    let head: String = cleaned.chars().take(max_chars.saturating_sub(3)).collect();
    Some(format!("{}...", head.trim_end()))
}

fn clean_prompt_list(items: &[String]) -> Option<String> {
    let cleaned: Vec<String> = items
        .iter()
        .filter_map(|item| clean_prompt_text(Some(item.as_str()), SHORT_FIELD_CHARS))
        .take(MAX_KEYWORDS)
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.join(", "))
    }
}

fn prompt_excerpt(meta: &FileMetadata) -> Option<String> {
    [
        meta.summary.as_deref(),
        meta.description.as_deref(),
        meta.ocr_text.as_deref(),
        meta.caption.as_deref(),
    ]
    .into_iter()
    .find_map(|field| clean_prompt_text(field, EXCERPT_CHARS))
}

fn stem_action_header(req: &StemActionRequest) -> Vec<String> {
    let mut lines = vec![
        "Choose stem_action: drop | normalize | keep.".to_string(),
        "Reason should mention what useful info is in the stem.".to_string(),
        format!("original_stem: {}", req.original_stem),
        format!("suggested_name: {}", req.suggested_name),
    ];
    if let Some(ext) = req.extension.as_deref().filter(|e| !e.trim().is_empty()) {
        lines.push(format!("extension: {}", ext.trim()));
    }
    lines
}

fn push_sort_body(lines: &mut Vec<String>, req: &SortRequest, with_description: bool) {
    lines.push("Assign one allowed category to the file below.".to_string());
    lines.push("Allowed categories:".to_string());
    for category in &req.allowed_categories {
        lines.push(format!("- {}", category));
    }
    lines.push("File:".to_string());

    let file = &req.file;
    let mut line = format!("path={} | name={} | ext={}", file.path, file.name, file.extension);
    if with_description {
        let desc = clean_prompt_text(Some(file.description.as_str()), EXCERPT_CHARS)
            .unwrap_or_default();
        line.push_str(&format!(" | desc={}", desc));
    }
    lines.push(line);
}

fn with_instructions(mut lines: Vec<String>, example: &str) -> String {
    lines.push(TAGS_ONLY_INSTRUCTION.to_string());
    lines.push("Example output:".to_string());
    lines.push(example.to_string());
    lines.join("\n")
}
