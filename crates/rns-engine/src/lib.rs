//! rename-n-sort Engine
//!
//! Turns a file task (rename, stem action, sort) into structured decisions
//! using an unreliable text-generation backend.
//!
//! # Overview
//!
//! Backends refuse requests, overflow their context windows, and wrap their
//! answers in chatter. The engine drives an ordered list of transports through
//! a fixed retry/fallback protocol, recovers tagged answers from loose text
//! with a fault-tolerant parser, and sanitizes the result before returning it.
//!
//! # Architecture
//!
//! ```text
//! Task → PromptBuilder → Transport → TagParser → Sanitizer → Decision
//!             ↑______________ retry / fallback ______|
//! ```
//!
//! # Example Usage
//!
//! ```
//! use rns_domain::{FileMetadata, Transport};
//! use rns_engine::Engine;
//! use rns_llm::MockTransport;
//!
//! let backend = MockTransport::with_responses(
//!     "mock",
//!     ["<new_name>Invoice 2024.pdf</new_name><reason>invoice with date</reason>"],
//! );
//! let engine = Engine::new(vec![&backend as &dyn Transport]);
//!
//! let result = engine
//!     .rename("scan_001.pdf", &FileMetadata::with_extension("pdf"))
//!     .unwrap();
//! assert_eq!(result.new_name, "Invoice-2024.pdf");
//! ```

#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod parser;
mod prompt;
mod sanitize;

#[cfg(test)]
mod tests;

pub use config::{
    EngineConfig, DEFAULT_CATEGORIES, DEFAULT_LEAK_PHRASES, DEFAULT_PLACEHOLDER_REASONS,
    DEFAULT_PLACEHOLDER_TOKENS,
};
pub use engine::Engine;
pub use error::{EngineError, ParseError};
pub use parser::{
    clean_response, extract_tag_content, find_tag_values, parse_rename_response,
    parse_sort_response, parse_stem_action_response, LeakDetector, TagParser,
};
pub use prompt::{
    clean_prompt_text, format_fix_prompt, PromptBuilder, StemFeatures, TaskPrompts,
    RENAME_EXAMPLE_OUTPUT, SORT_EXAMPLE_OUTPUT, STEM_ACTION_EXAMPLE_OUTPUT,
};
pub use sanitize::{
    clean_reason, normalize_category, normalize_new_name, sanitize_filename,
    sanitize_filename_with, NameNormalizer, Sanitizer, DEFAULT_FALLBACK_NAME, MAX_FILENAME_CHARS,
};
