//! Trait definitions for external interactions
//!
//! The engine only ever talks to a backend through [`Transport`]. Concrete
//! adapters live in `rns-llm`; the engine depends on this trait alone.

use std::fmt;
use std::sync::Arc;

/// Classification of a failed attempt
///
/// The engine's retry policy is driven entirely by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Response text did not contain the required tags
    ParseError,

    /// The backend refused the request on content-policy grounds
    GuardrailViolation,

    /// Prompt plus expected output exceeded the backend's input limit
    ContextWindowExceeded,

    /// Anything else (network, timeout, backend bug)
    Unknown,
}

impl FailureKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ParseError => "parse_error",
            FailureKind::GuardrailViolation => "guardrail_violation",
            FailureKind::ContextWindowExceeded => "context_window_exceeded",
            FailureKind::Unknown => "unknown",
        }
    }

    /// Whether a reduced prompt is worth trying for this kind
    pub fn is_shrinkable(&self) -> bool {
        matches!(
            self,
            FailureKind::GuardrailViolation | FailureKind::ContextWindowExceeded
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure returned by a [`Transport`]
///
/// Parse failures are not a transport concern and have no variant here; the
/// engine produces those itself after inspecting the returned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Backend refused to answer
    GuardrailViolation(String),

    /// Request too large for the backend
    ContextWindowExceeded(String),

    /// Unclassified failure, including timeouts
    Unknown(String),
}

impl TransportError {
    /// The failure kind this error maps to
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::GuardrailViolation(_) => FailureKind::GuardrailViolation,
            TransportError::ContextWindowExceeded(_) => FailureKind::ContextWindowExceeded,
            TransportError::Unknown(_) => FailureKind::Unknown,
        }
    }

    /// The underlying cause as reported by the adapter
    pub fn message(&self) -> &str {
        match self {
            TransportError::GuardrailViolation(m)
            | TransportError::ContextWindowExceeded(m)
            | TransportError::Unknown(m) => m,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::GuardrailViolation(m) => write!(f, "guardrail violation: {}", m),
            TransportError::ContextWindowExceeded(m) => {
                write!(f, "context window exceeded: {}", m)
            }
            TransportError::Unknown(m) => f.write_str(m),
        }
    }
}

impl std::error::Error for TransportError {}

/// Trait for text-generation backends
///
/// Implemented by the infrastructure layer (rns-llm). A call is a single
/// blocking request/response. Timeouts and cancellation are the adapter's
/// responsibility and must surface as [`TransportError::Unknown`].
pub trait Transport: Send + Sync {
    /// Short human-readable name used in logs
    fn name(&self) -> &str;

    /// Send one prompt and return the raw response text
    ///
    /// `purpose` is advisory (logging/telemetry). During a format-fix sweep it
    /// contains the substring `"format fix"`.
    fn generate(&self, prompt: &str, purpose: &str, max_tokens: u32)
        -> Result<String, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn generate(
        &self,
        prompt: &str,
        purpose: &str,
        max_tokens: u32,
    ) -> Result<String, TransportError> {
        (**self).generate(prompt, purpose, max_tokens)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn generate(
        &self,
        prompt: &str,
        purpose: &str,
        max_tokens: u32,
    ) -> Result<String, TransportError> {
        (**self).generate(prompt, purpose, max_tokens)
    }
}
