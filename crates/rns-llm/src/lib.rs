//! rename-n-sort Transport Layer
//!
//! Backend adapters implementing the `Transport` trait from `rns-domain`.
//! The engine never sees a concrete adapter; it only borrows `&dyn Transport`.
//!
//! # Transports
//!
//! - `MockTransport`: Scripted, call-recording transport for testing
//! - `OllamaTransport`: Local Ollama chat API integration
//!
//! # Examples
//!
//! ```
//! use rns_llm::MockTransport;
//! use rns_domain::Transport;
//!
//! let transport = MockTransport::with_responses("mock", ["<category>Document</category>"]);
//! let text = transport.generate("prompt", "sort", 64).unwrap();
//! assert_eq!(text, "<category>Document</category>");
//! assert_eq!(transport.call_count(), 1);
//! ```

#![warn(missing_docs)]

pub mod ollama;

use rns_domain::{Transport, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

pub use ollama::{OllamaConfig, OllamaTransport};

/// Errors that can occur while talking to a backend
#[derive(Error, Debug)]
pub enum LlmError {
    /// Network-level failure (connection refused, reset, DNS)
    #[error("Communication error: {0}")]
    Communication(String),

    /// Backend answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code
        status: u16,
        /// Error body as returned by the backend
        body: String,
    },

    /// Request did not complete in time
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Prompt too large for the model
    #[error("Context window exceeded: {0}")]
    ContextWindowExceeded(String),

    /// Backend refused on content-policy grounds
    #[error("Request refused: {0}")]
    Refused(String),

    /// Async runtime could not be created
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Invalid adapter configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether the adapter should retry the same request itself
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Communication(_) => true,
            LlmError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<LlmError> for TransportError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::ContextWindowExceeded(m) => TransportError::ContextWindowExceeded(m),
            LlmError::Refused(m) => TransportError::GuardrailViolation(m),
            other => TransportError::Unknown(other.to_string()),
        }
    }
}

/// One recorded call to a [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCall {
    /// Purpose label passed by the engine
    pub purpose: String,
    /// Prompt text
    pub prompt: String,
    /// Token budget
    pub max_tokens: u32,
}

/// Scripted transport for deterministic testing
///
/// Outcomes are served from a FIFO queue; once the queue is empty every call
/// fails with `Unknown("no response queued")`. A transport built with
/// [`MockTransport::failing`] returns the same error on every call instead.
///
/// # Examples
///
/// ```
/// use rns_llm::MockTransport;
/// use rns_domain::{Transport, TransportError};
///
/// let flaky = MockTransport::new("flaky");
/// flaky.push_error(TransportError::GuardrailViolation("refused".into()));
/// flaky.push_response("<new_name>Ok.pdf</new_name>");
///
/// assert!(flaky.generate("p", "rename", 64).is_err());
/// assert!(flaky.generate("p", "rename", 64).is_ok());
/// assert!(flaky.generate("p", "rename", 64).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct MockTransport {
    name: String,
    queue: Arc<Mutex<VecDeque<Result<String, TransportError>>>>,
    always_fail: Option<TransportError>,
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl MockTransport {
    /// Create a transport with an empty queue
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            always_fail: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a transport that serves `responses` in order
    pub fn with_responses<I, S>(name: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let transport = Self::new(name);
        for response in responses {
            transport.push_response(response);
        }
        transport
    }

    /// Create a transport that fails every call with `error`
    pub fn failing(name: impl Into<String>, error: TransportError) -> Self {
        Self {
            always_fail: Some(error),
            ..Self::new(name)
        }
    }

    /// Queue a successful response
    pub fn push_response(&self, text: impl Into<String>) {
        lock(&self.queue).push_back(Ok(text.into()));
    }

    /// Queue a failure
    pub fn push_error(&self, error: TransportError) {
        lock(&self.queue).push_back(Err(error));
    }

    /// Snapshot of every call made so far
    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Forget recorded calls (the queue is left untouched)
    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        prompt: &str,
        purpose: &str,
        max_tokens: u32,
    ) -> Result<String, TransportError> {
        lock(&self.calls).push(TransportCall {
            purpose: purpose.to_string(),
            prompt: prompt.to_string(),
            max_tokens,
        });

        if let Some(error) = &self.always_fail {
            return Err(error.clone());
        }

        lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Unknown("no response queued".to_string())))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rns_domain::FailureKind;

    #[test]
    fn test_mock_serves_queue_in_order() {
        let transport = MockTransport::with_responses("mock", ["one", "two"]);
        assert_eq!(transport.generate("p", "rename", 10).unwrap(), "one");
        assert_eq!(transport.generate("p", "rename", 10).unwrap(), "two");
    }

    #[test]
    fn test_mock_empty_queue_is_unknown() {
        let transport = MockTransport::new("mock");
        let err = transport.generate("p", "rename", 10).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unknown);
        assert_eq!(err.message(), "no response queued");
    }

    #[test]
    fn test_mock_failing_always_fails() {
        let transport = MockTransport::failing(
            "down",
            TransportError::GuardrailViolation("guardrail".into()),
        );
        transport.push_response("ignored");
        for _ in 0..3 {
            let err = transport.generate("p", "rename", 10).unwrap_err();
            assert_eq!(err.kind(), FailureKind::GuardrailViolation);
        }
        assert_eq!(transport.call_count(), 3);
    }

    #[test]
    fn test_mock_records_calls() {
        let transport = MockTransport::with_responses("mock", ["x"]);
        transport.generate("the prompt", "rename (format fix)", 42).unwrap();
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt, "the prompt");
        assert_eq!(calls[0].purpose, "rename (format fix)");
        assert_eq!(calls[0].max_tokens, 42);

        transport.reset_calls();
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_mock_clone_shares_state() {
        let first = MockTransport::with_responses("mock", ["only"]);
        let second = first.clone();

        first.generate("p", "sort", 10).unwrap();

        // Both handles see the same call log and queue
        assert_eq!(second.call_count(), 1);
        assert!(second.generate("p", "sort", 10).is_err());
    }

    #[test]
    fn test_llm_error_classification() {
        let err: TransportError = LlmError::ContextWindowExceeded("too long".into()).into();
        assert_eq!(err.kind(), FailureKind::ContextWindowExceeded);

        let err: TransportError = LlmError::Refused("unsafe".into()).into();
        assert_eq!(err.kind(), FailureKind::GuardrailViolation);

        let err: TransportError = LlmError::Timeout(30).into();
        assert_eq!(err.kind(), FailureKind::Unknown);
        assert!(err.message().contains("30s"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LlmError::Communication("reset".into()).is_retryable());
        assert!(LlmError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(LlmError::Http { status: 429, body: String::new() }.is_retryable());
        assert!(!LlmError::Http { status: 400, body: String::new() }.is_retryable());
        assert!(!LlmError::Timeout(5).is_retryable());
        assert!(!LlmError::ModelNotAvailable("m".into()).is_retryable());
    }
}
