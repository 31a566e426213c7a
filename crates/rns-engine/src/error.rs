//! Error types for the Engine

use rns_domain::{FailureKind, TransportError};
use thiserror::Error;

/// A response that does not contain the required tags
///
/// Always carries the raw backend text so a failure can be diagnosed without
/// re-running the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ParseError {
    message: String,
    raw_text: String,
}

impl ParseError {
    /// Create a parse error for `raw_text`
    pub fn new(message: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            raw_text: raw_text.into(),
        }
    }

    /// What was wrong with the response
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The unmodified backend text
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }
}

/// Errors that can escape an engine run
#[derive(Error, Debug)]
pub enum EngineError {
    /// The last attempt returned text that could not be parsed
    #[error("Unparseable response from '{transport}': {source}")]
    Parse {
        /// Name of the transport that produced the text
        transport: String,
        /// Parser diagnostics, including the raw text
        #[source]
        source: ParseError,
    },

    /// The last attempt failed inside the transport
    #[error("Transport '{transport}' failed: {source}")]
    Transport {
        /// Name of the failing transport
        transport: String,
        /// Classified cause
        #[source]
        source: TransportError,
    },

    /// `run` was called with an empty transport list
    #[error("No transports configured")]
    NoTransports,

    /// Invalid configuration or request
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Failure kind of the attempt this error came from
    ///
    /// `None` for configuration errors, which never reach a backend.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            EngineError::Parse { .. } => Some(FailureKind::ParseError),
            EngineError::Transport { source, .. } => Some(source.kind()),
            EngineError::NoTransports | EngineError::Config(_) => None,
        }
    }

    /// Name of the transport the error came from, if any
    pub fn transport(&self) -> Option<&str> {
        match self {
            EngineError::Parse { transport, .. } | EngineError::Transport { transport, .. } => {
                Some(transport.as_str())
            }
            EngineError::NoTransports | EngineError::Config(_) => None,
        }
    }

    /// Raw backend text for parse failures
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            EngineError::Parse { source, .. } => Some(source.raw_text()),
            _ => None,
        }
    }
}
