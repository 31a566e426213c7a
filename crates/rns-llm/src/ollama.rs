//! Ollama Transport Implementation
//!
//! Provides integration with Ollama's local chat API.
//!
//! # Features
//!
//! - Async HTTP communication driven from a blocking `Transport` call
//! - Configurable endpoint, model, and optional system message
//! - Retry logic with exponential backoff for transient failures
//! - Timeout handling (surfaced as an unclassified failure)
//! - Classification of context-window and refusal errors
//!
//! # Examples
//!
//! ```no_run
//! use rns_llm::OllamaTransport;
//! use rns_domain::Transport;
//!
//! let transport = OllamaTransport::default_endpoint("llama3.2").unwrap();
//! let text = transport.generate("Say hello", "smoke test", 32).unwrap();
//! println!("{}", text);
//! ```

use crate::LlmError;
use rns_domain::{Transport, TransportError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default model name
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Default timeout for a single request (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default number of attempts for transient failures
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const CONTEXT_MARKERS: &[&str] = &[
    "context length",
    "context window",
    "context size",
    "exceeds the context",
    "too many tokens",
    "prompt is too long",
    "input is too long",
];

const REFUSAL_MARKERS: &[&str] = &[
    "guardrail",
    "content policy",
    "unsafe content",
    "safety",
    "refused",
];

/// Configuration for [`OllamaTransport`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// API endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model to use (e.g. "llama3.2", "mistral")
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts for transient failures (connection errors, 429, 5xx)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Optional system message sent before every prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
}

impl OllamaConfig {
    /// Configuration for `model` on the default endpoint
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.trim().is_empty() {
            return Err("endpoint must not be empty".to_string());
        }
        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".to_string());
        }
        if self.max_retries == 0 {
            return Err("max_retries must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            system_message: None,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Ollama chat transport for local inference
///
/// `generate` blocks the calling thread on a runtime owned by the transport,
/// so it must not be called from inside another async runtime.
pub struct OllamaTransport {
    name: String,
    config: OllamaConfig,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

/// Request body for the Ollama chat API
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    num_predict: u32,
}

/// Response from the Ollama chat API
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl OllamaTransport {
    /// Create a new transport from a configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the HTTP client or
    /// runtime cannot be built.
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        config.validate().map_err(LlmError::Config)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| LlmError::Runtime(e.to_string()))?;

        Ok(Self {
            name: format!("ollama:{}", config.model),
            config,
            client,
            runtime,
        })
    }

    /// Create a transport for `model` on `http://localhost:11434`
    pub fn default_endpoint(model: impl Into<String>) -> Result<Self, LlmError> {
        Self::new(OllamaConfig::for_model(model))
    }

    /// Set the maximum number of attempts for transient failures
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries.max(1);
        self
    }

    /// Set the system message
    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.config.system_message = Some(message.into());
        self
    }

    /// The active configuration
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn build_request<'a>(&'a self, prompt: &'a str, max_tokens: u32) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.config.system_message.as_deref() {
            if !system.trim().is_empty() {
                messages.push(ChatMessage {
                    role: "system",
                    content: system,
                });
            }
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        ChatRequest {
            model: &self.config.model,
            messages,
            stream: false,
            options: ChatOptions {
                num_predict: max_tokens,
            },
        }
    }

    /// Send one chat request and return the assistant message text
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Ollama is not running
    /// - Model is not available
    /// - The prompt exceeds the model's context window
    /// - The backend refuses the request
    /// - Response format is invalid
    pub async fn chat(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.config.endpoint.trim_end_matches('/'));
        let request_body = self.build_request(prompt, max_tokens);

        debug!("POST {} (model {}, {} prompt chars)", url, self.config.model, prompt.len());

        // Retry logic with exponential backoff
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.config.max_retries {
            let error = match self.client.post(&url).json(&request_body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let decoded = response.json::<ChatResponse>().await.map_err(|e| {
                            LlmError::InvalidResponse(format!("Failed to parse response: {}", e))
                        })?;
                        if decoded.done_reason.as_deref() == Some("length") {
                            debug!("Response hit the num_predict limit of {}", max_tokens);
                        }
                        return Ok(decoded.message.content);
                    }
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    classify_failure(status.as_u16(), &body)
                }
                Err(e) if e.is_timeout() => LlmError::Timeout(self.config.timeout_secs),
                Err(e) => LlmError::Communication(format!("Request failed: {}", e)),
            };

            if !error.is_retryable() {
                return Err(error);
            }

            attempts += 1;
            if attempts < self.config.max_retries {
                warn!("Ollama request failed ({}), retrying", error);
                // Exponential backoff: 1s, 2s, 4s, etc.
                let delay = Duration::from_secs(2u64.pow(attempts - 1));
                tokio::time::sleep(delay).await;
            }
            last_error = Some(error);
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Communication("Max retries exceeded".to_string())))
    }
}

impl Transport for OllamaTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        prompt: &str,
        purpose: &str,
        max_tokens: u32,
    ) -> Result<String, TransportError> {
        debug!("{} generate for '{}'", self.name, purpose);
        self.runtime
            .block_on(self.chat(prompt, max_tokens))
            .map_err(TransportError::from)
    }
}

/// Classify a non-success response from the backend
pub fn classify_failure(status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string());
    let lower = message.to_lowercase();

    if CONTEXT_MARKERS.iter().any(|m| lower.contains(m)) {
        return LlmError::ContextWindowExceeded(message);
    }
    if REFUSAL_MARKERS.iter().any(|m| lower.contains(m)) {
        return LlmError::Refused(message);
    }
    if status == 404 {
        return LlmError::ModelNotAvailable(message);
    }
    LlmError::Http {
        status,
        body: message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rns_domain::FailureKind;

    #[test]
    fn test_ollama_transport_creation() {
        let transport = OllamaTransport::default_endpoint("llama2").unwrap();
        assert_eq!(transport.config().endpoint, DEFAULT_ENDPOINT);
        assert_eq!(transport.config().model, "llama2");
        assert_eq!(transport.config().max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(transport.name(), "ollama:llama2");
    }

    #[test]
    fn test_ollama_transport_with_max_retries() {
        let transport = OllamaTransport::default_endpoint("llama2")
            .unwrap()
            .with_max_retries(5);
        assert_eq!(transport.config().max_retries, 5);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = OllamaConfig {
            model: String::new(),
            ..OllamaConfig::default()
        };
        assert!(matches!(OllamaTransport::new(config), Err(LlmError::Config(_))));
    }

    #[test]
    fn test_request_includes_system_message_and_budget() {
        let transport = OllamaTransport::default_endpoint("llama2")
            .unwrap()
            .with_system_message("Keep names aligned to: Client ACME");
        let request = transport.build_request("rename this", 96);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "llama2");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 96);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "rename this");
    }

    #[test]
    fn test_request_without_system_message() {
        let transport = OllamaTransport::default_endpoint("llama2").unwrap();
        let request = transport.build_request("p", 10);
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn test_classify_context_window() {
        let err = classify_failure(400, r#"{"error":"prompt is too long for the context window"}"#);
        assert!(matches!(err, LlmError::ContextWindowExceeded(_)));
    }

    #[test]
    fn test_classify_refusal() {
        let err = classify_failure(400, "Request blocked by guardrail");
        assert!(matches!(err, LlmError::Refused(_)));
    }

    #[test]
    fn test_classify_status_codes() {
        let err = classify_failure(404, r#"{"error":"model 'nope' not found"}"#);
        assert!(matches!(err, LlmError::ModelNotAvailable(ref m) if m.contains("nope")));

        let err = classify_failure(503, "busy");
        assert!(err.is_retryable());
        assert_eq!(TransportError::from(err).kind(), FailureKind::Unknown);
    }

    #[test]
    fn test_ollama_unreachable_is_unknown() {
        // Nothing listens on port 1
        let config = OllamaConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            timeout_secs: 5,
            max_retries: 1,
            ..OllamaConfig::default()
        };
        let transport = OllamaTransport::new(config).unwrap();

        let err = transport.generate("test", "rename", 16).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unknown);
    }

    #[test]
    fn test_config_from_toml_uses_defaults() {
        let config = OllamaConfig::from_toml("model = \"mistral\"\n").unwrap();
        assert_eq!(config.model, "mistral");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(config.system_message.is_none());
    }

    // Integration test (requires running Ollama)
    #[test]
    #[ignore] // Only run when Ollama is available
    fn test_ollama_generate_integration() {
        let transport = OllamaTransport::default_endpoint(DEFAULT_MODEL).unwrap();
        let response = transport
            .generate("Say 'hello' and nothing else", "integration", 16)
            .unwrap();
        assert!(!response.is_empty());
    }
}
