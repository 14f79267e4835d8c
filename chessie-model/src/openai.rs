//! OpenAI-compatible chat-completions client.
//!
//! Works against any server implementing `POST {base}/chat/completions`:
//! OpenAI itself, Groq, Ollama and vLLM.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{LlmError, Result};
use crate::llm::{Llm, LlmRequest, LlmResponse};

/// OpenAI API base URL.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Groq OpenAI-compatible API base URL.
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Default Groq model: fast and on the free tier.
const DEFAULT_GROQ_MODEL: &str = "llama-3.1-8b-instant";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for an [`OpenAIClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAIConfig {
    /// Bearer token. May be empty for local servers that do not check it.
    pub api_key: String,
    /// API base URL without the trailing `/chat/completions`.
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl OpenAIConfig {
    /// Config for the public OpenAI API.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_API_BASE.to_string(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Config for Groq with the default `llama-3.1-8b-instant` model.
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::new(api_key, DEFAULT_GROQ_MODEL).with_base_url(GROQ_API_BASE)
    }

    /// Config for any other OpenAI-compatible server.
    pub fn compatible(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self::new(api_key, model).with_base_url(base_url)
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// [`Llm`] implementation for OpenAI-compatible chat-completions APIs.
pub struct OpenAIClient {
    client: reqwest::Client,
    config: OpenAIConfig,
}

impl OpenAIClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidConfig`] if the model or base URL is empty
    /// or the HTTP client cannot be built.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        if config.model.is_empty() {
            return Err(LlmError::InvalidConfig("model must not be empty".into()));
        }
        if config.base_url.is_empty() {
            return Err(LlmError::InvalidConfig("base_url must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn backend(&self) -> &'static str {
        if self.config.base_url.starts_with(GROQ_API_BASE) { "groq" } else { "openai" }
    }
}

// ── Chat-completions request/response types ────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn build_chat_request<'a>(model: &'a str, request: &'a LlmRequest) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system_instruction {
        messages.push(ChatMessage { role: "system", content: system });
    }
    messages.push(ChatMessage { role: "user", content: &request.prompt });

    ChatRequest {
        model,
        messages,
        temperature: request.config.temperature,
        top_p: request.config.top_p,
        max_tokens: request.config.max_output_tokens,
    }
}

fn parse_chat_response(backend: &str, body: &str) -> Result<LlmResponse> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        LlmError::InvalidResponse { backend: backend.into(), message: format!("{e}") }
    })?;
    let choice = parsed.choices.into_iter().next().ok_or_else(|| LlmError::InvalidResponse {
        backend: backend.into(),
        message: "response contained no choices".into(),
    })?;
    Ok(LlmResponse {
        text: choice.message.content.unwrap_or_default(),
        finish_reason: choice.finish_reason,
    })
}

#[async_trait]
impl Llm for OpenAIClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        let backend = self.backend();
        let body = build_chat_request(&self.config.model, &request);

        debug!(
            backend,
            model = %self.config.model,
            prompt_len = request.prompt.len(),
            max_tokens = ?request.config.max_output_tokens,
            "sending chat completion"
        );

        let mut http = self.client.post(self.config.endpoint()).json(&body);
        if !self.config.api_key.is_empty() {
            http = http.bearer_auth(&self.config.api_key);
        }

        let response = http.send().await.map_err(|e| {
            error!(backend, error = %e, "request failed");
            if e.is_timeout() {
                LlmError::Timeout { backend: backend.into(), seconds: self.config.timeout.as_secs() }
            } else {
                LlmError::Request { backend: backend.into(), message: format!("{e}") }
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| LlmError::Request {
            backend: backend.into(),
            message: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            let detail =
                serde_json::from_str::<ErrorResponse>(&text).map(|e| e.error.message).unwrap_or(text);
            error!(backend, %status, "API error");
            return Err(LlmError::Api {
                backend: backend.into(),
                status: status.as_u16(),
                message: detail,
            });
        }

        parse_chat_response(backend, &text)
    }
}
