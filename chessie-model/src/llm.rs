//! The backend-agnostic request/response contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sampling parameters for a single generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// Sampling temperature. `None` leaves the backend default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Upper bound on generated tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// A single-turn generation request: an optional system instruction and one
/// user prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Instruction sent with the `system` role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    /// The user prompt.
    pub prompt: String,
    /// Sampling parameters.
    pub config: GenerateConfig,
}

impl LlmRequest {
    /// Create a request for `prompt` with backend-default sampling.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { system_instruction: None, prompt: prompt.into(), config: GenerateConfig::default() }
    }

    /// Set the system instruction.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of generated tokens.
    pub fn with_max_output_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_output_tokens = Some(max_tokens);
        self
    }
}

/// The completion returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated text, untrimmed.
    pub text: String,
    /// Backend-reported reason the generation stopped (`stop`, `length`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl LlmResponse {
    /// Create a response with no finish reason.
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), finish_reason: None }
    }
}

/// A language-model backend.
///
/// Implementations must be safe to share across concurrent queries; nothing
/// about one call may depend on a previous one.
#[async_trait]
pub trait Llm: Send + Sync {
    /// Model identifier, used in logs.
    fn name(&self) -> &str;

    /// Generate a completion for `request`.
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse>;
}
