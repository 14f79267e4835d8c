//! # chessie-model
//!
//! Language-model backends used by the Chessie grounded generator.
//!
//! ## Overview
//!
//! Every backend implements the [`Llm`] trait: one prompt in, one completion
//! out. Backends are stateless remote dependencies addressed per call, so a
//! single `Arc<dyn Llm>` is shared by all in-flight queries.
//!
//! - [`OpenAIClient`] - any OpenAI-compatible chat-completions API
//!   (OpenAI, Groq, Ollama, vLLM)
//! - [`MockLlm`] - scripted backend with call counting, for tests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chessie_model::{Llm, LlmRequest, OpenAIClient, OpenAIConfig};
//!
//! let client = OpenAIClient::new(OpenAIConfig::groq(std::env::var("GROQ_API_KEY")?))?;
//! let request = LlmRequest::new("Who protects the king?").with_temperature(0.0);
//! let response = client.generate(request).await?;
//! println!("{}", response.text);
//! ```

pub mod error;
pub mod llm;
pub mod mock;
pub mod openai;

pub use error::{LlmError, Result};
pub use llm::{GenerateConfig, Llm, LlmRequest, LlmResponse};
pub use mock::MockLlm;
pub use openai::{GROQ_API_BASE, OPENAI_API_BASE, OpenAIClient, OpenAIConfig};
