//! Grounded answer generation.
//!
//! [`GroundedGenerator`] turns a question and its [`EvidenceSet`] into an
//! [`AnswerPackage`]. It never calls the backend without evidence, never
//! returns an answer it cannot find in the evidence (unless verification is
//! switched off), and never fabricates an answer when the backend fails.

use std::sync::Arc;
use std::time::Duration;

use chessie_model::{Llm, LlmError, LlmRequest};
use regex::RegexBuilder;
use tracing::{debug, error, info, warn};

use crate::config::RagConfig;
use crate::document::{AnswerPackage, EvidenceSet};
use crate::error::{RagError, Result};
use crate::messages::{Language, Message, UNKNOWN_ANSWER, proof_explanation};
use crate::prompt::{GenerationMode, build_prompt, system_instruction};

/// Replies that mean the model could not answer, after
/// [`normalize_for_refusal`].
const REFUSALS: &[&str] = &["unknown", "i dont know", "i do not know", "not available"];

/// Generation parameters, usually taken from [`RagConfig`].
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub short_max_tokens: u32,
    pub short_temperature: f32,
    pub explain_max_tokens: u32,
    pub explain_temperature: f32,
    /// Bound on each backend call.
    pub timeout: Duration,
    /// Retries after a failed call.
    pub retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub backoff: Duration,
    pub verify_short_answer: bool,
    pub language: Language,
}

impl GeneratorSettings {
    pub fn from_config(config: &RagConfig) -> Self {
        Self {
            short_max_tokens: config.short_answer_max_tokens,
            short_temperature: config.short_answer_temperature,
            explain_max_tokens: config.explanation_max_tokens,
            explain_temperature: config.explanation_temperature,
            timeout: Duration::from_secs(config.generation_timeout_secs),
            retries: config.generation_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
            verify_short_answer: config.verify_short_answer,
            language: config.language,
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

/// Produces evidence-bound answers with a language-model backend.
///
/// - Empty evidence gives the abstention package without a backend call.
/// - [`GenerationMode::Short`] makes one call and explains the answer by
///   quoting the first evidence sentence that contains it.
/// - [`GenerationMode::Explain`] makes the short-answer call and the
///   explanation call concurrently over the same evidence.
pub struct GroundedGenerator {
    llm: Arc<dyn Llm>,
    settings: GeneratorSettings,
}

impl GroundedGenerator {
    pub fn new(llm: Arc<dyn Llm>, settings: GeneratorSettings) -> Self {
        Self { llm, settings }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// The fixed reply for a question with no evidence.
    pub fn abstention(language: Language) -> AnswerPackage {
        AnswerPackage {
            answer: UNKNOWN_ANSWER.to_string(),
            explanation: Message::Abstention.text(language).to_string(),
            grounded: false,
            sources: Vec::new(),
        }
    }

    /// Answer `question` from `evidence` alone.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`] if the backend fails or times
    /// out on every attempt.
    pub async fn answer(
        &self,
        question: &str,
        evidence: &EvidenceSet,
        mode: GenerationMode,
    ) -> Result<AnswerPackage> {
        if evidence.is_empty() {
            info!(mode = mode.as_str(), "no evidence, abstaining");
            return Ok(Self::abstention(self.settings.language));
        }

        let (short_reply, explain_reply) = match mode {
            GenerationMode::Short => (self.generate(question, evidence, mode).await?, None),
            GenerationMode::Explain => {
                let (short, explain) = tokio::try_join!(
                    self.generate(question, evidence, GenerationMode::Short),
                    self.generate(question, evidence, GenerationMode::Explain),
                )?;
                (short, Some(explain))
            }
        };

        let package = self.assemble(&short_reply, explain_reply.as_deref(), evidence);
        info!(
            mode = mode.as_str(),
            grounded = package.grounded,
            sources = package.sources.len(),
            "answer generated"
        );
        Ok(package)
    }

    fn assemble(
        &self,
        short_reply: &str,
        explain_reply: Option<&str>,
        evidence: &EvidenceSet,
    ) -> AnswerPackage {
        let language = self.settings.language;
        let sources = evidence.sources();
        let not_mentioned = || AnswerPackage {
            answer: UNKNOWN_ANSWER.to_string(),
            explanation: Message::NotClearlyMentioned.text(language).to_string(),
            grounded: false,
            sources: sources.clone(),
        };

        let answer = clean_short_answer(short_reply);
        if is_refusal(&answer) {
            debug!(reply = %short_reply, "backend declined to answer");
            return not_mentioned();
        }

        let proof = find_proof(evidence, &answer);
        if proof.is_none() && self.settings.verify_short_answer {
            warn!(answer = %answer, "short answer not found in evidence, discarding");
            return not_mentioned();
        }

        let explanation = match explain_reply.map(str::trim) {
            Some(text) if !text.is_empty() && !is_refusal(text) => text.to_string(),
            _ => match &proof {
                Some(sentence) => proof_explanation(language, sentence, &answer),
                None => Message::NotClearlyMentioned.text(language).to_string(),
            },
        };

        AnswerPackage { answer, explanation, grounded: proof.is_some(), sources }
    }

    async fn generate(
        &self,
        question: &str,
        evidence: &EvidenceSet,
        mode: GenerationMode,
    ) -> Result<String> {
        let (max_tokens, temperature) = match mode {
            GenerationMode::Short => (self.settings.short_max_tokens, self.settings.short_temperature),
            GenerationMode::Explain => {
                (self.settings.explain_max_tokens, self.settings.explain_temperature)
            }
        };
        let request = LlmRequest::new(build_prompt(question, evidence, mode))
            .with_system_instruction(system_instruction(mode))
            .with_temperature(temperature)
            .with_max_output_tokens(max_tokens);
        debug!(
            mode = mode.as_str(),
            prompt_chars = request.prompt.chars().count(),
            evidence = evidence.len(),
            "generation request"
        );
        self.call_with_retry(request, mode).await
    }

    /// Call the backend, retrying retryable failures with exponential backoff.
    async fn call_with_retry(&self, request: LlmRequest, mode: GenerationMode) -> Result<String> {
        let mut delay = self.settings.backoff;
        let mut attempt = 0;
        loop {
            let outcome =
                match tokio::time::timeout(self.settings.timeout, self.llm.generate(request.clone()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::Timeout {
                        backend: self.llm.name().to_string(),
                        seconds: self.settings.timeout.as_secs(),
                    }),
                };

            match outcome {
                Ok(response) => return Ok(response.text),
                Err(e) if e.is_retryable() && attempt < self.settings.retries => {
                    attempt += 1;
                    warn!(
                        backend = self.llm.name(),
                        mode = mode.as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "generation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => {
                    error!(
                        backend = self.llm.name(),
                        mode = mode.as_str(),
                        attempts = attempt + 1,
                        error = %e,
                        "generation failed"
                    );
                    return Err(RagError::from(e));
                }
            }
        }
    }
}

/// First line of the reply, without quotes or trailing punctuation.
fn clean_short_answer(reply: &str) -> String {
    let line = reply.trim().lines().next().unwrap_or_default();
    let line = line.strip_prefix("SHORT ANSWER:").unwrap_or(line);
    line.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '“' | '”'))
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | '।' | ','))
        .trim()
        .to_string()
}

/// Lowercase, drop punctuation and collapse whitespace.
fn normalize_for_refusal(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a reply is empty or a refusal such as `I don't know`.
pub(crate) fn is_refusal(reply: &str) -> bool {
    let normalized = normalize_for_refusal(reply);
    normalized.is_empty()
        || REFUSALS.iter().any(|r| normalized == *r || normalized.starts_with(&format!("{r} ")))
}

/// Whether `needle` occurs in `haystack` as a whole word or phrase,
/// ignoring case.
pub(crate) fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    let pattern = format!(r"(?:^|\W){}(?:$|\W)", regex::escape(needle));
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}

/// Split text into sentences, keeping terminators.
fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c == '\n' {
            if !current.trim().is_empty() {
                out.push(current.trim().to_string());
            }
            current.clear();
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?' | '।') {
            out.push(current.trim().to_string());
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

/// The first evidence sentence, in rank order, that contains `answer`.
pub(crate) fn find_proof(evidence: &EvidenceSet, answer: &str) -> Option<String> {
    evidence
        .iter()
        .flat_map(|e| sentences(&e.text))
        .find(|sentence| contains_phrase(sentence, answer))
}
