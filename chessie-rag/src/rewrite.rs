//! Rewrites casual or mixed-language questions into plain factual questions
//! before retrieval. The rewrite only steers the search; generation still
//! sees the question exactly as asked.

use std::sync::Arc;
use std::time::Duration;

use chessie_model::{Llm, LlmRequest};
use tracing::{debug, warn};

use crate::cache::TtlCache;

/// Inputs shorter than this are returned unchanged.
const MIN_REWRITE_CHARS: usize = 3;

/// Rewrites longer than this are treated as the model going off-script.
const MAX_REWRITE_CHARS: usize = 200;

const REWRITE_MAX_TOKENS: u32 = 50;

const REWRITER_SYSTEM: &str = "You are a QUERY REWRITER for a children's chess learning app. \
Rewrite the question into one short, plain question using standard chess terms in English \
(king, queen, pawn, rook, bishop, knight, board, move, attack, capture, check, checkmate). \
Keep Hindi question words such as kaise, kya, kahan, kaun. \
Output ONLY the rewritten question on a single line. Do NOT answer it, explain it, or change its intent. \
If it is already clean, return it unchanged.";

/// Backend-driven question rewriter with a result cache.
pub struct QueryRewriter {
    llm: Arc<dyn Llm>,
    cache: TtlCache<String>,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn Llm>, ttl: Duration, max_entries: usize) -> Self {
        Self { llm, cache: TtlCache::new(ttl, max_entries) }
    }

    /// The rewritten question, or the trimmed original when the input is
    /// tiny, the backend fails, or its output is unusable. Never errors.
    pub async fn rewrite(&self, question: &str) -> String {
        let original = question.trim();
        if original.chars().count() < MIN_REWRITE_CHARS {
            return original.to_string();
        }
        if let Some(hit) = self.cache.get(original) {
            return hit;
        }

        let request = LlmRequest::new(format!("Rewrite this question:\n{original}"))
            .with_system_instruction(REWRITER_SYSTEM)
            .with_temperature(0.0)
            .with_max_output_tokens(REWRITE_MAX_TOKENS);

        let rewritten = match self.llm.generate(request).await {
            Ok(response) => {
                let text = response.text.trim();
                if text.is_empty() || text.contains('\n') || text.chars().count() > MAX_REWRITE_CHARS
                {
                    debug!(output_chars = text.chars().count(), "rewrite rejected, using original");
                    original.to_string()
                } else {
                    text.to_string()
                }
            }
            Err(e) => {
                warn!(backend = self.llm.name(), error = %e, "query rewrite failed, using original");
                return original.to_string();
            }
        };

        debug!(original = %original, rewritten = %rewritten, "query rewritten");
        self.cache.insert(original.to_string(), rewritten.clone());
        rewritten
    }
}

#[cfg(test)]
mod tests {
    use chessie_model::MockLlm;

    use super::*;

    fn rewriter(llm: &MockLlm) -> QueryRewriter {
        QueryRewriter::new(Arc::new(llm.clone()), Duration::from_secs(60), 16)
    }

    #[tokio::test]
    async fn rewrites_and_caches() {
        let llm = MockLlm::new("king kaise chalta hai");
        let rewriter = rewriter(&llm);
        assert_eq!(rewriter.rewrite("किंग कैसे चलता है").await, "king kaise chalta hai");
        assert_eq!(rewriter.rewrite("  किंग कैसे चलता है ").await, "king kaise chalta hai");
        assert_eq!(llm.call_count(), 1);

        let request = &llm.requests()[0];
        assert_eq!(request.config.temperature, Some(0.0));
        assert_eq!(request.config.max_output_tokens, Some(50));
    }

    #[tokio::test]
    async fn tiny_input_is_passed_through() {
        let llm = MockLlm::new("anything");
        assert_eq!(rewriter(&llm).rewrite(" k ").await, "k");
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn multi_line_output_falls_back() {
        let llm = MockLlm::new("king moves\nOne square at a time.");
        assert_eq!(rewriter(&llm).rewrite("how king move").await, "how king move");
    }

    #[tokio::test]
    async fn overlong_output_falls_back() {
        let llm = MockLlm::new("x".repeat(201));
        assert_eq!(rewriter(&llm).rewrite("how king move").await, "how king move");
    }

    #[tokio::test]
    async fn backend_error_falls_back_and_is_not_cached() {
        let llm = MockLlm::failing("down");
        let rewriter = rewriter(&llm);
        assert_eq!(rewriter.rewrite("how king move").await, "how king move");
        assert_eq!(rewriter.rewrite("how king move").await, "how king move");
        assert_eq!(llm.call_count(), 2);
    }
}
