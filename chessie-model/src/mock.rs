//! Mock backend for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{LlmError, Result};
use crate::llm::{Llm, LlmRequest, LlmResponse};

type Handler = dyn Fn(&LlmRequest) -> Result<String> + Send + Sync;

/// A scripted [`Llm`] that records every request it receives.
///
/// # Example
///
/// ```rust
/// use chessie_model::{Llm, LlmRequest, MockLlm};
///
/// # tokio_test_block(async {
/// let llm = MockLlm::new("King");
/// let response = llm.generate(LlmRequest::new("Who is the most important?")).await.unwrap();
/// assert_eq!(response.text, "King");
/// assert_eq!(llm.call_count(), 1);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct MockLlm {
    name: String,
    handler: Arc<Handler>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<LlmRequest>>>,
}

impl MockLlm {
    /// A mock that always answers `text`.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::with_handler(move |_| Ok(text.clone()))
    }

    /// A mock whose answer is computed from the request.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name: "mock".to_string(),
            handler: Arc::new(handler),
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock that fails every call with a retryable request error.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_handler(move |_| {
            Err(LlmError::Request { backend: "mock".to_string(), message: message.clone() })
        })
    }

    /// Number of `generate` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in call order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl std::fmt::Debug for MockLlm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlm").field("calls", &self.call_count()).finish()
    }
}

#[async_trait]
impl Llm for MockLlm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = (self.handler)(&request);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        result.map(LlmResponse::text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_requests_and_counts_calls() {
        let llm = MockLlm::with_handler(|req| Ok(req.prompt.to_uppercase()));
        let first = llm.generate(LlmRequest::new("pawn")).await.unwrap();
        let _ = llm.generate(LlmRequest::new("rook").with_temperature(0.1)).await.unwrap();

        assert_eq!(first.text, "PAWN");
        assert_eq!(llm.call_count(), 2);
        let requests = llm.requests();
        assert_eq!(requests[1].prompt, "rook");
        assert_eq!(requests[1].config.temperature, Some(0.1));
    }

    #[tokio::test]
    async fn failing_mock_still_counts() {
        let llm = MockLlm::failing("down");
        assert!(llm.generate(LlmRequest::new("q")).await.is_err());
        assert_eq!(llm.call_count(), 1);
    }
}
