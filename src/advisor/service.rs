//! Advisory service boundary.

use crate::advisor::request::AdvisoryRequest;
use crate::error::{Result, SynchroniaError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shown whenever the advisory service cannot produce an answer.
pub const FALLBACK_ADVICE: &str = "Advice unavailable, general suggestions:\n\n\
1. The other person seems engaged with the topic, ask clarifying questions.\n\
2. Keep the conversation positive.\n\
3. Use open questions to learn more.\n\
4. Show empathy and understanding.\n\
5. Watch the other person's emotional state.";

/// A text-generation backend that turns a request into advice.
#[async_trait::async_trait]
pub trait AdvisoryService: Send + Sync {
    /// Produce advice text for `request`.
    ///
    /// # Errors
    /// `AdvisoryService` on network failure or a malformed response.
    async fn advise(&self, request: &AdvisoryRequest) -> Result<String>;

    /// Service name, for logging.
    fn name(&self) -> &str;
}

/// Mock advisory service for testing.
///
/// Answers with a fixed response (or fails), optionally after a delay, and
/// records every request it received.
#[derive(Debug, Clone)]
pub struct MockAdvisor {
    response: String,
    should_fail: bool,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<AdvisoryRequest>>>,
}

impl MockAdvisor {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            should_fail: false,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the mock to fail every call.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure how long each call takes.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared call counter.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Shared log of received requests.
    pub fn requests(&self) -> Arc<Mutex<Vec<AdvisoryRequest>>> {
        self.requests.clone()
    }
}

#[async_trait::async_trait]
impl AdvisoryService for MockAdvisor {
    async fn advise(&self, request: &AdvisoryRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.should_fail {
            return Err(SynchroniaError::AdvisoryService {
                message: "mock advisory failure".to_string(),
            });
        }
        Ok(self.response.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
