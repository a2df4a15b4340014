//! Pluggable emotion classifier.

use crate::defaults;
use crate::error::{Result, SynchroniaError};
use std::sync::{Arc, Mutex};

/// A speech emotion classifier.
///
/// Implementations are stateful and not reentrant; the pipeline gives each
/// instance to exactly one worker thread, so `&mut self` is all the
/// synchronization they need.
pub trait EmotionModel: Send + 'static {
    /// Sample rate the model requires, in Hz.
    fn sample_rate(&self) -> u32 {
        defaults::MODEL_SAMPLE_RATE
    }

    /// Classify mono samples in [-1.0, 1.0] at `sample_rate()`.
    ///
    /// Returns one logit per class in `EmotionLabel` order. Models with more
    /// than four classes may return extra trailing logits.
    fn classify(&mut self, samples: &[f32]) -> Result<Vec<f32>>;

    /// Return the name of this model for logging.
    fn name(&self) -> &str;
}

/// Mock emotion model for testing.
///
/// Cycles through a list of logit vectors and can be told to fail on
/// specific calls. Every call records the input length it saw.
#[derive(Debug, Clone)]
pub struct MockEmotionModel {
    outputs: Vec<Vec<f32>>,
    fail_on_calls: Vec<usize>,
    calls: usize,
    seen_lengths: Arc<Mutex<Vec<usize>>>,
}

impl MockEmotionModel {
    /// Create a mock that always answers "neutral".
    pub fn new() -> Self {
        Self {
            outputs: vec![vec![2.0, 0.0, 0.0, 0.0]],
            fail_on_calls: Vec::new(),
            calls: 0,
            seen_lengths: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the mock to return these logits on every call.
    pub fn with_logits(mut self, logits: Vec<f32>) -> Self {
        self.outputs = vec![logits];
        self
    }

    /// Configure the mock to return these logit vectors in turn, cycling.
    pub fn with_sequence(mut self, outputs: Vec<Vec<f32>>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Configure the mock to fail on the given zero-based call numbers.
    pub fn with_failure_on(mut self, calls: &[usize]) -> Self {
        self.fail_on_calls = calls.to_vec();
        self
    }

    /// Shared log of input lengths passed to `classify`.
    pub fn seen_lengths(&self) -> Arc<Mutex<Vec<usize>>> {
        self.seen_lengths.clone()
    }
}

impl Default for MockEmotionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl EmotionModel for MockEmotionModel {
    fn classify(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let call = self.calls;
        self.calls += 1;
        if let Ok(mut seen) = self.seen_lengths.lock() {
            seen.push(samples.len());
        }

        if self.fail_on_calls.contains(&call) {
            return Err(SynchroniaError::Inference {
                message: format!("mock failure on call {call}"),
            });
        }
        if self.outputs.is_empty() {
            return Err(SynchroniaError::Inference {
                message: "mock has no outputs".to_string(),
            });
        }
        Ok(self.outputs[call % self.outputs.len()].clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
