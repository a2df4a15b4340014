use crate::emotion::EmotionLabel;
use crate::error::{Result, SynchroniaError};
use std::sync::{Arc, Mutex};

/// Text finalized by a recognizer, with an optional emotion label the
/// recognizer itself attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    pub emotion_hint: Option<EmotionLabel>,
}

impl RecognizedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emotion_hint: None,
        }
    }
}

/// Trait for streaming speech-to-text.
///
/// Recognizers keep decoder state between calls, so audio must be fed in
/// capture order from a single thread.
pub trait SpeechRecognizer: Send + 'static {
    /// Feed the next span of audio.
    ///
    /// # Arguments
    /// * `audio` - Mono samples in [-1.0, 1.0] at 16kHz
    ///
    /// # Returns
    /// Text finalized by this span; empty for silence.
    fn feed(&mut self, audio: &[f32]) -> Result<Vec<RecognizedText>>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;
}

/// Mock recognizer for testing.
///
/// Returns scripted responses in order (an empty string means "nothing
/// recognized"), then nothing. Records the length of every fed span.
#[derive(Debug, Clone)]
pub struct MockRecognizer {
    model_name: String,
    responses: Vec<String>,
    calls: usize,
    fail_on_calls: Vec<usize>,
    fed: Arc<Mutex<Vec<usize>>>,
}

impl MockRecognizer {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            responses: Vec::new(),
            calls: 0,
            fail_on_calls: Vec::new(),
            fed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the responses for successive calls.
    pub fn with_responses(mut self, responses: &[&str]) -> Self {
        self.responses = responses.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Configure the mock to fail on the given zero-based call numbers.
    pub fn with_failure_on(mut self, calls: &[usize]) -> Self {
        self.fail_on_calls = calls.to_vec();
        self
    }

    /// Shared log of fed span lengths.
    pub fn fed_lengths(&self) -> Arc<Mutex<Vec<usize>>> {
        self.fed.clone()
    }
}

impl SpeechRecognizer for MockRecognizer {
    fn feed(&mut self, audio: &[f32]) -> Result<Vec<RecognizedText>> {
        let call = self.calls;
        self.calls += 1;
        if let Ok(mut fed) = self.fed.lock() {
            fed.push(audio.len());
        }

        if self.fail_on_calls.contains(&call) {
            return Err(SynchroniaError::Recognition {
                message: format!("mock failure on call {call}"),
            });
        }

        Ok(self
            .responses
            .get(call)
            .filter(|text| !text.is_empty())
            .map(|text| vec![RecognizedText::new(text.clone())])
            .unwrap_or_default())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_recognizer_returns_responses_in_order() {
        let mut recognizer = MockRecognizer::new("test").with_responses(&["hello", "", "world"]);

        assert_eq!(
            recognizer.feed(&[0.0; 10]).unwrap(),
            vec![RecognizedText::new("hello")]
        );
        assert!(recognizer.feed(&[0.0; 10]).unwrap().is_empty());
        assert_eq!(
            recognizer.feed(&[0.0; 10]).unwrap(),
            vec![RecognizedText::new("world")]
        );
        assert!(recognizer.feed(&[0.0; 10]).unwrap().is_empty());
    }

    #[test]
    fn test_mock_recognizer_failure() {
        let mut recognizer = MockRecognizer::new("test").with_failure_on(&[0]);
        match recognizer.feed(&[0.0]) {
            Err(SynchroniaError::Recognition { message }) => {
                assert_eq!(message, "mock failure on call 0");
            }
            other => panic!("Expected Recognition error, got {:?}", other),
        }
    }

    #[test]
    fn test_mock_recognizer_records_fed_lengths() {
        let mut recognizer = MockRecognizer::new("test");
        let fed = recognizer.fed_lengths();
        recognizer.feed(&[0.0; 5]).unwrap();
        recognizer.feed(&[0.0; 7]).unwrap();
        assert_eq!(*fed.lock().unwrap(), vec![5, 7]);
    }

    #[test]
    fn test_mock_recognizer_model_name() {
        assert_eq!(MockRecognizer::new("whisper-base").model_name(), "whisper-base");
    }
}
