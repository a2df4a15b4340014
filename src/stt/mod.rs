//! Streaming speech-to-text.

pub mod engine;
pub mod recognizer;
pub mod whisper;

pub use engine::{SpeechRecognitionEngine, clean_transcription};
pub use recognizer::{MockRecognizer, RecognizedText, SpeechRecognizer};
pub use whisper::{WhisperConfig, WhisperModel, WhisperRecognizer};
