//! Default configuration constants for synchronia.
//!
//! Shared between the TOML config layer and the pipeline so that both agree
//! on what "unset" means.

/// Sample rate the emotion classifier and speech recognizer expect, in Hz.
pub const MODEL_SAMPLE_RATE: u32 = 16000;

/// Sample rate of the exported session recording, in Hz.
pub const EXPORT_SAMPLE_RATE: u32 = 16000;

/// Default batch length in seconds.
///
/// Three seconds is long enough for a phrase and short enough to keep the
/// emotion readout responsive.
pub const BATCH_SECS: u32 = 3;

/// Smallest user-selectable batch length in seconds.
pub const MIN_BATCH_SECS: u32 = 1;

/// Largest user-selectable batch length in seconds.
pub const MAX_BATCH_SECS: u32 = 10;

/// Minimum classifier input length in seconds; shorter batches are tiled.
pub const MIN_CLASSIFY_SECS: f32 = 1.0;

/// Upper bound on one blocking device read, in milliseconds.
///
/// Also bounds how long `close()` can take to unblock the capture thread.
pub const READ_TIMEOUT_MS: u64 = 100;

/// Frames buffered between capture and segmenter before the oldest is dropped.
pub const FRAME_QUEUE: usize = 256;

/// Batches buffered ahead of the emotion worker before the oldest is dropped.
pub const EMOTION_QUEUE: usize = 4;

/// Batches buffered ahead of the speech worker; producers block when full.
pub const SPEECH_QUEUE: usize = 8;

/// Default word budget for the advisory context window.
pub const ADVISORY_WINDOW_WORDS: usize = 50;

/// Default number of new words that triggers an automatic advisory request.
pub const ADVISORY_THRESHOLD_WORDS: usize = 50;

/// Default text-generation endpoint (local Ollama).
pub const LLM_ENDPOINT: &str = "http://localhost:11434";

/// Default text-generation model.
pub const LLM_MODEL: &str = "deepseek-llm:7b";

/// Default timeout for one advisory call, in seconds.
pub const LLM_TIMEOUT_SECS: u64 = 60;

/// Default Whisper model path.
pub const STT_MODEL: &str = "models/ggml-base.bin";

/// Language value that lets the recognizer detect the language itself.
pub const AUTO_LANGUAGE: &str = "auto";

/// How long `stop()` waits for worker threads before detaching them.
pub const SHUTDOWN_TIMEOUT_MS: u64 = 2000;
