//! Error types for synchronia.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynchroniaError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio device errors (fatal to pipeline start)
    #[error("Audio device unavailable: {device}")]
    DeviceUnavailable { device: String },

    #[error("Audio device error: {message}")]
    DeviceError { message: String },

    /// Transient: a blocking read returned without data.
    #[error("Timed out waiting for audio")]
    Timeout,

    // Per-batch errors (non-fatal)
    #[error("Emotion inference failed: {message}")]
    Inference { message: String },

    #[error("Speech recognition failed: {message}")]
    Recognition { message: String },

    #[error("Speech recognition model not found at {path}")]
    RecognitionModelNotFound { path: String },

    // Advisory errors (replaced by fallback text, never surfaced to callers)
    #[error("Advisory service error: {message}")]
    AdvisoryService { message: String },

    // Export errors
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SynchroniaError>;
