//! synchronia - real-time conversation coach
//!
//! Captures microphone audio in fixed batches, classifies emotion and
//! transcribes speech in parallel, keeps a running conversation state and
//! asks a local LLM for advice towards a user-set goal.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod advisor;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod conversation;
pub mod defaults;
pub mod emotion;
pub mod error;
#[cfg(feature = "cli")]
pub mod output;
pub mod pipeline;
pub mod session;
pub mod stt;

// Core traits (source → process → sink)
pub use advisor::AdvisoryService;
pub use audio::AudioSource;
pub use emotion::EmotionModel;
pub use pipeline::PipelineObserver;
pub use stt::SpeechRecognizer;

// Pipeline
pub use pipeline::orchestrator::{Pipeline, PipelineConfig, PipelineHandle, SessionSummary};

// Session control
pub use session::{Backends, DefaultBackends, Session};

// Error handling
pub use error::{Result, SynchroniaError};

// Config
pub use config::Config;

// Station framework (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};
pub use pipeline::station::Station;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
