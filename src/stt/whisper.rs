//! Whisper-based streaming speech recognition.
//!
//! The loaded model (`WhisperModel`) is shareable; every processing session
//! gets its own `WhisperRecognizer` holding a private decoder state. Continuity
//! between batches comes from feeding the previous text back as the initial
//! prompt, which is why batches must arrive in order.
//!
//! # Feature Gate
//!
//! Requires the `whisper` feature (and cmake to build whisper.cpp):
//!
//! ```bash
//! cargo build --features whisper
//! ```

use crate::defaults;
use crate::error::{Result, SynchroniaError};
use crate::stt::recognizer::{RecognizedText, SpeechRecognizer};
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "whisper")]
use std::sync::Once;
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
    install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Characters of previous text carried into the next decode as prompt.
const PROMPT_CONTEXT_CHARS: usize = 200;

/// Configuration for the Whisper recognizer.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the ggml model file
    pub model_path: PathBuf,
    /// Language code (e.g., "en", "ru") or "auto"
    pub language: String,
    /// Number of threads for inference (None = whisper default)
    pub threads: Option<usize>,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(defaults::STT_MODEL),
            language: defaults::AUTO_LANGUAGE.to_string(),
            threads: None,
        }
    }
}

fn model_name_from_path(path: &std::path::Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Keep the tail of `text`, at most `max_chars` characters, on a char boundary.
fn prompt_tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}

/// A loaded Whisper model, shared between sessions.
#[cfg(feature = "whisper")]
pub struct WhisperModel {
    context: WhisperContext,
    config: WhisperConfig,
    model_name: String,
}

/// Whisper model placeholder (built without the `whisper` feature).
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperModel {
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperModel")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

#[cfg(feature = "whisper")]
impl WhisperModel {
    /// Load a Whisper model from disk.
    ///
    /// # Errors
    /// `RecognitionModelNotFound` if the file does not exist,
    /// `Recognition` if whisper.cpp rejects it.
    pub fn load(config: WhisperConfig) -> Result<Arc<Self>> {
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        if !config.model_path.exists() {
            return Err(SynchroniaError::RecognitionModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }

        let model_name = model_name_from_path(&config.model_path);
        let path = config
            .model_path
            .to_str()
            .ok_or_else(|| SynchroniaError::Recognition {
                message: "Invalid UTF-8 in model path".to_string(),
            })?;

        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| SynchroniaError::Recognition {
                message: format!("Failed to load Whisper model: {}", e),
            })?;

        tracing::info!(model = %model_name, "whisper model loaded");
        Ok(Arc::new(Self {
            context,
            config,
            model_name,
        }))
    }

    /// Create a recognizer with fresh decoder state.
    pub fn recognizer(self: &Arc<Self>) -> Result<WhisperRecognizer> {
        let state = self
            .context
            .create_state()
            .map_err(|e| SynchroniaError::Recognition {
                message: format!("Failed to create Whisper state: {}", e),
            })?;
        Ok(WhisperRecognizer {
            model: Arc::clone(self),
            state,
            prompt: String::new(),
        })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperModel {
    /// Load a Whisper model (stub: only checks the file exists).
    pub fn load(config: WhisperConfig) -> Result<Arc<Self>> {
        if !config.model_path.exists() {
            return Err(SynchroniaError::RecognitionModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }
        let model_name = model_name_from_path(&config.model_path);
        Ok(Arc::new(Self { config, model_name }))
    }

    /// Create a recognizer (stub: every feed fails).
    pub fn recognizer(self: &Arc<Self>) -> Result<WhisperRecognizer> {
        Ok(WhisperRecognizer {
            model: Arc::clone(self),
            prompt: String::new(),
        })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

/// Streaming recognizer owning one Whisper decoder state.
#[cfg(feature = "whisper")]
pub struct WhisperRecognizer {
    model: Arc<WhisperModel>,
    state: WhisperState,
    prompt: String,
}

#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperRecognizer {
    model: Arc<WhisperModel>,
    prompt: String,
}

#[cfg(feature = "whisper")]
impl SpeechRecognizer for WhisperRecognizer {
    fn feed(&mut self, audio: &[f32]) -> Result<Vec<RecognizedText>> {
        let config = &self.model.config;
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        if config.language == defaults::AUTO_LANGUAGE {
            params.set_language(None);
        } else {
            params.set_language(Some(&config.language));
        }
        if let Some(threads) = config.threads {
            params.set_n_threads(threads as i32);
        }
        if !self.prompt.is_empty() {
            params.set_initial_prompt(&self.prompt);
        }

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        self.state
            .full(params, audio)
            .map_err(|e| SynchroniaError::Recognition {
                message: format!("Whisper inference failed: {}", e),
            })?;

        let mut text = String::new();
        for segment in self.state.as_iter() {
            text.push_str(&segment.to_string());
        }
        let text = text.trim().to_string();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let combined = format!("{} {}", self.prompt, text);
        self.prompt = prompt_tail(combined.trim(), PROMPT_CONTEXT_CHARS);
        Ok(vec![RecognizedText::new(text)])
    }

    fn model_name(&self) -> &str {
        &self.model.model_name
    }
}

#[cfg(not(feature = "whisper"))]
impl SpeechRecognizer for WhisperRecognizer {
    fn feed(&mut self, _audio: &[f32]) -> Result<Vec<RecognizedText>> {
        self.prompt.clear();
        Err(SynchroniaError::Recognition {
            message: concat!(
                "Whisper feature not enabled. This binary was built without speech recognition.\n",
                "To fix: cargo build --release --features whisper"
            )
            .to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model.model_name
    }
}
