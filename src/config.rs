use crate::defaults;
use crate::error::SynchroniaError;
use crate::pipeline::PipelineConfig;
use crate::stt::WhisperConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub emotion: EmotionConfig,
    pub stt: SttConfig,
    pub advisor: AdvisorConfig,
}

/// Audio capture and batching configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; `None` picks the preferred default
    pub device: Option<String>,
    /// Batch length in seconds (1-10)
    pub batch_secs: u32,
    pub read_timeout_ms: u64,
    /// Capture queue size (frames, drop-oldest)
    pub frame_queue: usize,
}

/// Emotion classification configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmotionConfig {
    /// Minimum classifier input length in seconds
    pub min_secs: f32,
    /// Batch queue size (drop-oldest)
    pub queue: usize,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    /// Path to the ggml model file
    pub model: String,
    pub language: String,
    pub threads: Option<usize>,
    /// Batch queue size (blocking)
    pub queue: usize,
}

/// Advisory service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdvisorConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Word budget of the transcript window sent with each request
    pub window_words: usize,
    /// New words needed before the next automatic request
    pub threshold_words: usize,
    pub goal: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            batch_secs: defaults::BATCH_SECS,
            read_timeout_ms: defaults::READ_TIMEOUT_MS,
            frame_queue: defaults::FRAME_QUEUE,
        }
    }
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            min_secs: defaults::MIN_CLASSIFY_SECS,
            queue: defaults::EMOTION_QUEUE,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: defaults::STT_MODEL.to_string(),
            language: defaults::AUTO_LANGUAGE.to_string(),
            threads: None,
            queue: defaults::SPEECH_QUEUE,
        }
    }
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::LLM_ENDPOINT.to_string(),
            model: defaults::LLM_MODEL.to_string(),
            timeout_secs: defaults::LLM_TIMEOUT_SECS,
            window_words: defaults::ADVISORY_WINDOW_WORDS,
            threshold_words: defaults::ADVISORY_THRESHOLD_WORDS,
            goal: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(SynchroniaError::from)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SYNCHRONIA_DEVICE → audio.device
    /// - SYNCHRONIA_MODEL → stt.model
    /// - SYNCHRONIA_LANGUAGE → stt.language
    /// - SYNCHRONIA_LLM_MODEL → advisor.model
    /// - SYNCHRONIA_LLM_ENDPOINT → advisor.endpoint
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(device) = std::env::var("SYNCHRONIA_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(model) = std::env::var("SYNCHRONIA_MODEL")
            && !model.is_empty()
        {
            self.stt.model = model;
        }

        if let Ok(language) = std::env::var("SYNCHRONIA_LANGUAGE")
            && !language.is_empty()
        {
            self.stt.language = language;
        }

        if let Ok(model) = std::env::var("SYNCHRONIA_LLM_MODEL")
            && !model.is_empty()
        {
            self.advisor.model = model;
        }

        if let Ok(endpoint) = std::env::var("SYNCHRONIA_LLM_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.advisor.endpoint = endpoint;
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), SynchroniaError> {
        validate_batch_secs(self.audio.batch_secs)?;
        let positive = [
            ("audio.read_timeout_ms", self.audio.read_timeout_ms as usize),
            ("audio.frame_queue", self.audio.frame_queue),
            ("emotion.queue", self.emotion.queue),
            ("stt.queue", self.stt.queue),
            ("advisor.timeout_secs", self.advisor.timeout_secs as usize),
            ("advisor.window_words", self.advisor.window_words),
            ("advisor.threshold_words", self.advisor.threshold_words),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(SynchroniaError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if !self.emotion.min_secs.is_finite() || self.emotion.min_secs <= 0.0 {
            return Err(SynchroniaError::ConfigInvalidValue {
                key: "emotion.min_secs".to_string(),
                message: format!("must be a positive number, got {}", self.emotion.min_secs),
            });
        }
        Ok(())
    }

    /// Pipeline settings for one session.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            batch_secs: self.audio.batch_secs,
            read_timeout: Duration::from_millis(self.audio.read_timeout_ms),
            frame_queue: self.audio.frame_queue,
            emotion_queue: self.emotion.queue,
            speech_queue: self.stt.queue,
            window_words: self.advisor.window_words,
            threshold_words: self.advisor.threshold_words,
            advisor_timeout: Duration::from_secs(self.advisor.timeout_secs),
            goal: self.advisor.goal.clone(),
            ..PipelineConfig::default()
        }
    }

    pub fn whisper_config(&self) -> WhisperConfig {
        WhisperConfig {
            model_path: PathBuf::from(&self.stt.model),
            language: self.stt.language.clone(),
            threads: self.stt.threads,
        }
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/synchronia/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synchronia")
            .join("config.toml")
    }
}

/// Batch length must be within 1-10 seconds.
pub fn validate_batch_secs(batch_secs: u32) -> Result<(), SynchroniaError> {
    if !(defaults::MIN_BATCH_SECS..=defaults::MAX_BATCH_SECS).contains(&batch_secs) {
        return Err(SynchroniaError::ConfigInvalidValue {
            key: "audio.batch_secs".to_string(),
            message: format!(
                "must be between {} and {} seconds, got {}",
                defaults::MIN_BATCH_SECS,
                defaults::MAX_BATCH_SECS,
                batch_secs
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_synchronia_env() {
        for key in [
            "SYNCHRONIA_DEVICE",
            "SYNCHRONIA_MODEL",
            "SYNCHRONIA_LANGUAGE",
            "SYNCHRONIA_LLM_MODEL",
            "SYNCHRONIA_LLM_ENDPOINT",
        ] {
            remove_env(key);
        }
    }

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.batch_secs, 3);
        assert_eq!(config.audio.read_timeout_ms, 100);
        assert_eq!(config.emotion.min_secs, 1.0);
        assert_eq!(config.stt.language, "auto");
        assert_eq!(config.advisor.endpoint, "http://localhost:11434");
        assert_eq!(config.advisor.model, "deepseek-llm:7b");
        assert_eq!(config.advisor.window_words, 50);
        assert_eq!(config.advisor.threshold_words, 50);
        assert_eq!(config.advisor.goal, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_file = write_temp(
            r#"
            [audio]
            device = "USB Microphone"
            batch_secs = 5

            [emotion]
            queue = 2

            [stt]
            model = "/models/ggml-small.bin"
            language = "ru"
            threads = 4

            [advisor]
            model = "llama3"
            window_words = 80
            goal = "negotiate a raise"
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.device, Some("USB Microphone".to_string()));
        assert_eq!(config.audio.batch_secs, 5);
        assert_eq!(config.emotion.queue, 2);
        assert_eq!(config.stt.model, "/models/ggml-small.bin");
        assert_eq!(config.stt.language, "ru");
        assert_eq!(config.stt.threads, Some(4));
        assert_eq!(config.advisor.model, "llama3");
        assert_eq!(config.advisor.window_words, 80);
        assert_eq!(config.advisor.goal, Some("negotiate a raise".to_string()));
        // Untouched fields keep defaults
        assert_eq!(config.advisor.threshold_words, 50);
    }

    #[test]
    fn test_pipeline_config_mirrors_settings() {
        let mut config = Config::default();
        config.audio.batch_secs = 7;
        config.advisor.goal = Some("goal".to_string());

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.batch_secs, 7);
        assert_eq!(pipeline.read_timeout, Duration::from_millis(100));
        assert_eq!(pipeline.goal, Some("goal".to_string()));
        assert_eq!(pipeline.advisor_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_batch_length_out_of_range() {
        for secs in [0, 11] {
            let mut config = Config::default();
            config.audio.batch_secs = secs;
            match config.validate() {
                Err(SynchroniaError::ConfigInvalidValue { key, .. }) => {
                    assert_eq!(key, "audio.batch_secs");
                }
                other => panic!("Expected ConfigInvalidValue, got {:?}", other),
            }
        }
        assert!(validate_batch_secs(1).is_ok());
        assert!(validate_batch_secs(10).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = Config::default();
        config.advisor.window_words = 0;
        assert!(matches!(
            config.validate(),
            Err(SynchroniaError::ConfigInvalidValue { key, .. }) if key == "advisor.window_words"
        ));
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_synchronia_env();

        set_env("SYNCHRONIA_DEVICE", "pulse");
        set_env("SYNCHRONIA_MODEL", "/tmp/ggml-tiny.bin");
        set_env("SYNCHRONIA_LANGUAGE", "fr");
        set_env("SYNCHRONIA_LLM_MODEL", "mistral");
        set_env("SYNCHRONIA_LLM_ENDPOINT", "http://gpu-box:11434");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.audio.device, Some("pulse".to_string()));
        assert_eq!(config.stt.model, "/tmp/ggml-tiny.bin");
        assert_eq!(config.stt.language, "fr");
        assert_eq!(config.advisor.model, "mistral");
        assert_eq!(config.advisor.endpoint, "http://gpu-box:11434");

        clear_synchronia_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_synchronia_env();

        set_env("SYNCHRONIA_LLM_MODEL", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.advisor.model, "deepseek-llm:7b");

        clear_synchronia_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_file = write_temp(
            r#"
            [audio
            device = "broken
        "#,
        );
        let err = Config::load(temp_file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SynchroniaError>(),
            Some(SynchroniaError::Config(_))
        ));
        let err = Config::load_or_default(temp_file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SynchroniaError>(),
            Some(SynchroniaError::Config(_))
        ));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_default_path_ends_with_app_dir() {
        let path = Config::default_path();
        assert!(path.ends_with("synchronia/config.toml"));
    }

    #[test]
    fn test_config_roundtrips_through_toml() {
        let mut config = Config::default();
        config.advisor.goal = Some("stay calm".to_string());
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
