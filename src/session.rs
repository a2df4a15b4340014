//! Session control surface: start/stop processing, goal and advice.

use crate::advisor::{AdvisoryService, OllamaAdvisor};
use crate::audio::source::AudioSource;
use crate::audio::wav::write_session_wav;
use crate::config::{Config, validate_batch_secs};
use crate::conversation::write_transcript;
use crate::emotion::{EmotionInferenceEngine, EmotionModel, ProsodyEmotionModel};
use crate::error::{Result, SynchroniaError};
use crate::pipeline::{Pipeline, PipelineHandle, PipelineObserver, PipelineParts, SessionSummary};
use crate::stt::{SpeechRecognitionEngine, SpeechRecognizer, WhisperModel};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Supplies the device, models and advisory service for each session.
///
/// Models are created fresh per session: their state belongs to that
/// session's worker threads.
pub trait Backends: Send {
    /// Open an input device by name (`None` = preferred default).
    ///
    /// # Errors
    /// `DeviceUnavailable` if the device cannot be opened.
    fn open_audio(&self, device_id: Option<&str>) -> Result<Box<dyn AudioSource>>;

    fn emotion_model(&self) -> Result<Box<dyn EmotionModel>>;

    fn recognizer(&self) -> Result<Box<dyn SpeechRecognizer>>;

    fn advisor(&self) -> Arc<dyn AdvisoryService>;
}

/// cpal capture, prosody emotion model, Whisper and Ollama.
pub struct DefaultBackends {
    config: Config,
    whisper: Mutex<Option<Arc<WhisperModel>>>,
    advisor: Arc<dyn AdvisoryService>,
}

impl DefaultBackends {
    pub fn new(config: Config) -> Result<Self> {
        let advisor = OllamaAdvisor::new(
            &config.advisor.endpoint,
            &config.advisor.model,
            Duration::from_secs(config.advisor.timeout_secs),
        )?;
        Ok(Self {
            config,
            whisper: Mutex::new(None),
            advisor: Arc::new(advisor),
        })
    }

    /// The Whisper model is loaded once and shared by later sessions.
    fn whisper_model(&self) -> Result<Arc<WhisperModel>> {
        let mut cached = self
            .whisper
            .lock()
            .map_err(|_| SynchroniaError::Other("whisper model cache poisoned".to_string()))?;
        if let Some(model) = cached.as_ref() {
            return Ok(model.clone());
        }
        let model = WhisperModel::load(self.config.whisper_config())?;
        *cached = Some(model.clone());
        Ok(model)
    }
}

impl Backends for DefaultBackends {
    #[cfg(feature = "cpal-audio")]
    fn open_audio(&self, device_id: Option<&str>) -> Result<Box<dyn AudioSource>> {
        let source = crate::audio::capture::CpalAudioSource::open(device_id)?;
        Ok(Box::new(source))
    }

    #[cfg(not(feature = "cpal-audio"))]
    fn open_audio(&self, device_id: Option<&str>) -> Result<Box<dyn AudioSource>> {
        tracing::error!("built without the cpal-audio feature, no capture devices");
        Err(SynchroniaError::DeviceUnavailable {
            device: device_id.unwrap_or("default").to_string(),
        })
    }

    fn emotion_model(&self) -> Result<Box<dyn EmotionModel>> {
        Ok(Box::new(ProsodyEmotionModel::new()))
    }

    fn recognizer(&self) -> Result<Box<dyn SpeechRecognizer>> {
        Ok(Box::new(self.whisper_model()?.recognizer()?))
    }

    fn advisor(&self) -> Arc<dyn AdvisoryService> {
        self.advisor.clone()
    }
}

/// One audio-processing session at a time, plus the results of the last one.
pub struct Session {
    backends: Box<dyn Backends>,
    config: Config,
    goal: Option<String>,
    handle: Option<PipelineHandle>,
    last_summary: Option<SessionSummary>,
}

impl Session {
    pub fn new(backends: Box<dyn Backends>, config: Config) -> Self {
        let goal = config.advisor.goal.clone();
        Self {
            backends,
            config,
            goal,
            handle: None,
            last_summary: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Start capturing and processing. Returns once threads are running.
    ///
    /// # Errors
    /// `DeviceUnavailable` if the device cannot be opened (nothing is
    /// started), `ConfigInvalidValue` for a batch length outside 1-10 s, or
    /// a model error if an engine cannot be created.
    pub fn start_processing(
        &mut self,
        device_id: Option<&str>,
        batch_secs: u32,
        observer: Box<dyn PipelineObserver>,
    ) -> Result<()> {
        if self.handle.is_some() {
            return Err(SynchroniaError::Other(
                "processing is already running".to_string(),
            ));
        }
        validate_batch_secs(batch_secs)?;

        // Models first: a missing model should not leave a device open.
        let emotion = EmotionInferenceEngine::new(self.backends.emotion_model()?)
            .with_min_secs(self.config.emotion.min_secs);
        let speech = SpeechRecognitionEngine::new(self.backends.recognizer()?);
        let source = self.backends.open_audio(device_id)?;
        tracing::info!(
            device = source.device_name(),
            emotion_model = emotion.model_name(),
            speech_model = speech.model_name(),
            batch_secs,
            "starting processing"
        );

        let mut pipeline_config = self.config.pipeline_config();
        pipeline_config.batch_secs = batch_secs;
        pipeline_config.goal = self.goal.clone();

        let handle = Pipeline::new(pipeline_config).start(PipelineParts {
            source,
            emotion,
            speech,
            advisor: self.backends.advisor(),
            observer,
        })?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop processing. Idempotent: returns `None` if nothing was running.
    pub fn stop_processing(&mut self) -> Option<&SessionSummary> {
        let handle = self.handle.take()?;
        let summary = handle.stop();
        tracing::info!(
            turns = summary.turns.len(),
            dropped_frames = summary.dropped_frames,
            clean = summary.clean_shutdown,
            "processing stopped"
        );
        self.last_summary = Some(summary);
        self.last_summary.as_ref()
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    pub fn set_goal(&mut self, goal: &str) {
        let goal = goal.trim();
        if goal.is_empty() {
            self.clear_goal();
            return;
        }
        self.goal = Some(goal.to_string());
        if let Some(handle) = &self.handle {
            handle.set_goal(goal);
        }
    }

    pub fn clear_goal(&mut self) {
        self.goal = None;
        if let Some(handle) = &self.handle {
            handle.clear_goal();
        }
    }

    /// Manual advice trigger. Same single-flight rule as the automatic one;
    /// returns false when rejected or not running.
    pub fn request_advice(&self) -> bool {
        match &self.handle {
            Some(handle) => handle.request_advice(),
            None => {
                tracing::warn!("advice requested while not processing");
                false
            }
        }
    }

    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }

    /// Export the last session's audio as mono 16 kHz WAV.
    pub fn save_audio(&self, path: &Path) -> Result<()> {
        let summary = self.finished_summary()?;
        write_session_wav(path, &summary.recording)
    }

    /// Export the last session's transcript as plain text.
    pub fn save_transcript(&self, path: &Path) -> Result<()> {
        let summary = self.finished_summary()?;
        write_transcript(path, &summary.turns)
    }

    fn finished_summary(&self) -> Result<&SessionSummary> {
        self.last_summary
            .as_ref()
            .ok_or_else(|| SynchroniaError::Other("no finished session to export".to_string()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_processing();
    }
}
