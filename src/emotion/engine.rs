//! Batch preprocessing and classification.

use crate::audio::convert::{peak_normalize, resample_f32, tile_to_min_len, to_mono_f32};
use crate::defaults;
use crate::emotion::label::EmotionDistribution;
use crate::emotion::model::EmotionModel;
use crate::error::Result;
use crate::pipeline::types::AudioBatch;

/// Turns audio batches into emotion distributions.
///
/// Owns its model exclusively; not meant to be shared between threads.
pub struct EmotionInferenceEngine {
    model: Box<dyn EmotionModel>,
    min_secs: f32,
}

impl EmotionInferenceEngine {
    pub fn new(model: Box<dyn EmotionModel>) -> Self {
        Self {
            model,
            min_secs: defaults::MIN_CLASSIFY_SECS,
        }
    }

    /// Override the minimum classifier input length.
    pub fn with_min_secs(mut self, min_secs: f32) -> Self {
        self.min_secs = min_secs.max(0.0);
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Model-ready samples for a batch.
    ///
    /// In order: channel-average to mono, peak-normalize to [-1, 1], tile
    /// short input up to exactly the minimum length, resample to the model
    /// rate. Deterministic for a given batch.
    pub fn preprocess(&self, batch: &AudioBatch) -> Vec<f32> {
        let mut samples = to_mono_f32(&batch.samples, batch.channels);
        peak_normalize(&mut samples);

        let native_floor = (self.min_secs * batch.sample_rate as f32).round() as usize;
        let samples = tile_to_min_len(&samples, native_floor);

        let model_rate = self.model.sample_rate();
        let samples = resample_f32(&samples, batch.sample_rate, model_rate);

        // Rounding in the resampler may leave the signal a sample short.
        let model_floor = (self.min_secs * model_rate as f32).round() as usize;
        tile_to_min_len(&samples, model_floor)
    }

    /// Classify one batch.
    ///
    /// # Errors
    /// `SynchroniaError::Inference` if the model fails or produces output that
    /// cannot be turned into a four-label distribution.
    pub fn classify(&mut self, batch: &AudioBatch) -> Result<EmotionDistribution> {
        let samples = self.preprocess(batch);
        let logits = self.model.classify(&samples)?;
        EmotionDistribution::from_logits(&logits)
    }
}
