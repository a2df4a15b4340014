//! Weight-free emotion model driven by prosody features.
//!
//! Uses RMS energy and zero-crossing rate of the normalized signal. It is a
//! coarse stand-in so the pipeline runs end to end without a trained
//! classifier; swap in a real `EmotionModel` for meaningful labels.

use crate::emotion::model::EmotionModel;
use crate::error::{Result, SynchroniaError};

/// Prosody features of one classifier input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProsodyFeatures {
    /// Root-mean-square amplitude, 0.0..=1.0 for normalized input.
    pub energy_rms: f32,
    /// Fraction of adjacent sample pairs that change sign, 0.0..=1.0.
    pub zero_crossing_rate: f32,
}

impl ProsodyFeatures {
    pub fn extract(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self {
                energy_rms: 0.0,
                zero_crossing_rate: 0.0,
            };
        }
        let energy = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count();
        let pairs = samples.len().saturating_sub(1).max(1);
        Self {
            energy_rms: energy.sqrt(),
            zero_crossing_rate: crossings as f32 / pairs as f32,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProsodyEmotionModel;

impl ProsodyEmotionModel {
    pub fn new() -> Self {
        Self
    }

    /// Logits in `EmotionLabel` order: neutral, anger, joy, sadness.
    fn logits(features: ProsodyFeatures) -> Vec<f32> {
        let rms = features.energy_rms;
        let zcr = features.zero_crossing_rate;
        vec![
            1.0,
            5.0 * rms + 6.0 * zcr - 2.5,
            8.0 * zcr + rms - 1.5,
            1.5 - 5.0 * rms - 6.0 * zcr,
        ]
    }
}

impl EmotionModel for ProsodyEmotionModel {
    fn classify(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        if samples.is_empty() {
            return Err(SynchroniaError::Inference {
                message: "empty input".to_string(),
            });
        }
        Ok(Self::logits(ProsodyFeatures::extract(samples)))
    }

    fn name(&self) -> &str {
        "prosody"
    }
}
