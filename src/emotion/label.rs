//! The closed set of emotion labels and the probability distribution over them.

use crate::error::{Result, SynchroniaError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Emotion category, in classifier output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Neutral,
    Anger,
    Joy,
    Sadness,
}

impl EmotionLabel {
    /// All labels, indexed by classifier class id.
    pub const ALL: [EmotionLabel; 4] = [
        EmotionLabel::Neutral,
        EmotionLabel::Anger,
        EmotionLabel::Joy,
        EmotionLabel::Sadness,
    ];

    /// Number of known labels.
    pub const COUNT: usize = 4;

    /// Class id in classifier output order.
    pub fn index(self) -> usize {
        match self {
            EmotionLabel::Neutral => 0,
            EmotionLabel::Anger => 1,
            EmotionLabel::Joy => 2,
            EmotionLabel::Sadness => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Joy => "joy",
            EmotionLabel::Sadness => "sadness",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = SynchroniaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "neutral" => Ok(EmotionLabel::Neutral),
            "anger" | "angry" => Ok(EmotionLabel::Anger),
            "joy" | "happy" => Ok(EmotionLabel::Joy),
            "sadness" | "sad" => Ok(EmotionLabel::Sadness),
            other => Err(SynchroniaError::Other(format!("unknown emotion label: {other}"))),
        }
    }
}

/// Probabilities over exactly the four known labels, summing to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionDistribution {
    probabilities: [f32; EmotionLabel::COUNT],
}

impl EmotionDistribution {
    /// Build a distribution from class probabilities in classifier order.
    ///
    /// Classes beyond the fourth are discarded and the first four are
    /// renormalized to sum to 1.0.
    ///
    /// # Errors
    /// `SynchroniaError::Inference` if fewer than four classes are given,
    /// any value is negative or non-finite, or the kept mass is zero.
    pub fn from_probabilities(probabilities: &[f32]) -> Result<Self> {
        if probabilities.len() < EmotionLabel::COUNT {
            return Err(SynchroniaError::Inference {
                message: format!(
                    "model produced {} classes, expected at least {}",
                    probabilities.len(),
                    EmotionLabel::COUNT
                ),
            });
        }

        let kept = &probabilities[..EmotionLabel::COUNT];
        if kept.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(SynchroniaError::Inference {
                message: "model produced invalid probabilities".to_string(),
            });
        }

        let total: f32 = kept.iter().sum();
        if total <= 0.0 {
            return Err(SynchroniaError::Inference {
                message: "model produced zero probability mass".to_string(),
            });
        }

        let mut normalized = [0.0; EmotionLabel::COUNT];
        for (slot, p) in normalized.iter_mut().zip(kept) {
            *slot = p / total;
        }
        Ok(Self {
            probabilities: normalized,
        })
    }

    /// Build a distribution from raw classifier logits via softmax.
    pub fn from_logits(logits: &[f32]) -> Result<Self> {
        Self::from_probabilities(&softmax(logits))
    }

    /// Probability of `label`.
    pub fn get(&self, label: EmotionLabel) -> f32 {
        self.probabilities[label.index()]
    }

    /// Label with the highest probability; ties go to the earlier class.
    pub fn top(&self) -> EmotionLabel {
        let mut best = EmotionLabel::Neutral;
        for label in EmotionLabel::ALL {
            if self.get(label) > self.get(best) {
                best = label;
            }
        }
        best
    }

    /// (label, probability) pairs in classifier order.
    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        EmotionLabel::ALL.iter().map(|&label| (label, self.get(label)))
    }

    /// Sum of all probabilities (1.0 within float tolerance).
    pub fn total(&self) -> f32 {
        self.probabilities.iter().sum()
    }
}

/// Numerically stable softmax. Non-finite input propagates as NaN and is
/// rejected by `from_probabilities`.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
