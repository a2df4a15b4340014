//! Speech emotion classification.

pub mod engine;
pub mod label;
pub mod model;
pub mod prosody;

pub use engine::EmotionInferenceEngine;
pub use label::{EmotionDistribution, EmotionLabel};
pub use model::{EmotionModel, MockEmotionModel};
pub use prosody::ProsodyEmotionModel;
