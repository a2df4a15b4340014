//! Data types flowing through the emotion/speech pipeline.

use crate::emotion::{EmotionDistribution, EmotionLabel};
use std::time::{Duration, Instant};

/// A frame of raw interleaved PCM samples as delivered by the device.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Interleaved 16-bit PCM samples.
    pub samples: Vec<i16>,
    /// Device sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,
    /// When the frame left the device.
    pub timestamp: Instant,
}

impl AudioFrame {
    /// Creates a new audio frame stamped with the current time.
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16, sequence: u64) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
            sequence,
            timestamp: Instant::now(),
        }
    }

    /// Number of per-channel sample frames.
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Playback duration of this frame.
    pub fn duration(&self) -> Duration {
        frames_to_duration(self.frame_count(), self.sample_rate)
    }
}

/// A fixed-duration slice of captured audio with a monotonic index.
#[derive(Debug, Clone)]
pub struct AudioBatch {
    /// Interleaved 16-bit PCM samples.
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Batch index, starting at 0.
    pub index: u64,
    /// Capture time of the first frame in the batch.
    pub captured_at: Instant,
}

impl AudioBatch {
    /// Number of per-channel sample frames.
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Playback duration of the batch.
    pub fn duration(&self) -> Duration {
        frames_to_duration(self.frame_count(), self.sample_rate)
    }
}

/// Emotion result for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionResult {
    pub batch_index: u64,
    pub distribution: EmotionDistribution,
}

/// A finalized text fragment from the speech recognizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechFragment {
    /// Index of the batch the text was recognized from.
    pub batch_index: u64,
    /// Recognized text, trimmed and non-empty.
    pub text: String,
    /// Label supplied by the recognizer itself, if any.
    pub emotion_hint: Option<EmotionLabel>,
}

/// Outcome reported by the emotion worker for every batch it takes off its queue.
///
/// A skipped batch is reported explicitly so the dispatcher can tell a failed
/// classification apart from one that has not finished yet.
#[derive(Debug, Clone)]
pub enum EmotionOutcome {
    Classified(EmotionResult),
    Skipped { batch_index: u64 },
}

impl EmotionOutcome {
    pub fn batch_index(&self) -> u64 {
        match self {
            EmotionOutcome::Classified(result) => result.batch_index,
            EmotionOutcome::Skipped { batch_index } => *batch_index,
        }
    }
}

fn frames_to_duration(frames: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(frames as f64 / sample_rate as f64)
}
