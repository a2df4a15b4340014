//! Conversation data: turns, running statistics and the owned state value.

use crate::defaults;
use crate::emotion::EmotionLabel;
use std::time::Instant;

/// One recognized utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    /// Non-empty recognized text.
    pub text: String,
    pub emotion: EmotionLabel,
    pub timestamp: Instant,
}

impl ConversationTurn {
    pub fn new(text: impl Into<String>, emotion: EmotionLabel) -> Self {
        Self {
            text: text.into(),
            emotion,
            timestamp: Instant::now(),
        }
    }

    /// Whitespace-separated word count.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Occurrence counts per label plus the dominant label.
///
/// The dominant label only changes when another label strictly exceeds the
/// current maximum, so under a tie the label that reached it first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmotionHistogram {
    counts: [u32; EmotionLabel::COUNT],
    dominant: EmotionLabel,
    max_count: u32,
}

impl Default for EmotionHistogram {
    fn default() -> Self {
        Self {
            counts: [0; EmotionLabel::COUNT],
            dominant: EmotionLabel::Neutral,
            max_count: 0,
        }
    }
}

impl EmotionHistogram {
    pub fn record(&mut self, label: EmotionLabel) {
        let count = &mut self.counts[label.index()];
        *count += 1;
        if *count > self.max_count {
            self.max_count = *count;
            self.dominant = label;
        }
    }

    pub fn count(&self, label: EmotionLabel) -> u32 {
        self.counts[label.index()]
    }

    /// Dominant label; `Neutral` before anything was recorded.
    pub fn dominant(&self) -> EmotionLabel {
        self.dominant
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, u32)> + '_ {
        EmotionLabel::ALL
            .iter()
            .map(move |&label| (label, self.counts[label.index()]))
    }
}

/// Read-only copy of the running statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationStats {
    pub word_count: usize,
    pub turns: usize,
    pub histogram: EmotionHistogram,
    pub dominant_emotion: EmotionLabel,
    pub goal: Option<String>,
}

/// Conversation state, owned and mutated by the aggregator only.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub(crate) word_count: usize,
    pub(crate) histogram: EmotionHistogram,
    pub(crate) goal: Option<String>,
    pub(crate) advisory_window_size: usize,
    pub(crate) history: Vec<ConversationTurn>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new(defaults::ADVISORY_WINDOW_WORDS)
    }
}

impl ConversationState {
    pub fn new(advisory_window_size: usize) -> Self {
        Self {
            word_count: 0,
            histogram: EmotionHistogram::default(),
            goal: None,
            advisory_window_size,
            history: Vec::new(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn histogram(&self) -> &EmotionHistogram {
        &self.histogram
    }

    pub fn dominant_emotion(&self) -> EmotionLabel {
        self.histogram.dominant()
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    pub fn advisory_window_size(&self) -> usize {
        self.advisory_window_size
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn stats(&self) -> ConversationStats {
        ConversationStats {
            word_count: self.word_count,
            turns: self.history.len(),
            histogram: self.histogram,
            dominant_emotion: self.dominant_emotion(),
            goal: self.goal.clone(),
        }
    }
}
