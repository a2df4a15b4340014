use crate::advisor::request::AdvisoryRequest;
use crate::conversation::state::{ConversationState, ConversationStats, ConversationTurn};
use crate::defaults;
use crate::emotion::EmotionLabel;

/// Folds speech results into the conversation state and decides when advice
/// is due.
///
/// Runs on the dispatcher thread; other threads only ever see snapshots.
#[derive(Debug, Clone)]
pub struct ConversationAggregator {
    state: ConversationState,
    threshold_words: usize,
    words_at_last_trigger: usize,
}

impl Default for ConversationAggregator {
    fn default() -> Self {
        Self::new(
            defaults::ADVISORY_WINDOW_WORDS,
            defaults::ADVISORY_THRESHOLD_WORDS,
        )
    }
}

impl ConversationAggregator {
    pub fn new(window_words: usize, threshold_words: usize) -> Self {
        Self {
            state: ConversationState::new(window_words),
            threshold_words: threshold_words.max(1),
            words_at_last_trigger: 0,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn stats(&self) -> ConversationStats {
        self.state.stats()
    }

    pub fn into_state(self) -> ConversationState {
        self.state
    }

    pub fn set_goal(&mut self, goal: impl Into<String>) {
        let goal = goal.into();
        let goal = goal.trim();
        self.state.goal = (!goal.is_empty()).then(|| goal.to_string());
    }

    pub fn clear_goal(&mut self) {
        self.state.goal = None;
    }

    /// Record one recognized fragment.
    ///
    /// `label` is matched against the known labels (aliases accepted). An
    /// unknown label still produces a turn, stored as neutral, but does not
    /// touch the histogram. Blank text is ignored.
    ///
    /// Returns true when an advisory request is due: at least
    /// `threshold_words` words arrived since the last accepted trigger and
    /// a goal is set.
    pub fn record(&mut self, text: &str, label: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let emotion = match label.parse::<EmotionLabel>() {
            Ok(emotion) => {
                self.state.histogram.record(emotion);
                emotion
            }
            Err(_) => {
                tracing::debug!(label, "unknown emotion label, turn stored as neutral");
                EmotionLabel::Neutral
            }
        };

        let turn = ConversationTurn::new(text, emotion);
        self.state.word_count += turn.word_count();
        self.state.history.push(turn);

        self.advisory_due()
    }

    /// True when the threshold was crossed and a goal is set.
    pub fn advisory_due(&self) -> bool {
        self.state.goal.is_some()
            && self.state.word_count - self.words_at_last_trigger >= self.threshold_words
    }

    /// Snapshot for the advisor. `None` without a goal or without turns.
    pub fn advisory_request(&self) -> Option<AdvisoryRequest> {
        let goal = self.state.goal.as_ref()?;
        if self.state.history.is_empty() {
            return None;
        }
        Some(AdvisoryRequest::from_history(
            goal,
            self.state.dominant_emotion(),
            &self.state.history,
            self.state.advisory_window_size,
        ))
    }

    /// Note that the advisor accepted a trigger at the current word count.
    pub fn mark_triggered(&mut self) {
        self.words_at_last_trigger = self.state.word_count;
    }
}
