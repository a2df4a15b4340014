//! Advisory request snapshot and prompt text.

use crate::conversation::ConversationTurn;
use crate::emotion::EmotionLabel;

/// Most recent whole turns fitting in `budget` words, oldest first.
///
/// Walks the history backwards and stops at the first turn that would push
/// the total over budget; turns are never split. If the newest turn alone is
/// over budget the window is empty.
pub fn advisory_window(history: &[ConversationTurn], budget: usize) -> &[ConversationTurn] {
    let mut total = 0;
    let mut start = history.len();
    for (i, turn) in history.iter().enumerate().rev() {
        let words = turn.word_count();
        if total + words > budget {
            break;
        }
        total += words;
        start = i;
    }
    &history[start..]
}

/// Everything the advisory service needs, copied out of the live state.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryRequest {
    pub goal: String,
    pub dominant_emotion: EmotionLabel,
    /// Windowed transcript, oldest first.
    pub window: Vec<ConversationTurn>,
    /// Word budget the window was built with.
    pub window_words: usize,
}

impl AdvisoryRequest {
    pub fn from_history(
        goal: &str,
        dominant_emotion: EmotionLabel,
        history: &[ConversationTurn],
        window_words: usize,
    ) -> Self {
        Self {
            goal: goal.to_string(),
            dominant_emotion,
            window: advisory_window(history, window_words).to_vec(),
            window_words,
        }
    }

    /// One line per turn: `[LABEL] text`.
    pub fn transcript_block(&self) -> String {
        self.window
            .iter()
            .map(|turn| format!("[{}] {}", turn.emotion.as_str().to_uppercase(), turn.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn system_prompt(&self) -> &'static str {
        "You are an expert in communication and psychology. Analyze the conversation \
         and give specific advice, briefly and concisely."
    }

    pub fn user_prompt(&self) -> String {
        format!(
            "Conversation goal: {goal}\n\n\
             Conversation context (last {words} words):\n{transcript}\n\n\
             Dominant emotion of the other person: {emotion}\n\n\
             Analyze the conversation and give 3-5 specific suggestions:\n\
             1. What to do next to reach the goal?\n\
             2. How to respond to the other person's current emotions?\n\
             3. Which questions to ask?\n\
             4. What to avoid?\n\
             5. How to improve the communication?\n\n\
             Be structured, specific and brief.",
            goal = self.goal,
            words = self.window_words,
            transcript = self.transcript_block(),
            emotion = self.dominant_emotion,
        )
    }
}
