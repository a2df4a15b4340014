//! Running conversation statistics and transcript.

pub mod aggregator;
pub mod state;
pub mod transcript;

pub use aggregator::ConversationAggregator;
pub use state::{ConversationState, ConversationStats, ConversationTurn, EmotionHistogram};
pub use transcript::{transcript_text, write_transcript};
