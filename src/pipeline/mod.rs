//! Real-time emotion and speech pipeline.
//!
//! Each stage runs in its own thread, connected by crossbeam channels.
//! Capture and emotion queues drop their oldest item when full; the speech
//! queue applies backpressure.

pub mod dispatcher;
pub mod emotion_station;
pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod segmenter;
pub mod speech_station;
pub mod station;
pub mod types;

pub use dispatcher::{
    CollectingObserver, ControlCommand, PipelineEvent, PipelineObserver, ResultDispatcher,
};
pub use emotion_station::EmotionStation;
pub use error::{ErrorReporter, LogReporter, StationError};
pub use orchestrator::{Pipeline, PipelineConfig, PipelineHandle, PipelineParts, SessionSummary};
pub use queue::{DropOldestSender, drop_oldest};
pub use segmenter::BatchSegmenter;
pub use speech_station::SpeechStation;
pub use station::{Station, StationRunner};
pub use types::{AudioBatch, AudioFrame, EmotionOutcome, EmotionResult, SpeechFragment};
