//! Speech recognition station.

use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{AudioBatch, SpeechFragment};
use crate::stt::SpeechRecognitionEngine;

/// Feeds batches to the recognizer on the speech worker thread.
pub struct SpeechStation {
    engine: SpeechRecognitionEngine,
    fragments: u64,
}

impl SpeechStation {
    pub fn new(engine: SpeechRecognitionEngine) -> Self {
        Self {
            engine,
            fragments: 0,
        }
    }
}

impl Station for SpeechStation {
    type Input = AudioBatch;
    type Output = SpeechFragment;

    fn process(&mut self, batch: AudioBatch) -> Result<Option<SpeechFragment>, StationError> {
        let fragment = self.engine.feed(&batch).map_err(|e| {
            StationError::Recoverable(format!("batch {} skipped: {}", batch.index, e))
        })?;
        if let Some(ref f) = fragment {
            self.fragments += 1;
            tracing::debug!(index = f.batch_index, text = %f.text, "speech recognized");
        }
        Ok(fragment)
    }

    fn name(&self) -> &'static str {
        "speech"
    }

    fn shutdown(&mut self) {
        tracing::debug!(
            model = self.engine.model_name(),
            fragments = self.fragments,
            "speech worker finished"
        );
    }
}
