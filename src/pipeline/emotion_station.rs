//! Emotion classification station.

use crate::emotion::EmotionInferenceEngine;
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{AudioBatch, EmotionOutcome, EmotionResult};

/// Classifies each batch on the emotion worker thread.
///
/// A failed batch is reported and then announced as `Skipped` so consumers
/// can tell it apart from one still in flight.
pub struct EmotionStation {
    engine: EmotionInferenceEngine,
    current: Option<u64>,
}

impl EmotionStation {
    pub fn new(engine: EmotionInferenceEngine) -> Self {
        Self {
            engine,
            current: None,
        }
    }
}

impl Station for EmotionStation {
    type Input = AudioBatch;
    type Output = EmotionOutcome;

    fn process(&mut self, batch: AudioBatch) -> Result<Option<EmotionOutcome>, StationError> {
        self.current = Some(batch.index);
        let distribution = self.engine.classify(&batch).map_err(|e| {
            StationError::Recoverable(format!("batch {} skipped: {}", batch.index, e))
        })?;
        tracing::trace!(index = batch.index, top = %distribution.top(), "batch classified");
        Ok(Some(EmotionOutcome::Classified(EmotionResult {
            batch_index: batch.index,
            distribution,
        })))
    }

    fn recover(&mut self, _error: &StationError) -> Option<EmotionOutcome> {
        self.current
            .take()
            .map(|batch_index| EmotionOutcome::Skipped { batch_index })
    }

    fn name(&self) -> &'static str {
        "emotion"
    }

    fn shutdown(&mut self) {
        tracing::debug!(model = self.engine.model_name(), "emotion worker finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{EmotionLabel, MockEmotionModel};
    use std::time::Instant;

    fn batch(index: u64) -> AudioBatch {
        AudioBatch {
            samples: vec![100; 1600],
            sample_rate: 16000,
            channels: 1,
            index,
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn test_classified_outcome_carries_batch_index() {
        let model = MockEmotionModel::new().with_logits(vec![0.0, 0.0, 3.0, 0.0]);
        let mut station = EmotionStation::new(EmotionInferenceEngine::new(Box::new(model)));

        match station.process(batch(7)).unwrap() {
            Some(EmotionOutcome::Classified(result)) => {
                assert_eq!(result.batch_index, 7);
                assert_eq!(result.distribution.top(), EmotionLabel::Joy);
            }
            other => panic!("Expected classified outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_recovers_as_skipped() {
        let model = MockEmotionModel::new().with_failure_on(&[0]);
        let mut station = EmotionStation::new(EmotionInferenceEngine::new(Box::new(model)));

        let error = station.process(batch(4)).unwrap_err();
        assert!(matches!(error, StationError::Recoverable(ref msg) if msg.contains("batch 4")));

        match station.recover(&error) {
            Some(EmotionOutcome::Skipped { batch_index }) => assert_eq!(batch_index, 4),
            other => panic!("Expected skipped outcome, got {:?}", other),
        }
        assert!(station.recover(&error).is_none());
    }
}
