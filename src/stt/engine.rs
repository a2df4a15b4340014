//! In-order batch feeding for a streaming recognizer.

use crate::audio::convert::{resample_f32, to_mono_f32};
use crate::defaults;
use crate::error::{Result, SynchroniaError};
use crate::pipeline::types::{AudioBatch, SpeechFragment};
use crate::stt::recognizer::SpeechRecognizer;

/// Strip non-speech annotations that Whisper emits for silence or noise.
///
/// Removes content inside `[…]`, `(…)`, and `*…*` delimiters, collapses
/// multiple spaces into one, and trims the result. Unmatched openers are
/// kept verbatim.
pub fn clean_transcription(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        let close = match ch {
            '[' => ']',
            '(' => ')',
            '*' => '*',
            _ => {
                result.push(ch);
                continue;
            }
        };
        let mut buf = String::new();
        let mut found_close = false;
        for inner in chars.by_ref() {
            if inner == close {
                found_close = true;
                break;
            }
            buf.push(inner);
        }
        if !found_close {
            result.push(ch);
            result.push_str(&buf);
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Feeds batches to a stateful recognizer, one at a time, in index order.
pub struct SpeechRecognitionEngine {
    recognizer: Box<dyn SpeechRecognizer>,
    last_index: Option<u64>,
}

impl SpeechRecognitionEngine {
    pub fn new(recognizer: Box<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer,
            last_index: None,
        }
    }

    pub fn model_name(&self) -> &str {
        self.recognizer.model_name()
    }

    /// Index of the last batch accepted, if any.
    pub fn last_index(&self) -> Option<u64> {
        self.last_index
    }

    /// Feed the next batch.
    ///
    /// Returns at most one fragment: everything the recognizer finalized for
    /// this batch, cleaned and joined. `Ok(None)` for silence.
    ///
    /// # Errors
    /// `Recognition` if the batch is out of order (decoder continuity would
    /// break) or the recognizer fails. A failed batch still counts as fed.
    pub fn feed(&mut self, batch: &AudioBatch) -> Result<Option<SpeechFragment>> {
        if let Some(last) = self.last_index
            && batch.index <= last
        {
            return Err(SynchroniaError::Recognition {
                message: format!("batch {} fed after batch {}", batch.index, last),
            });
        }
        self.last_index = Some(batch.index);

        let mono = to_mono_f32(&batch.samples, batch.channels);
        let audio = resample_f32(&mono, batch.sample_rate, defaults::MODEL_SAMPLE_RATE);
        let recognized = self.recognizer.feed(&audio)?;

        let emotion_hint = recognized.iter().find_map(|r| r.emotion_hint);
        let text = recognized
            .iter()
            .map(|r| clean_transcription(&r.text))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(SpeechFragment {
            batch_index: batch.index,
            text,
            emotion_hint,
        }))
    }
}
