//! Fixed-length batching of captured frames.

use crate::audio::wav::SessionRecording;
use crate::pipeline::queue::DropOldestSender;
use crate::pipeline::station::POLL_INTERVAL;
use crate::pipeline::types::{AudioBatch, AudioFrame};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Accumulates frames into batches of exactly `batch_secs` seconds.
///
/// Samples past a batch boundary are carried into the next batch. Every
/// accepted frame is also appended to the session recording.
#[derive(Debug)]
pub struct BatchSegmenter {
    batch_secs: u32,
    pending: Vec<i16>,
    format: Option<(u32, u16)>,
    pending_since: Option<Instant>,
    next_index: u64,
    recording: SessionRecording,
}

impl BatchSegmenter {
    pub fn new(batch_secs: u32) -> Self {
        Self {
            batch_secs: batch_secs.max(1),
            pending: Vec::new(),
            format: None,
            pending_since: None,
            next_index: 0,
            recording: SessionRecording::default(),
        }
    }

    pub fn batch_secs(&self) -> u32 {
        self.batch_secs
    }

    /// Index the next emitted batch will carry.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Interleaved samples currently waiting for a full batch.
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    /// Add a frame; returns any batches it completed.
    pub fn push(&mut self, frame: AudioFrame) -> Vec<AudioBatch> {
        let mut batches = Vec::new();
        let format = (frame.sample_rate, frame.channels);

        if self.format.is_some_and(|f| f != format) {
            tracing::warn!(
                sample_rate = frame.sample_rate,
                channels = frame.channels,
                "audio format changed mid-session, closing partial batch"
            );
            if let Some(partial) = self.take_pending() {
                batches.push(partial);
            }
        }
        self.format = Some(format);
        self.record(&frame);

        if self.pending.is_empty() {
            self.pending_since = Some(frame.timestamp);
        }
        self.pending.extend_from_slice(&frame.samples);

        let batch_len = self.batch_len(format);
        while batch_len > 0 && self.pending.len() >= batch_len {
            let rest = self.pending.split_off(batch_len);
            let samples = std::mem::replace(&mut self.pending, rest);
            batches.push(self.make_batch(samples, format));
            if !self.pending.is_empty() {
                self.pending_since = Some(frame.timestamp);
            }
        }
        batches
    }

    /// Hand over the session recording. Any partial batch is discarded.
    pub fn finish(self) -> SessionRecording {
        if !self.pending.is_empty() {
            tracing::debug!(
                samples = self.pending.len(),
                "discarding partial batch at end of session"
            );
        }
        self.recording
    }

    fn batch_len(&self, (sample_rate, channels): (u32, u16)) -> usize {
        self.batch_secs as usize * sample_rate as usize * channels.max(1) as usize
    }

    fn take_pending(&mut self) -> Option<AudioBatch> {
        let format = self.format?;
        if self.pending.is_empty() {
            return None;
        }
        let samples = std::mem::take(&mut self.pending);
        Some(self.make_batch(samples, format))
    }

    fn make_batch(&mut self, samples: Vec<i16>, (sample_rate, channels): (u32, u16)) -> AudioBatch {
        let batch = AudioBatch {
            samples,
            sample_rate,
            channels,
            index: self.next_index,
            captured_at: self.pending_since.take().unwrap_or_else(Instant::now),
        };
        self.next_index += 1;
        batch
    }

    fn record(&mut self, frame: &AudioFrame) {
        if self.recording.samples.is_empty() {
            self.recording.sample_rate = frame.sample_rate;
            self.recording.channels = frame.channels;
        }
        if self.recording.sample_rate == frame.sample_rate
            && self.recording.channels == frame.channels
        {
            self.recording.samples.extend_from_slice(&frame.samples);
        }
    }
}

/// Segmenter thread body: frames in, batches out to both engines.
///
/// The emotion queue drops its oldest batch when full; the speech queue
/// applies backpressure, waiting (while not cancelled) for room. Returns the
/// session recording once cancelled or the frame queue disconnects.
pub fn run_segmenter(
    mut segmenter: BatchSegmenter,
    frame_rx: Receiver<AudioFrame>,
    emotion_tx: DropOldestSender<AudioBatch>,
    speech_tx: Sender<AudioBatch>,
    running: Arc<AtomicBool>,
) -> SessionRecording {
    'frames: while running.load(Ordering::SeqCst) {
        let frame = match frame_rx.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        for batch in segmenter.push(frame) {
            tracing::debug!(index = batch.index, "batch ready");
            if emotion_tx.push(batch.clone()).is_err() {
                tracing::debug!("emotion queue closed");
            }

            let mut pending = batch;
            loop {
                match speech_tx.send_timeout(pending, POLL_INTERVAL) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(batch)) => {
                        if !running.load(Ordering::SeqCst) {
                            break 'frames;
                        }
                        pending = batch;
                    }
                    Err(SendTimeoutError::Disconnected(_)) => {
                        tracing::debug!("speech queue closed");
                        break;
                    }
                }
            }
        }
    }

    let dropped = emotion_tx.dropped();
    if dropped > 0 {
        tracing::info!(dropped, "emotion batches dropped under load");
    }
    segmenter.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::drop_oldest;
    use crossbeam_channel::{bounded, unbounded};
    use std::thread;
    use std::time::Duration;

    fn frame(len: usize, sequence: u64) -> AudioFrame {
        AudioFrame::new(vec![sequence as i16; len], 10, 1, sequence)
    }

    #[test]
    fn test_emits_batch_when_duration_reached() {
        // 1 s at 10 Hz mono = 10 samples per batch
        let mut segmenter = BatchSegmenter::new(1);

        assert!(segmenter.push(frame(4, 0)).is_empty());
        assert!(segmenter.push(frame(4, 1)).is_empty());
        let batches = segmenter.push(frame(4, 2));

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].index, 0);
        assert_eq!(batches[0].samples, vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2]);
        assert_eq!(segmenter.pending_samples(), 2);
    }

    #[test]
    fn test_leftover_prefixes_next_batch() {
        let mut segmenter = BatchSegmenter::new(1);
        segmenter.push(frame(12, 0));
        let batches = segmenter.push(frame(8, 1));

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].index, 1);
        assert_eq!(&batches[0].samples[..2], &[0, 0]);
        assert_eq!(segmenter.pending_samples(), 0);
    }

    #[test]
    fn test_large_frame_yields_several_batches_in_order() {
        let mut segmenter = BatchSegmenter::new(1);
        let batches = segmenter.push(frame(35, 0));
        let indices: Vec<u64> = batches.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(segmenter.next_index(), 3);
        assert_eq!(segmenter.pending_samples(), 5);
    }

    #[test]
    fn test_no_samples_lost_across_boundaries() {
        let mut segmenter = BatchSegmenter::new(2);
        let mut total = 0;
        for i in 0..17 {
            total += segmenter
                .push(frame(7, i))
                .iter()
                .map(|b| b.samples.len())
                .sum::<usize>();
        }
        assert_eq!(total + segmenter.pending_samples(), 17 * 7);
    }

    #[test]
    fn test_stereo_batch_length_counts_channels() {
        let mut segmenter = BatchSegmenter::new(1);
        let stereo = AudioFrame::new(vec![1; 20], 10, 2, 0);
        let batches = segmenter.push(stereo);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].frame_count(), 10);
        assert_eq!(batches[0].duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_session_recording_keeps_every_frame() {
        let mut segmenter = BatchSegmenter::new(1);
        segmenter.push(frame(6, 0));
        segmenter.push(frame(6, 1));
        let recording = segmenter.finish();
        assert_eq!(recording.samples.len(), 12);
        assert_eq!(recording.sample_rate, 10);
        assert_eq!(recording.channels, 1);
    }

    #[test]
    fn test_format_change_closes_partial_batch() {
        let mut segmenter = BatchSegmenter::new(1);
        segmenter.push(frame(4, 0));
        let batches = segmenter.push(AudioFrame::new(vec![9; 4], 20, 1, 1));

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].samples, vec![0; 4]);
        assert_eq!(batches[0].sample_rate, 10);
        assert_eq!(segmenter.pending_samples(), 4);
    }

    #[test]
    fn test_run_segmenter_feeds_both_queues() {
        let (frame_tx, frame_rx) = unbounded();
        let (emotion_tx, emotion_rx) = drop_oldest(8);
        let (speech_tx, speech_rx) = bounded(8);
        let running = Arc::new(AtomicBool::new(true));

        for i in 0..3 {
            frame_tx.send(frame(10, i)).unwrap();
        }
        drop(frame_tx);

        let recording = run_segmenter(
            BatchSegmenter::new(1),
            frame_rx,
            emotion_tx,
            speech_tx,
            running,
        );

        let emotion: Vec<u64> = emotion_rx.try_iter().map(|b| b.index).collect();
        let speech: Vec<u64> = speech_rx.try_iter().map(|b| b.index).collect();
        assert_eq!(emotion, vec![0, 1, 2]);
        assert_eq!(speech, vec![0, 1, 2]);
        assert_eq!(recording.samples.len(), 30);
    }

    #[test]
    fn test_blocked_speech_queue_releases_on_cancel() {
        let (frame_tx, frame_rx) = unbounded();
        let (emotion_tx, _emotion_rx) = drop_oldest(8);
        let (speech_tx, _speech_rx) = bounded(1);
        let running = Arc::new(AtomicBool::new(true));

        for i in 0..3 {
            frame_tx.send(frame(10, i)).unwrap();
        }

        let flag = running.clone();
        let handle = thread::spawn(move || {
            run_segmenter(BatchSegmenter::new(1), frame_rx, emotion_tx, speech_tx, flag)
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!handle.is_finished(), "speech backpressure should hold the segmenter");

        running.store(false, Ordering::SeqCst);
        let recording = handle.join().unwrap();
        assert!(!recording.is_empty());
        drop(frame_tx);
    }
}
