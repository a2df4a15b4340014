//! Real-time pipeline: capture → batching → emotion + speech → dispatch.

use crate::advisor::{AdvisorWorker, AdvisoryService, advice_slot};
use crate::audio::source::AudioSource;
use crate::audio::wav::SessionRecording;
use crate::conversation::{ConversationAggregator, ConversationStats, ConversationTurn};
use crate::defaults;
use crate::emotion::EmotionInferenceEngine;
use crate::error::{Result, SynchroniaError};
use crate::pipeline::dispatcher::{ControlCommand, PipelineObserver, ResultDispatcher};
use crate::pipeline::emotion_station::EmotionStation;
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::queue::{DropOldestSender, drop_oldest};
use crate::pipeline::segmenter::{BatchSegmenter, run_segmenter};
use crate::pipeline::speech_station::SpeechStation;
use crate::pipeline::station::StationRunner;
use crate::pipeline::types::AudioFrame;
use crate::stt::SpeechRecognitionEngine;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Consecutive device errors tolerated before capture gives up.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Batch length in seconds, fixed for the session
    pub batch_secs: u32,
    /// Upper bound for one blocking device read
    pub read_timeout: Duration,
    /// Queue sizes
    pub frame_queue: usize,
    pub emotion_queue: usize,
    pub speech_queue: usize,
    /// Advisory word budget and trigger threshold
    pub window_words: usize,
    pub threshold_words: usize,
    /// Upper bound for one advisory call
    pub advisor_timeout: Duration,
    /// Goal set at start
    pub goal: Option<String>,
    /// How long `stop` waits for threads before detaching them
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_secs: defaults::BATCH_SECS,
            read_timeout: Duration::from_millis(defaults::READ_TIMEOUT_MS),
            frame_queue: defaults::FRAME_QUEUE,
            emotion_queue: defaults::EMOTION_QUEUE,
            speech_queue: defaults::SPEECH_QUEUE,
            window_words: defaults::ADVISORY_WINDOW_WORDS,
            threshold_words: defaults::ADVISORY_THRESHOLD_WORDS,
            advisor_timeout: Duration::from_secs(defaults::LLM_TIMEOUT_SECS),
            goal: None,
            shutdown_timeout: Duration::from_millis(defaults::SHUTDOWN_TIMEOUT_MS),
        }
    }
}

/// Everything a finished session leaves behind.
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub recording: SessionRecording,
    pub turns: Vec<ConversationTurn>,
    /// `None` if the dispatcher did not report back before the deadline.
    pub stats: Option<ConversationStats>,
    /// Frames discarded because the segmenter fell behind.
    pub dropped_frames: u64,
    /// False if some threads were still running at the deadline.
    pub clean_shutdown: bool,
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    recording_rx: Receiver<SessionRecording>,
    conversation_rx: Receiver<ConversationAggregator>,
    control_tx: Sender<ControlCommand>,
    dropped_frames: Arc<AtomicU64>,
    device_drops: Arc<AtomicU64>,
    shutdown_timeout: Duration,
}

impl PipelineHandle {
    /// Returns true if the pipeline is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Frames dropped so far, by the device and on the capture queue.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed) + self.device_drops.load(Ordering::Relaxed)
    }

    pub fn set_goal(&self, goal: &str) {
        self.send_control(ControlCommand::SetGoal(goal.to_string()));
    }

    pub fn clear_goal(&self) {
        self.send_control(ControlCommand::ClearGoal);
    }

    /// Ask for advice now. Returns true if a request was started.
    pub fn request_advice(&self) -> bool {
        let (reply_tx, reply_rx) = bounded(1);
        if !self.send_control(ControlCommand::RequestAdvice(reply_tx)) {
            return false;
        }
        reply_rx.recv_timeout(Duration::from_secs(1)).unwrap_or(false)
    }

    fn send_control(&self, command: ControlCommand) -> bool {
        if self.control_tx.send(command).is_err() {
            tracing::warn!("pipeline is not running, control command dropped");
            return false;
        }
        true
    }

    /// Stops the pipeline and collects the session results.
    ///
    /// Waits up to the shutdown timeout in total. Threads still running at
    /// the deadline are detached; they exit on their next cancellation check.
    pub fn stop(mut self) -> SessionSummary {
        self.running.store(false, Ordering::SeqCst);
        let deadline = Instant::now() + self.shutdown_timeout;

        let remaining = || deadline.saturating_duration_since(Instant::now());
        let recording = self.recording_rx.recv_timeout(remaining()).unwrap_or_default();
        let aggregator = self.conversation_rx.recv_timeout(remaining()).ok();

        let poll_interval = Duration::from_millis(10);
        loop {
            let mut still_running = Vec::new();
            for handle in self.threads.drain(..) {
                if handle.is_finished() {
                    if let Err(panic_info) = handle.join() {
                        let msg = panic_info
                            .downcast_ref::<&str>()
                            .copied()
                            .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                            .unwrap_or("unknown panic");
                        tracing::error!("pipeline thread panicked: {msg}");
                    }
                } else {
                    still_running.push(handle);
                }
            }
            self.threads = still_running;

            if self.threads.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(poll_interval);
        }

        let clean_shutdown = self.threads.is_empty();
        if !clean_shutdown {
            tracing::warn!(
                threads = self.threads.len(),
                "shutdown timeout, detaching running threads"
            );
        }

        let dropped_frames = self.dropped_frames();
        if dropped_frames > 0 {
            tracing::info!(dropped_frames, "capture frames dropped during session");
        }

        let (turns, stats) = match aggregator {
            Some(aggregator) => {
                let stats = aggregator.stats();
                (aggregator.into_state().history, Some(stats))
            }
            None => (Vec::new(), None),
        };

        SessionSummary {
            recording,
            turns,
            stats,
            dropped_frames,
            clean_shutdown,
        }
    }
}

/// The engines and services one session runs with.
pub struct PipelineParts {
    pub source: Box<dyn AudioSource>,
    pub emotion: EmotionInferenceEngine,
    pub speech: SpeechRecognitionEngine,
    pub advisor: Arc<dyn AdvisoryService>,
    pub observer: Box<dyn PipelineObserver>,
}

/// Audio pipeline: AudioSource → BatchSegmenter → {emotion, speech} → ResultDispatcher.
pub struct Pipeline {
    config: PipelineConfig,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl Pipeline {
    /// Creates a new pipeline with default error reporter.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Starts all pipeline threads and returns immediately.
    pub fn start(self, parts: PipelineParts) -> Result<PipelineHandle> {
        let config = self.config;
        let running = Arc::new(AtomicBool::new(true));

        let (frame_tx, frame_rx) = drop_oldest::<AudioFrame>(config.frame_queue);
        let (emotion_in_tx, emotion_in_rx) = drop_oldest(config.emotion_queue);
        let (speech_in_tx, speech_in_rx) = bounded(config.speech_queue.max(1));
        let (emotion_out_tx, emotion_out_rx) = unbounded();
        let (speech_out_tx, speech_out_rx) = unbounded();
        let (control_tx, control_rx) = unbounded();
        let (recording_tx, recording_rx) = bounded(1);
        let (conversation_tx, conversation_rx) = bounded(1);
        let dropped_frames = frame_tx.drop_counter();
        let device_drops = Arc::new(AtomicU64::new(0));

        let mut threads = Vec::new();

        // Dispatcher first, so results always have a consumer.
        let (slot, advice_rx) = advice_slot();
        let advisor =
            AdvisorWorker::new(parts.advisor, slot).with_timeout(config.advisor_timeout);
        let mut aggregator =
            ConversationAggregator::new(config.window_words, config.threshold_words);
        if let Some(goal) = &config.goal {
            aggregator.set_goal(goal.as_str());
        }
        let dispatcher = ResultDispatcher::new(parts.observer, aggregator, advisor);
        let dispatch_running = running.clone();
        threads.push(
            thread::Builder::new()
                .name("dispatcher".to_string())
                .spawn(move || {
                    let aggregator = dispatcher.run(
                        emotion_out_rx,
                        speech_out_rx,
                        control_rx,
                        advice_rx,
                        dispatch_running,
                    );
                    if conversation_tx.send(aggregator).is_err() {
                        tracing::debug!("conversation state receiver gone");
                    }
                })?,
        );

        let emotion_runner = StationRunner::spawn(
            EmotionStation::new(parts.emotion),
            emotion_in_rx,
            emotion_out_tx,
            self.error_reporter.clone(),
            running.clone(),
        );
        let speech_runner = StationRunner::spawn(
            SpeechStation::new(parts.speech),
            speech_in_rx,
            speech_out_tx,
            self.error_reporter.clone(),
            running.clone(),
        );
        threads.push(thread::spawn(move || {
            if let Err(msg) = emotion_runner.join() {
                tracing::error!("{msg}");
            }
        }));
        threads.push(thread::spawn(move || {
            if let Err(msg) = speech_runner.join() {
                tracing::error!("{msg}");
            }
        }));

        let segmenter = BatchSegmenter::new(config.batch_secs);
        let segment_running = running.clone();
        threads.push(
            thread::Builder::new()
                .name("segmenter".to_string())
                .spawn(move || {
                    let recording = run_segmenter(
                        segmenter,
                        frame_rx,
                        emotion_in_tx,
                        speech_in_tx,
                        segment_running,
                    );
                    if recording_tx.send(recording).is_err() {
                        tracing::debug!("recording receiver gone");
                    }
                })?,
        );

        let capture_running = running.clone();
        let read_timeout = config.read_timeout;
        let mut source = parts.source;
        let capture_drops = device_drops.clone();
        let capture = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                run_capture(
                    source.as_mut(),
                    frame_tx,
                    read_timeout,
                    capture_running,
                    capture_drops,
                )
            });
        match capture {
            Ok(handle) => threads.push(handle),
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                return Err(SynchroniaError::Io(e));
            }
        }

        tracing::info!(batch_secs = config.batch_secs, "pipeline started");
        Ok(PipelineHandle {
            running,
            threads,
            recording_rx,
            conversation_rx,
            control_tx,
            dropped_frames,
            device_drops,
            shutdown_timeout: config.shutdown_timeout,
        })
    }
}

/// Capture thread body: drain the device as fast as it delivers.
fn run_capture(
    source: &mut dyn AudioSource,
    frame_tx: DropOldestSender<AudioFrame>,
    read_timeout: Duration,
    running: Arc<AtomicBool>,
    device_drops: Arc<AtomicU64>,
) {
    let device = source.device_name().to_string();
    let mut consecutive_errors: u32 = 0;
    let mut frames_read: u64 = 0;

    while running.load(Ordering::SeqCst) {
        match source.read_frame(read_timeout) {
            Ok(frame) => {
                consecutive_errors = 0;
                frames_read += 1;
                device_drops.store(source.dropped_frames(), Ordering::Relaxed);
                if frame_tx.push(frame).is_err() {
                    break;
                }
            }
            Err(SynchroniaError::Timeout) => continue,
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    tracing::error!(
                        device = %device,
                        "audio capture failed {consecutive_errors} times in a row: {e}"
                    );
                    break;
                }
                thread::sleep(read_timeout);
            }
        }
    }

    device_drops.store(source.dropped_frames(), Ordering::Relaxed);
    if frames_read == 0 {
        tracing::warn!(device = %device, "no audio frames captured");
    }
    if let Err(e) = source.close() {
        tracing::warn!(device = %device, "failed to close audio device: {e}");
    }
    tracing::debug!(frames_read, "capture stopped");
}
