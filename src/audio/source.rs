use crate::error::{Result, SynchroniaError};
use crate::pipeline::types::AudioFrame;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

/// Trait for audio input devices.
///
/// An `AudioSource` is already open when constructed; opening a device that
/// does not exist fails with `SynchroniaError::DeviceUnavailable` at that point.
/// This trait allows swapping implementations (real audio device vs mock).
pub trait AudioSource: Send {
    /// Block until the next frame is available or `timeout` elapses.
    ///
    /// # Errors
    /// `SynchroniaError::Timeout` when no frame arrived in time,
    /// `SynchroniaError::DeviceError` when the device failed.
    fn read_frame(&mut self, timeout: Duration) -> Result<AudioFrame>;

    /// Stop the device. Idempotent.
    fn close(&mut self) -> Result<()>;

    /// Name of the device, for logging.
    fn device_name(&self) -> &str;

    /// Buffers the device discarded before `read_frame` could pick them up.
    fn dropped_frames(&self) -> u64 {
        0
    }
}

/// Mock audio source for testing.
///
/// Serves a fixed list of frames, then reports `Timeout` after waiting the
/// full timeout, just like an idle microphone.
#[derive(Debug)]
pub struct MockAudioSource {
    frames: VecDeque<Vec<i16>>,
    sample_rate: u32,
    channels: u16,
    sequence: u64,
    should_fail_read: bool,
    error_message: String,
    closed: Arc<AtomicBool>,
    close_calls: Arc<AtomicU32>,
    device_drops: u64,
}

impl MockAudioSource {
    /// Create an empty mono 16kHz mock source.
    pub fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            sample_rate: 16000,
            channels: 1,
            sequence: 0,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
            closed: Arc::new(AtomicBool::new(false)),
            close_calls: Arc::new(AtomicU32::new(0)),
            device_drops: 0,
        }
    }

    /// Configure the frames to serve, in order.
    pub fn with_frames(mut self, frames: Vec<Vec<i16>>) -> Self {
        self.frames = frames.into();
        self
    }

    /// Configure the reported sample format.
    pub fn with_format(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    /// Configure the mock to fail on every read.
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Report this many buffers as dropped by the device.
    pub fn with_device_drops(mut self, drops: u64) -> Self {
        self.device_drops = drops;
        self
    }

    /// Shared flag that flips once `close()` has been called.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    /// Shared counter of `close()` calls.
    pub fn close_counter(&self) -> Arc<AtomicU32> {
        self.close_calls.clone()
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn read_frame(&mut self, timeout: Duration) -> Result<AudioFrame> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SynchroniaError::DeviceError {
                message: "source closed".to_string(),
            });
        }
        if self.should_fail_read {
            return Err(SynchroniaError::DeviceError {
                message: self.error_message.clone(),
            });
        }
        match self.frames.pop_front() {
            Some(samples) => {
                let frame =
                    AudioFrame::new(samples, self.sample_rate, self.channels, self.sequence);
                self.sequence += 1;
                Ok(frame)
            }
            None => {
                thread::sleep(timeout);
                Err(SynchroniaError::Timeout)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn device_name(&self) -> &str {
        "mock"
    }

    fn dropped_frames(&self) -> u64 {
        self.device_drops
    }
}
