//! Real audio capture using CPAL (Cross-Platform Audio Library).

use crate::audio::source::AudioSource;
use crate::error::{Result, SynchroniaError};
use crate::pipeline::types::AudioFrame;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crate::pipeline::queue::{DropOldestSender, drop_oldest};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Device callbacks buffered between the CPAL thread and `read_frame`.
const CALLBACK_QUEUE: usize = 64;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Suppress JACK/ALSA chatter during backend probing.
///
/// # Safety
/// Modifies environment variables; call at startup before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns that are never microphones.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List available audio input devices, marking preferred ones with "\[recommended\]".
///
/// # Errors
/// Returns `SynchroniaError::DeviceError` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _host = host;
    let devices = devices.map_err(|e| SynchroniaError::DeviceError {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Find an input device by exact name, or the best default when `None`.
fn find_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| SynchroniaError::DeviceError {
                message: format!("Failed to enumerate devices: {}", e),
            })?;

        match device_name {
            Some(name) => {
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        return Ok(dev);
                    }
                }
                Err(SynchroniaError::DeviceUnavailable {
                    device: name.to_string(),
                })
            }
            None => {
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && is_preferred_device(&dev_name)
                    {
                        return Ok(dev);
                    }
                }
                host.default_input_device()
                    .ok_or_else(|| SynchroniaError::DeviceUnavailable {
                        device: "default".to_string(),
                    })
            }
        }
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched by the thread that owns the
/// `CpalAudioSource` (the capture thread); it never crosses threads concurrently.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Audio capture from a CPAL input device at its native format.
///
/// The CPAL callback never blocks: it hands each buffer to a bounded queue
/// that evicts the oldest buffer if the capture thread has fallen behind.
pub struct CpalAudioSource {
    name: String,
    stream: Option<SendableStream>,
    rx: Receiver<Vec<i16>>,
    sample_rate: u32,
    channels: u16,
    sequence: u64,
    callback_drops: Arc<AtomicU64>,
}

impl CpalAudioSource {
    /// Open and start an input device.
    ///
    /// # Errors
    /// `SynchroniaError::DeviceUnavailable` if the device does not exist or
    /// refuses to stream; `SynchroniaError::DeviceError` for other CPAL failures.
    pub fn open(device_name: Option<&str>) -> Result<Self> {
        let device = find_device(device_name)?;
        let name = device
            .name()
            .unwrap_or_else(|_| device_name.unwrap_or("default").to_string());

        let default_config =
            device
                .default_input_config()
                .map_err(|e| SynchroniaError::DeviceUnavailable {
                    device: format!("{} ({})", name, e),
                })?;
        let sample_rate = default_config.sample_rate().0;
        let channels = default_config.channels();

        let (tx, rx) = drop_oldest(CALLBACK_QUEUE);
        let callback_drops = tx.drop_counter();
        let stream = build_stream(&device, &default_config, tx)?;
        stream
            .play()
            .map_err(|e| SynchroniaError::DeviceUnavailable {
                device: format!("{} ({})", name, e),
            })?;

        tracing::info!(device = %name, sample_rate, channels, "audio capture started");

        Ok(Self {
            name,
            stream: Some(SendableStream(stream)),
            rx,
            sample_rate,
            channels,
            sequence: 0,
            callback_drops,
        })
    }

}

/// Hand a buffer over without blocking the device thread. A full queue
/// loses its oldest buffer.
fn push_from_callback(tx: &DropOldestSender<Vec<i16>>, data: Vec<i16>) {
    if tx.push(data).is_err() {
        tracing::trace!("capture queue closed, buffer discarded");
    }
}

fn build_stream(
    device: &cpal::Device,
    default_config: &cpal::SupportedStreamConfig,
    tx: DropOldestSender<Vec<i16>>,
) -> Result<cpal::Stream> {
    use cpal::SampleFormat;

    let stream_config: cpal::StreamConfig = default_config.clone().into();
    let err_callback = |err| {
        tracing::warn!("audio stream error: {}", err);
    };

    let stream = match default_config.sample_format() {
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                push_from_callback(&tx, data.to_vec());
            },
            err_callback,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let converted = data
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .collect();
                push_from_callback(&tx, converted);
            },
            err_callback,
            None,
        ),
        fmt => {
            return Err(SynchroniaError::DeviceUnavailable {
                device: format!("unsupported native sample format {:?}", fmt),
            });
        }
    };

    stream.map_err(|e| SynchroniaError::DeviceUnavailable {
        device: format!("failed to build input stream: {}", e),
    })
}

impl AudioSource for CpalAudioSource {
    fn read_frame(&mut self, timeout: Duration) -> Result<AudioFrame> {
        if self.stream.is_none() {
            return Err(SynchroniaError::DeviceError {
                message: "device closed".to_string(),
            });
        }
        match self.rx.recv_timeout(timeout) {
            Ok(samples) => {
                let frame = AudioFrame::new(samples, self.sample_rate, self.channels, self.sequence);
                self.sequence += 1;
                Ok(frame)
            }
            Err(RecvTimeoutError::Timeout) => Err(SynchroniaError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(SynchroniaError::DeviceError {
                message: "audio stream ended".to_string(),
            }),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.0.pause().map_err(|e| SynchroniaError::DeviceError {
                message: format!("Failed to stop audio stream: {}", e),
            })?;
            tracing::info!(device = %self.name, "audio capture stopped");
        }
        Ok(())
    }

    fn device_name(&self) -> &str {
        &self.name
    }

    fn dropped_frames(&self) -> u64 {
        self.callback_drops.load(Ordering::Relaxed)
    }
}

impl Drop for CpalAudioSource {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("closing audio device on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("HDMI Output"));
        assert!(should_filter_device("Digital Output S/PDIF"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("PulseAudio"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn test_push_from_callback_evicts_oldest_when_full() {
        let (tx, rx) = drop_oldest(2);
        let drops = tx.drop_counter();

        push_from_callback(&tx, vec![1]);
        push_from_callback(&tx, vec![2]);
        push_from_callback(&tx, vec![3]);

        assert_eq!(drops.load(Ordering::Relaxed), 1);
        assert_eq!(rx.try_recv().unwrap(), vec![2]);
        assert_eq!(rx.try_recv().unwrap(), vec![3]);
    }


    #[test]
    #[ignore] // Requires audio hardware
    fn test_open_default_device_and_read() {
        let mut source = CpalAudioSource::open(None).expect("Failed to open default device");
        let frame = source.read_frame(Duration::from_secs(1));
        assert!(frame.is_ok(), "Expected a frame within 1s: {:?}", frame.err());
        assert!(source.close().is_ok());
        assert!(source.close().is_ok());
    }

    #[test]
    #[ignore] // Requires audio subsystem
    fn test_open_invalid_device_name() {
        match CpalAudioSource::open(Some("NonExistentDevice12345")) {
            Err(SynchroniaError::DeviceUnavailable { device }) => {
                assert_eq!(device, "NonExistentDevice12345");
            }
            Err(other) => panic!("Expected DeviceUnavailable, got {}", other),
            Ok(_) => panic!("Expected DeviceUnavailable"),
        }
    }
}
