//! WAV export of the full-session recording.

use crate::audio::convert::{resample_i16, to_mono_i16};
use crate::defaults::EXPORT_SAMPLE_RATE;
use crate::error::Result;
use std::io::{Seek, Write};
use std::path::Path;

/// Everything captured during one processing session, in device format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRecording {
    /// Interleaved 16-bit PCM samples.
    pub samples: Vec<i16>,
    /// Device sample rate in Hz (0 until the first frame arrives).
    pub sample_rate: u32,
    /// Number of interleaved channels (0 until the first frame arrives).
    pub channels: u16,
}

impl SessionRecording {
    /// True if no audio was captured.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mono 16-bit PCM at the export rate.
    pub fn to_export_pcm(&self) -> Vec<i16> {
        if self.samples.is_empty() {
            return Vec::new();
        }
        let mono = to_mono_i16(&self.samples, self.channels);
        resample_i16(&mono, self.sample_rate, EXPORT_SAMPLE_RATE)
    }
}

/// Write the recording as mono 16-bit PCM at the export rate.
pub fn write_session_wav_to<W: Write + Seek>(writer: W, recording: &SessionRecording) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: EXPORT_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut wav = hound::WavWriter::new(writer, spec)?;
    for sample in recording.to_export_pcm() {
        wav.write_sample(sample)?;
    }
    wav.finalize()?;
    Ok(())
}

/// Write the recording to a WAV file at `path`.
pub fn write_session_wav(path: &Path, recording: &SessionRecording) -> Result<()> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_session_wav_to(file, recording)?;
    tracing::info!(path = %path.display(), "session audio saved");
    Ok(())
}
