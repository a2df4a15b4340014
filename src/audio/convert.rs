//! Sample format conversion shared by the inference engines and the exporter.
//!
//! All helpers are pure functions so preprocessing stays deterministic:
//! running them twice on the same input yields identical output.

/// Scale factor between i16 PCM and normalized f32.
const I16_SCALE: f32 = 32768.0;

/// Mix interleaved i16 audio down to mono f32 in [-1.0, 1.0] by channel averaging.
///
/// A trailing partial frame (fewer samples than `channels`) is discarded.
pub fn to_mono_f32(samples: &[i16], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.iter().map(|&s| s as f32 / I16_SCALE).collect();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| s as f32).sum();
            sum / channels as f32 / I16_SCALE
        })
        .collect()
}

/// Mix interleaved i16 audio down to mono i16.
pub fn to_mono_i16(samples: &[i16], channels: u16) -> Vec<i16> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Scale samples so the loudest one has magnitude 1.0.
///
/// Silent (all-zero) input is left untouched.
pub fn peak_normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0_f32, |acc, &s| acc.max(s.abs()));
    if peak > 0.0 {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}

/// Repeat the signal until it holds at least `min_len` samples, then cut it to
/// exactly `min_len`.
///
/// Input already at or above `min_len` is returned unchanged. Empty input has
/// nothing to repeat and becomes `min_len` samples of silence.
pub fn tile_to_min_len(samples: &[f32], min_len: usize) -> Vec<f32> {
    if samples.len() >= min_len {
        return samples.to_vec();
    }
    if samples.is_empty() {
        return vec![0.0; min_len];
    }
    samples.iter().copied().cycle().take(min_len).collect()
}

/// Linear interpolation resampling for normalized f32 audio.
pub fn resample_f32(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}

/// Linear interpolation resampling for i16 PCM.
pub fn resample_i16(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}
