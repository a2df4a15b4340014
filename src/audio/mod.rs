//! Audio capture, format conversion and session export.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod convert;
pub mod source;
pub mod wav;

pub use source::{AudioSource, MockAudioSource};
pub use wav::SessionRecording;
