//! Audio capture and playback seam.
//!
//! Microphone and speaker handling live outside this crate; the client only needs
//! something that can hand over 16 kHz mono 16-bit PCM for Recognize events and play
//! the MP3 speech the service returns.

mod base;
mod file;

pub use base::AudioEngine;
pub use file::FileAudioEngine;
