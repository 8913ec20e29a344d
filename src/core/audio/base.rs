use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::AvsResult;

/// Capture and playback provided by the device.
///
/// Implementations that block on hardware should move that work onto
/// `tokio::task::spawn_blocking`.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Capture one utterance as raw PCM (`AUDIO_L16_RATE_16000_CHANNELS_1`).
    ///
    /// With a timeout, `Ok(None)` means no speech started before it elapsed. Without one
    /// the call waits for speech indefinitely.
    async fn capture(&self, timeout: Option<Duration>) -> AvsResult<Option<Bytes>>;

    /// Play synthesized speech (MP3) to completion.
    async fn play(&self, audio: Bytes) -> AvsResult<()>;

    /// Release audio devices.
    async fn close(&self) -> AvsResult<()>;
}
