use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::AudioEngine;
use crate::errors::{AvsError, AvsResult};

/// Audio engine backed by files, for headless devices and demos.
///
/// Each capture consumes the next queued PCM file; once the queue is empty, bounded
/// captures report silence and unbounded captures replay the last file. Played speech
/// is written to `response-<n>.mp3` in the output directory.
pub struct FileAudioEngine {
    utterances: Mutex<VecDeque<PathBuf>>,
    last_utterance: Mutex<Option<PathBuf>>,
    output_dir: PathBuf,
    played: AtomicUsize,
}

impl FileAudioEngine {
    pub fn new(utterances: Vec<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            utterances: Mutex::new(utterances.into()),
            last_utterance: Mutex::new(None),
            output_dir: output_dir.into(),
            played: AtomicUsize::new(0),
        }
    }

    pub fn played_count(&self) -> usize {
        self.played.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioEngine for FileAudioEngine {
    async fn capture(&self, timeout: Option<Duration>) -> AvsResult<Option<Bytes>> {
        let next = self.utterances.lock().pop_front();
        let path = match (next, timeout) {
            (Some(path), _) => path,
            (None, Some(timeout)) => {
                debug!(?timeout, "No queued utterance, reporting silence");
                return Ok(None);
            }
            (None, None) => self.last_utterance.lock().clone().ok_or_else(|| {
                AvsError::Audio("No utterance file available for capture".to_string())
            })?,
        };

        let audio = tokio::fs::read(&path).await.map_err(|e| {
            AvsError::Audio(format!("Failed to read utterance {}: {e}", path.display()))
        })?;
        *self.last_utterance.lock() = Some(path);

        Ok(Some(Bytes::from(audio)))
    }

    async fn play(&self, audio: Bytes) -> AvsResult<()> {
        let index = self.played.fetch_add(1, Ordering::SeqCst);
        let path = self.output_dir.join(format!("response-{index}.mp3"));

        tokio::fs::write(&path, &audio).await.map_err(|e| {
            AvsError::Audio(format!("Failed to write speech to {}: {e}", path.display()))
        })?;

        info!(path = %path.display(), bytes = audio.len(), "Saved synthesized speech");
        Ok(())
    }

    async fn close(&self) -> AvsResult<()> {
        self.utterances.lock().clear();
        Ok(())
    }
}
