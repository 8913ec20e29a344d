use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::core::audio::AudioEngine;
use crate::core::connection::{ConnectionManager, EventSink};
use crate::core::dispatch::{DirectiveDispatcher, TurnSummary};
use crate::core::protocol::EventRequest;
use crate::errors::{AvsError, AvsResult};

/// Owns the audio engine and the connection and runs dialog turns.
///
/// A turn is started by a trigger (a button press, a hot word, a line on stdin). The
/// orchestrator captures one utterance, sends it as `SpeechRecognizer.Recognize` with a
/// fresh dialog request id and hands the response to the [`DirectiveDispatcher`], which
/// follows the directive chain until it runs dry.
pub struct DeviceOrchestrator {
    connection: Arc<ConnectionManager>,
    audio: Arc<dyn AudioEngine>,
    dispatcher: DirectiveDispatcher,
    shutdown: CancellationToken,
}

impl DeviceOrchestrator {
    pub fn new(
        config: &ClientConfig,
        connection: Arc<ConnectionManager>,
        audio: Arc<dyn AudioEngine>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let sink: Arc<dyn EventSink> = connection.clone();
        let dispatcher = DirectiveDispatcher::new(sink, Arc::clone(&audio), config.max_pending_responses)
            .with_cancellation(shutdown.child_token());

        Self {
            connection,
            audio,
            dispatcher,
            shutdown,
        }
    }

    /// Token that stops [`Self::run`] and any directive chain in progress.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Establish the first session.
    pub async fn start(&self) -> AvsResult<()> {
        self.connection.initialize_session().await?;
        info!(epoch = ?self.connection.session_epoch(), "Device ready");
        Ok(())
    }

    /// Capture an utterance and run the dialog it starts.
    pub async fn run_turn(&self) -> AvsResult<TurnSummary> {
        if self.shutdown.is_cancelled() {
            return Err(AvsError::Cancelled);
        }

        // Capture runs to completion; shutdown takes effect once it returns
        let captured = self.audio.capture(None).await?;
        if self.shutdown.is_cancelled() {
            debug!("Shutdown requested during capture, dropping utterance");
            return Err(AvsError::Cancelled);
        }

        let Some(audio) = captured else {
            debug!("Capture returned no speech, skipping turn");
            return Ok(TurnSummary::default());
        };

        let dialog_request_id = self.connection.next_dialog_request_id().await?;
        info!(%dialog_request_id, bytes = audio.len(), "Sending Recognize");

        let handle = self
            .connection
            .send_event(EventRequest::recognize(dialog_request_id, audio))
            .await?;
        self.dispatcher.process_response(handle).await
    }

    /// Run one turn per trigger until shutdown or until the sender is dropped.
    ///
    /// Failed turns are logged and the loop continues. Connection failures get one
    /// `reconnect()` so the next trigger starts on a fresh session.
    pub async fn run(&self, mut triggers: mpsc::Receiver<()>) {
        loop {
            let trigger = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                trigger = triggers.recv() => trigger,
            };
            if trigger.is_none() {
                debug!("Trigger loop finished");
                break;
            }

            match self.run_turn().await {
                Ok(summary) => info!(
                    responses = summary.responses,
                    directives = summary.directives,
                    "Turn complete"
                ),
                Err(AvsError::Cancelled | AvsError::Closed) => break,
                Err(e) if e.is_connection_error() => {
                    warn!(error = %e, "Turn failed on the connection, reconnecting");
                    if let Err(e) = self.connection.reconnect().await {
                        error!(error = %e, "Reconnect failed");
                    }
                }
                Err(e) => error!(error = %e, protocol = e.is_protocol_error(), "Turn failed"),
            }
        }
    }

    /// Stop the loop, close the connection, then release audio.
    pub async fn shutdown(&self) -> AvsResult<()> {
        self.shutdown.cancel();
        self.connection.close().await;
        self.audio.close().await?;
        info!("Device shut down");
        Ok(())
    }
}
