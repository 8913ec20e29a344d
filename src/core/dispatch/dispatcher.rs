use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::audio::AudioEngine;
use crate::core::codec::{Message, decode_message};
use crate::core::connection::{EventSink, StreamHandle};
use crate::core::protocol::{Directive, EventRequest, ExpectSpeechDirective, SpeakDirective};
use crate::errors::{AvsError, AvsResult};

/// What one turn processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnSummary {
    pub responses: usize,
    pub directives: usize,
}

enum Work {
    Response(StreamHandle),
    Directive {
        directive: Directive,
        attachment: Option<Bytes>,
    },
    Play(Bytes),
    FinishSpeech(String),
}

pub struct DirectiveDispatcher {
    sink: Arc<dyn EventSink>,
    audio: Arc<dyn AudioEngine>,
    max_pending_responses: usize,
    cancel: CancellationToken,
}

impl DirectiveDispatcher {
    pub fn new(
        sink: Arc<dyn EventSink>,
        audio: Arc<dyn AudioEngine>,
        max_pending_responses: usize,
    ) -> Self {
        Self {
            sink,
            audio,
            max_pending_responses,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop chains at the next step once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch the response for `handle` and run every directive it leads to.
    pub async fn process_response(&self, handle: StreamHandle) -> AvsResult<TurnSummary> {
        let mut pending = vec![Work::Response(handle)];
        let mut summary = TurnSummary::default();

        while let Some(work) = pending.pop() {
            if self.cancel.is_cancelled() {
                info!(?summary, "Directive chain cancelled");
                return Err(AvsError::Cancelled);
            }

            match work {
                Work::Response(handle) => {
                    summary.responses += 1;
                    if summary.responses > self.max_pending_responses {
                        error!(limit = self.max_pending_responses, "Directive chain too long");
                        return Err(AvsError::DirectiveChainTooLong(self.max_pending_responses));
                    }

                    let Some(message) = self.fetch(handle).await? else {
                        continue;
                    };
                    let attachment = message.attachments.into_iter().next();

                    // Parse everything first so an unknown directive stops the turn
                    // before any of its siblings send events
                    let directives = message
                        .content
                        .iter()
                        .map(Directive::parse)
                        .collect::<AvsResult<Vec<_>>>()
                        .inspect_err(|e| error!(error = %e, "Rejecting response"))?;

                    summary.directives += directives.len();
                    for directive in directives.into_iter().rev() {
                        pending.push(Work::Directive {
                            directive,
                            attachment: attachment.clone(),
                        });
                    }
                }
                Work::Directive {
                    directive,
                    attachment,
                } => match directive {
                    Directive::Speak(speak) => {
                        self.speak(speak, attachment, &mut pending).await?;
                    }
                    Directive::ExpectSpeech(expect) => {
                        self.expect_speech(expect, &mut pending).await?;
                    }
                },
                Work::Play(audio) => {
                    self.audio.play(audio).await?;
                }
                Work::FinishSpeech(token) => {
                    let handle = self
                        .sink
                        .send_event(EventRequest::speech_finished(&token))
                        .await?;
                    pending.push(Work::Response(handle));
                }
            }
        }

        debug!(?summary, "Turn complete");
        Ok(summary)
    }

    /// `None` for 204, the decoded message for 200.
    async fn fetch(&self, handle: StreamHandle) -> AvsResult<Option<Message>> {
        let response = self.sink.get_response(handle).await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::OK => {
                let headers = response.headers().clone();
                let body = response.bytes().await?;
                let message = decode_message(&headers, body)?;
                if message.attachments.len() > 1 {
                    return Err(AvsError::TooManyAttachments(message.attachments.len()));
                }
                Ok(Some(message))
            }
            status => Err(AvsError::unexpected_status(
                "event response",
                status.as_u16(),
            )),
        }
    }

    async fn speak(
        &self,
        speak: SpeakDirective,
        attachment: Option<Bytes>,
        pending: &mut Vec<Work>,
    ) -> AvsResult<()> {
        let audio = attachment.ok_or_else(|| {
            AvsError::Protocol(format!(
                "SpeechSynthesizer.Speak (token {}) arrived without an audio attachment",
                speak.token
            ))
        })?;

        debug!(token = %speak.token, bytes = audio.len(), "Speak");
        let started = self
            .sink
            .send_event(EventRequest::speech_started(&speak.token))
            .await?;

        // Popped in reverse: started response, playback, then SpeechFinished
        pending.push(Work::FinishSpeech(speak.token));
        pending.push(Work::Play(audio));
        pending.push(Work::Response(started));
        Ok(())
    }

    async fn expect_speech(
        &self,
        expect: ExpectSpeechDirective,
        pending: &mut Vec<Work>,
    ) -> AvsResult<()> {
        let dialog_request_id = match expect.dialog_request_id() {
            Some(id) => id.to_string(),
            None => self.sink.next_dialog_request_id().await?,
        };

        debug!(timeout = ?expect.timeout, %dialog_request_id, "ExpectSpeech");
        let handle = match self.audio.capture(Some(expect.timeout)).await? {
            Some(audio) => {
                self.sink
                    .send_event(EventRequest::recognize(dialog_request_id, audio))
                    .await?
            }
            None => {
                info!("No speech before ExpectSpeech timeout");
                self.sink
                    .send_event(EventRequest::expect_speech_timed_out())
                    .await?
            }
        };

        pending.push(Work::Response(handle));
        Ok(())
    }
}
