use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use super::namespaces;
use crate::errors::{AvsError, AvsResult};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DirectiveHeader {
    pub namespace: String,
    pub name: String,
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
    #[serde(rename = "dialogRequestId", default)]
    pub dialog_request_id: Option<String>,
}

/// Directive types this client handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Speak,
    ExpectSpeech,
}

/// Registered `(namespace, name)` pairs. Anything else is unrecognized.
const DIRECTIVE_REGISTRY: &[(&str, &str, DirectiveKind)] = &[
    (namespaces::SPEECH_SYNTHESIZER, "Speak", DirectiveKind::Speak),
    (
        namespaces::SPEECH_RECOGNIZER,
        "ExpectSpeech",
        DirectiveKind::ExpectSpeech,
    ),
];

/// All `(namespace, name)` pairs with a registered handler.
pub fn supported_directives() -> Vec<(&'static str, &'static str)> {
    DIRECTIVE_REGISTRY
        .iter()
        .map(|(namespace, name, _)| (*namespace, *name))
        .collect()
}

impl DirectiveKind {
    pub fn lookup(namespace: &str, name: &str) -> Option<Self> {
        DIRECTIVE_REGISTRY
            .iter()
            .find(|(ns, n, _)| *ns == namespace && *n == name)
            .map(|(_, _, kind)| *kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeakDirective {
    pub header: DirectiveHeader,
    pub token: String,
    pub format: Option<String>,
    /// `cid:` reference to the audio part
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpectSpeechDirective {
    pub header: DirectiveHeader,
    pub timeout: Duration,
}

impl ExpectSpeechDirective {
    pub fn dialog_request_id(&self) -> Option<&str> {
        self.header.dialog_request_id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Speak(SpeakDirective),
    ExpectSpeech(ExpectSpeechDirective),
}

#[derive(Deserialize)]
struct Envelope {
    directive: RawDirective,
}

#[derive(Deserialize)]
struct RawDirective {
    header: DirectiveHeader,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct SpeakPayload {
    token: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct ExpectSpeechPayload {
    #[serde(rename = "timeoutInMilliseconds")]
    timeout_in_milliseconds: u64,
}

impl Directive {
    /// Parse one JSON content part of a decoded response.
    pub fn parse(content: &Value) -> AvsResult<Self> {
        let envelope = Envelope::deserialize(content)
            .map_err(|e| AvsError::Protocol(format!("Content part is not a directive: {e}")))?;
        let RawDirective { header, payload } = envelope.directive;

        let kind = DirectiveKind::lookup(&header.namespace, &header.name).ok_or_else(|| {
            AvsError::UnrecognizedDirective {
                namespace: header.namespace.clone(),
                name: header.name.clone(),
            }
        })?;

        match kind {
            DirectiveKind::Speak => {
                let payload = SpeakPayload::deserialize(&payload).map_err(|e| {
                    AvsError::Protocol(format!("Malformed SpeechSynthesizer.Speak payload: {e}"))
                })?;
                Ok(Directive::Speak(SpeakDirective {
                    header,
                    token: payload.token,
                    format: payload.format,
                    url: payload.url,
                }))
            }
            DirectiveKind::ExpectSpeech => {
                let payload = ExpectSpeechPayload::deserialize(&payload).map_err(|e| {
                    AvsError::Protocol(format!(
                        "Malformed SpeechRecognizer.ExpectSpeech payload: {e}"
                    ))
                })?;
                Ok(Directive::ExpectSpeech(ExpectSpeechDirective {
                    header,
                    timeout: Duration::from_millis(payload.timeout_in_milliseconds),
                }))
            }
        }
    }

    pub fn kind(&self) -> DirectiveKind {
        match self {
            Directive::Speak(_) => DirectiveKind::Speak,
            Directive::ExpectSpeech(_) => DirectiveKind::ExpectSpeech,
        }
    }

    pub fn header(&self) -> &DirectiveHeader {
        match self {
            Directive::Speak(speak) => &speak.header,
            Directive::ExpectSpeech(expect) => &expect.header,
        }
    }
}
