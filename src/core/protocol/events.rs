use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::namespaces;

/// Recognize events always carry close-talk, 16 kHz mono 16-bit PCM.
pub const RECOGNIZE_PROFILE: &str = "CLOSE_TALK";
pub const RECOGNIZE_FORMAT: &str = "AUDIO_L16_RATE_16000_CHANNELS_1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    pub namespace: String,
    pub name: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "dialogRequestId", skip_serializing_if = "Option::is_none", default)]
    pub dialog_request_id: Option<String>,
}

/// An event ready for the wire. Immutable once stamped with its message id.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    header: EventHeader,
    payload: Value,
    attachment: Option<Bytes>,
}

impl Event {
    pub fn new(header: EventHeader, payload: Value, attachment: Option<Bytes>) -> Self {
        Self {
            header,
            payload,
            attachment,
        }
    }

    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn attachment(&self) -> Option<&Bytes> {
        self.attachment.as_ref()
    }

    /// `{"header": {...}, "payload": {...}}` as it appears under `event` in the metadata part.
    pub fn to_json(&self) -> Value {
        json!({
            "header": self.header,
            "payload": self.payload,
        })
    }
}

/// An event as submitted by callers, before the connection stamps a message id on it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRequest {
    pub namespace: String,
    pub name: String,
    pub dialog_request_id: Option<String>,
    pub payload: Value,
    pub attachment: Option<Bytes>,
}

impl EventRequest {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            dialog_request_id: None,
            payload: Value::Object(Map::new()),
            attachment: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_dialog_request_id(mut self, dialog_request_id: impl Into<String>) -> Self {
        self.dialog_request_id = Some(dialog_request_id.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Bytes) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// `Namespace.Name`, for logs.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    pub fn stamp(self, message_id: impl Into<String>) -> Event {
        Event {
            header: EventHeader {
                namespace: self.namespace,
                name: self.name,
                message_id: message_id.into(),
                dialog_request_id: self.dialog_request_id,
            },
            payload: self.payload,
            attachment: self.attachment,
        }
    }

    pub fn synchronize_state() -> Self {
        Self::new(namespaces::SYSTEM, "SynchronizeState")
    }

    pub fn speech_started(token: &str) -> Self {
        Self::new(namespaces::SPEECH_SYNTHESIZER, "SpeechStarted").with_payload(json!({
            "token": token
        }))
    }

    pub fn speech_finished(token: &str) -> Self {
        Self::new(namespaces::SPEECH_SYNTHESIZER, "SpeechFinished").with_payload(json!({
            "token": token
        }))
    }

    pub fn expect_speech_timed_out() -> Self {
        Self::new(namespaces::SPEECH_RECOGNIZER, "ExpectSpeechTimedOut")
    }

    /// Recognize with captured PCM audio, continuing `dialog_request_id`.
    pub fn recognize(dialog_request_id: impl Into<String>, audio: Bytes) -> Self {
        Self::new(namespaces::SPEECH_RECOGNIZER, "Recognize")
            .with_payload(json!({
                "profile": RECOGNIZE_PROFILE,
                "format": RECOGNIZE_FORMAT
            }))
            .with_dialog_request_id(dialog_request_id)
            .with_attachment(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognize_request() {
        let request = EventRequest::recognize("dialog-1-0", Bytes::from_static(b"pcm"));
        assert_eq!(request.qualified_name(), "SpeechRecognizer.Recognize");
        assert_eq!(request.payload["profile"], "CLOSE_TALK");
        assert_eq!(request.payload["format"], "AUDIO_L16_RATE_16000_CHANNELS_1");
        assert_eq!(request.dialog_request_id.as_deref(), Some("dialog-1-0"));
        assert_eq!(request.attachment.as_deref(), Some(&b"pcm"[..]));
    }

    #[test]
    fn test_stamped_header_serialization() {
        let event = EventRequest::speech_started("T").stamp("message-100-3");
        let json = event.to_json();

        assert_eq!(json["header"]["namespace"], "SpeechSynthesizer");
        assert_eq!(json["header"]["name"], "SpeechStarted");
        assert_eq!(json["header"]["messageId"], "message-100-3");
        assert!(json["header"].get("dialogRequestId").is_none());
        assert_eq!(json["payload"]["token"], "T");
        assert!(event.attachment().is_none());
    }

    #[test]
    fn test_empty_payload_is_object() {
        let event = EventRequest::expect_speech_timed_out().stamp("m");
        assert_eq!(event.payload(), &json!({}));
        assert_eq!(event.header().name, "ExpectSpeechTimedOut");
    }
}
