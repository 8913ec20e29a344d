//! Protocol data model: outbound events, inbound directives and the device context
//! reported with every event.

mod context;
mod directives;
mod events;

pub use context::{DeviceContext, PlayerActivity};
pub use directives::{
    Directive, DirectiveHeader, DirectiveKind, ExpectSpeechDirective, SpeakDirective,
    supported_directives,
};
pub use events::{Event, EventHeader, EventRequest, RECOGNIZE_FORMAT, RECOGNIZE_PROFILE};

/// Namespace names used on the wire.
pub mod namespaces {
    pub const SYSTEM: &str = "System";
    pub const SPEECH_SYNTHESIZER: &str = "SpeechSynthesizer";
    pub const SPEECH_RECOGNIZER: &str = "SpeechRecognizer";
    pub const AUDIO_PLAYER: &str = "AudioPlayer";
    pub const SPEAKER: &str = "Speaker";
}
