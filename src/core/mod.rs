pub mod audio;
pub mod auth;
pub mod codec;
pub mod connection;
pub mod device;
pub mod dispatch;
pub mod protocol;
pub mod transport;

// Re-export commonly used types for convenience
pub use audio::{AudioEngine, FileAudioEngine};
pub use auth::{Token, TokenProvider, TokenSource};
pub use codec::{Message, decode_message, encode_event};
pub use connection::{ConnectionManager, ConnectionState, EventSink, StreamHandle};
pub use device::DeviceOrchestrator;
pub use dispatch::{DirectiveDispatcher, TurnSummary};
pub use protocol::{Directive, Event, EventRequest};
pub use transport::{Http2Transport, InboundResponse, OutboundRequest, Transport, TransportConnection};
