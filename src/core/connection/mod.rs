//! Session lifecycle for the voice service.
//!
//! [`ConnectionManager`] owns exactly one logical session at a time. A session is
//! established by opening the downchannel (`GET /v20160207/directives`, must answer 200)
//! and synchronizing client state (`System.SynchronizeState`, must answer 204). While the
//! session is live a background keepalive task pings the service after every idle
//! period; a failed ping tears the session down and builds a new one.
//!
//! # State machine
//!
//! ```text
//! Disconnected -> Initializing -> Live -> (keepalive failure) -> Initializing -> ...
//!                                   \-> close() -> Closed
//! ```
//!
//! Only the keepalive path reconnects on its own. Failures on the request path
//! (`send_event` / `get_response`) are returned to the caller.
//!
//! # Session swaps
//!
//! The current session lives behind a single async mutex together with its transport
//! connection, and is replaced as a unit. Every [`StreamHandle`] records the epoch of
//! the session that issued it; presenting a handle to a newer session fails with
//! [`AvsError::StaleSession`](crate::errors::AvsError::StaleSession) instead of reading
//! from a connection that no longer exists.

mod keepalive;
mod manager;
mod session;


use async_trait::async_trait;

pub use manager::ConnectionManager;
pub use session::StreamHandle;

use crate::core::protocol::EventRequest;
use crate::core::transport::InboundResponse;
use crate::errors::AvsResult;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Initializing,
    Live,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Initializing => "initializing",
            ConnectionState::Live => "live",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Where the directive dispatcher sends follow-up events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send_event(&self, request: EventRequest) -> AvsResult<StreamHandle>;

    async fn get_response(&self, handle: StreamHandle) -> AvsResult<InboundResponse>;

    /// Fresh session-scoped dialog request id.
    async fn next_dialog_request_id(&self) -> AvsResult<String>;
}
