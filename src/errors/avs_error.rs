use thiserror::Error;

/// Errors raised by the device client.
///
/// Every variant carries enough context to diagnose a protocol mismatch: the HTTP status,
/// the directive namespace and name, or the offending content type.
#[derive(Debug, Error)]
pub enum AvsError {
    /// Token refresh failed or the response carried no access token
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Malformed multipart framing or an otherwise unparseable response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The service answered with a status the protocol does not allow here
    #[error("Protocol error: unexpected HTTP status {status} for {operation}")]
    UnexpectedStatus { operation: String, status: u16 },

    /// Directive namespace or name this client does not implement
    #[error("Unrecognized directive {namespace}.{name}")]
    UnrecognizedDirective { namespace: String, name: String },

    /// A response carried more than one binary part
    #[error("Response carried {0} attachments, at most one is supported")]
    TooManyAttachments(usize),

    /// Transport-level I/O failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// No live session
    #[error("Not connected")]
    NotConnected,

    /// The stream handle belongs to a session that has since been replaced
    #[error("Stale session: handle issued by session {issued}, current session is {current}")]
    StaleSession { issued: u64, current: u64 },

    /// The connection manager was closed
    #[error("Connection closed")]
    Closed,

    /// Audio engine failure
    #[error("Audio error: {0}")]
    Audio(String),

    /// Directive handling produced more follow-up responses than allowed for one turn
    #[error("Directive chain exceeded {0} pending responses")]
    DirectiveChainTooLong(usize),

    /// The operation observed a shutdown request
    #[error("Operation cancelled")]
    Cancelled,

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AvsError {
    /// True for errors that indicate a protocol mismatch with the service.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            AvsError::Protocol(_)
                | AvsError::UnexpectedStatus { .. }
                | AvsError::UnrecognizedDirective { .. }
                | AvsError::TooManyAttachments(_)
        )
    }

    /// True for errors that a fresh session may cure.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AvsError::Transport(_) | AvsError::NotConnected | AvsError::StaleSession { .. }
        )
    }

    pub(crate) fn unexpected_status(operation: impl Into<String>, status: u16) -> Self {
        AvsError::UnexpectedStatus {
            operation: operation.into(),
            status,
        }
    }
}

impl From<serde_json::Error> for AvsError {
    fn from(err: serde_json::Error) -> Self {
        AvsError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for AvsError {
    fn from(err: reqwest::Error) -> Self {
        AvsError::Transport(err.to_string())
    }
}

/// Result type for device client operations.
pub type AvsResult<T> = Result<T, AvsError>;
