use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use http::StatusCode;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::keepalive::keepalive_loop;
use super::session::{Session, StreamHandle, next_start_time};
use super::{ConnectionState, EventSink};
use crate::config::ClientConfig;
use crate::core::auth::{TokenProvider, TokenSource};
use crate::core::codec::{encode_event, multipart_content_type};
use crate::core::protocol::{DeviceContext, EventRequest};
use crate::core::transport::{Http2Transport, InboundResponse, OutboundRequest, Transport};
use crate::errors::{AvsError, AvsResult};

/// Unversioned keepalive path
pub const PING_PATH: &str = "/ping";

/// Owns the single live session to the voice service.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

pub(super) struct Inner {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenSource>,
    context: Value,
    boundary: String,
    directives_path: String,
    events_path: String,
    pub(super) ping_interval: Duration,
    pub(super) keepalive_tick: Duration,
    session: Mutex<Option<Session>>,
    state: RwLock<ConnectionState>,
    epochs: AtomicU64,
    last_start_time: AtomicU64,
    current_epoch: AtomicU64,
    reconnects: AtomicU64,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        let inner = Inner {
            transport,
            tokens,
            context: DeviceContext::from_config(config).to_json(),
            boundary: config.boundary.clone(),
            directives_path: config.versioned_path("directives"),
            events_path: config.versioned_path("events"),
            ping_interval: config.ping_interval,
            keepalive_tick: config.keepalive_tick,
            session: Mutex::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            epochs: AtomicU64::new(0),
            last_start_time: AtomicU64::new(0),
            current_epoch: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Manager wired to the HTTP/2 transport and the Login With Amazon token provider.
    pub fn from_config(config: &ClientConfig) -> AvsResult<Self> {
        let transport = Arc::new(Http2Transport::new(config)?);
        let tokens = Arc::new(TokenProvider::new(config)?);
        Ok(Self::new(config, transport, tokens))
    }

    /// Open the transport, the downchannel and synchronize state, then start the
    /// keepalive. Replaces any existing session.
    pub async fn initialize_session(&self) -> AvsResult<()> {
        self.inner.initialize_session().await
    }

    /// Build a fresh session after a request-path failure.
    pub async fn reconnect(&self) -> AvsResult<()> {
        info!("Reconnecting on request");
        self.inner.initialize_session().await
    }

    /// Send an event; the response is collected later with [`Self::get_response`].
    pub async fn send_event(&self, request: EventRequest) -> AvsResult<StreamHandle> {
        let token = self.inner.tokens.access_token().await?;

        let mut guard = self.inner.session.lock().await;
        let session = guard.as_mut().ok_or_else(|| self.inner.unavailable())?;

        let name = request.qualified_name();
        let event = request.stamp(session.next_message_id());
        let body = encode_event(&event, &self.inner.context, &self.inner.boundary)?;
        let outbound = OutboundRequest::post(
            self.inner.events_path.clone(),
            &token,
            &multipart_content_type(&self.inner.boundary),
            body,
        )?;

        let stream = session.connection.request(outbound).await?;
        session.touch();

        debug!(
            event = %name,
            message_id = %event.header().message_id,
            epoch = session.epoch,
            stream,
            "Sent event"
        );
        Ok(session.handle(stream))
    }

    /// Wait for the status and headers of a previously sent event.
    pub async fn get_response(&self, handle: StreamHandle) -> AvsResult<InboundResponse> {
        let mut guard = self.inner.session.lock().await;
        let session = guard.as_mut().ok_or_else(|| self.inner.unavailable())?;

        if session.epoch != handle.epoch {
            return Err(AvsError::StaleSession {
                issued: handle.epoch,
                current: session.epoch,
            });
        }

        let response = session.connection.get_response(handle.stream).await?;
        session.touch();
        Ok(response)
    }

    /// Session-scoped `dialog-<start>-<n>` identifier.
    pub async fn next_dialog_request_id(&self) -> AvsResult<String> {
        let mut guard = self.inner.session.lock().await;
        let session = guard.as_mut().ok_or_else(|| self.inner.unavailable())?;
        Ok(session.next_dialog_request_id())
    }

    /// Stop the keepalive and close the transport. Idempotent.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        *self.inner.state.write() = ConnectionState::Closed;

        let previous = self.inner.session.lock().await.take();
        if let Some(session) = previous {
            info!(epoch = session.epoch, "Closing session");
            session.shutdown().await;
        }
        self.inner.current_epoch.store(0, Ordering::SeqCst);
        // An initialization racing with close may have stored Live in between
        *self.inner.state.write() = ConnectionState::Closed;
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Epoch of the live session, `None` when there is none.
    pub fn session_epoch(&self) -> Option<u64> {
        match self.inner.current_epoch.load(Ordering::SeqCst) {
            0 => None,
            epoch => Some(epoch),
        }
    }

    /// Number of sessions rebuilt by the keepalive task.
    pub fn keepalive_reconnects(&self) -> u64 {
        self.inner.reconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for ConnectionManager {
    async fn send_event(&self, request: EventRequest) -> AvsResult<StreamHandle> {
        ConnectionManager::send_event(self, request).await
    }

    async fn get_response(&self, handle: StreamHandle) -> AvsResult<InboundResponse> {
        ConnectionManager::get_response(self, handle).await
    }

    async fn next_dialog_request_id(&self) -> AvsResult<String> {
        ConnectionManager::next_dialog_request_id(self).await
    }
}

impl Inner {
    fn unavailable(&self) -> AvsError {
        match *self.state.read() {
            ConnectionState::Closed => AvsError::Closed,
            _ => AvsError::NotConnected,
        }
    }

    /// Move to `next` unless the manager has been closed.
    fn transition(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state != ConnectionState::Closed {
            *state = next;
        }
    }

    /// Boxed so the keepalive task, which is spawned from here, can call back into it.
    pub(super) fn initialize_session(self: &Arc<Self>) -> BoxFuture<'static, AvsResult<()>> {
        let inner = Arc::clone(self);
        Box::pin(async move { inner.establish().await })
    }

    pub(super) fn record_keepalive_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn establish(self: Arc<Self>) -> AvsResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(AvsError::Closed);
        }
        self.transition(ConnectionState::Initializing);

        let mut guard = self.session.lock().await;

        if let Some(previous) = guard.take() {
            debug!(epoch = previous.epoch, "Tearing down previous session");
            previous.shutdown().await;
        }
        self.current_epoch.store(0, Ordering::SeqCst);

        let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        let connection = match self.transport.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                error!(epoch, error = %e, "Failed to open transport");
                self.transition(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let keepalive_cancel = self.shutdown.child_token();
        let start_time = next_start_time(&self.last_start_time);
        let mut session = Session::new(epoch, start_time, connection, keepalive_cancel.clone());

        if let Err(e) = self.handshake(&mut session).await {
            error!(epoch, error = %e, "Session initialization failed");
            session.shutdown().await;
            self.transition(ConnectionState::Disconnected);
            return Err(e);
        }

        if self.shutdown.is_cancelled() {
            session.shutdown().await;
            return Err(AvsError::Closed);
        }

        let last_activity = Arc::clone(&session.last_activity);
        *guard = Some(session);
        self.current_epoch.store(epoch, Ordering::SeqCst);
        self.transition(ConnectionState::Live);
        drop(guard);

        tokio::spawn(keepalive_loop(
            Arc::clone(&self),
            epoch,
            keepalive_cancel,
            last_activity,
        ));

        info!(epoch, "Session live");
        Ok(())
    }

    /// Downchannel then SynchronizeState on a fresh session.
    async fn handshake(&self, session: &mut Session) -> AvsResult<()> {
        let token = self.tokens.access_token().await?;

        let downchannel = OutboundRequest::get(self.directives_path.clone(), &token)?;
        let stream = session.connection.request(downchannel).await?;
        let response = session.connection.get_response(stream).await?;
        if response.status() != StatusCode::OK {
            return Err(AvsError::unexpected_status(
                "directives downchannel",
                response.status().as_u16(),
            ));
        }
        session.downchannel = Some(response);

        let event = EventRequest::synchronize_state().stamp(session.next_message_id());
        let body = encode_event(&event, &self.context, &self.boundary)?;
        let request = OutboundRequest::post(
            self.events_path.clone(),
            &token,
            &multipart_content_type(&self.boundary),
            body,
        )?;
        let stream = session.connection.request(request).await?;
        let response = session.connection.get_response(stream).await?;
        if response.status() != StatusCode::NO_CONTENT {
            return Err(AvsError::unexpected_status(
                "System.SynchronizeState",
                response.status().as_u16(),
            ));
        }

        session.touch();
        Ok(())
    }

    /// Ping the session identified by `epoch`; it must answer 204.
    pub(super) async fn ping(&self, epoch: u64) -> AvsResult<()> {
        let token = self.tokens.access_token().await?;

        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(AvsError::NotConnected)?;
        if session.epoch != epoch {
            return Err(AvsError::StaleSession {
                issued: epoch,
                current: session.epoch,
            });
        }

        let stream = session
            .connection
            .request(OutboundRequest::get(PING_PATH, &token)?)
            .await?;
        let response = session.connection.get_response(stream).await?;
        session.touch();

        if response.status() != StatusCode::NO_CONTENT {
            warn!(epoch, status = response.status().as_u16(), "Unexpected ping status");
            return Err(AvsError::unexpected_status("ping", response.status().as_u16()));
        }
        Ok(())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
