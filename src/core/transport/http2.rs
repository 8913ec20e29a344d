use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::{InboundResponse, OutboundRequest, StreamId, Transport, TransportConnection};
use crate::config::{ClientConfig, validate_endpoint_url};
use crate::errors::{AvsError, AvsResult};

/// HTTP/2 transport built on reqwest.
///
/// Every [`Transport::connect`] builds a fresh client with its own connection pool, so a
/// reconnect never reuses a half-closed socket from the previous session.
pub struct Http2Transport {
    base_url: Url,
    connect_timeout: Duration,
}

impl Http2Transport {
    pub fn new(config: &ClientConfig) -> AvsResult<Self> {
        let base_url =
            validate_endpoint_url("endpoint", &config.endpoint, config.allow_insecure_endpoints)
                .map_err(|e| AvsError::Transport(e.to_string()))?;
        Ok(Self {
            base_url,
            connect_timeout: config.connect_timeout,
        })
    }
}

#[async_trait]
impl Transport for Http2Transport {
    async fn connect(&self) -> AvsResult<Box<dyn TransportConnection>> {
        // No overall timeout: the downchannel stays open for the whole session
        let client = reqwest::Client::builder()
            .http2_prior_knowledge()
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(None)
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| AvsError::Transport(format!("Failed to create HTTP/2 client: {e}")))?;

        debug!(endpoint = %self.base_url, "Opened HTTP/2 client");

        Ok(Box::new(Http2Connection {
            client: Some(client),
            base_url: self.base_url.clone(),
            next_stream: 1,
            pending: HashMap::new(),
        }))
    }
}

struct Http2Connection {
    client: Option<reqwest::Client>,
    base_url: Url,
    next_stream: StreamId,
    pending: HashMap<StreamId, JoinHandle<reqwest::Result<reqwest::Response>>>,
}

#[async_trait]
impl TransportConnection for Http2Connection {
    async fn request(&mut self, request: OutboundRequest) -> AvsResult<StreamId> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AvsError::Transport("Connection is closed".to_string()))?;

        let url = self
            .base_url
            .join(&request.path)
            .map_err(|e| AvsError::Transport(format!("Invalid request path {}: {e}", request.path)))?;

        let mut builder = client
            .request(request.method, url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let prepared = builder.build()?;

        let stream = self.next_stream;
        self.next_stream += 1;

        let client = client.clone();
        self.pending
            .insert(stream, tokio::spawn(async move { client.execute(prepared).await }));

        Ok(stream)
    }

    async fn get_response(&mut self, stream: StreamId) -> AvsResult<InboundResponse> {
        let handle = self
            .pending
            .remove(&stream)
            .ok_or_else(|| AvsError::Transport(format!("Unknown stream {stream}")))?;

        let response = handle
            .await
            .map_err(|e| AvsError::Transport(format!("Stream {stream} aborted: {e}")))??;

        Ok(InboundResponse::streaming(response))
    }

    async fn close(&mut self) {
        if !self.pending.is_empty() {
            warn!(pending = self.pending.len(), "Closing connection with pending streams");
        }
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
        self.client = None;
    }
}
