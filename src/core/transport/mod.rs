//! Transport seam between the connection manager and the network.
//!
//! A [`Transport`] opens connections; a [`TransportConnection`] is one multiplexed
//! session on which requests are issued and their responses collected by stream id.
//! Connections are not safe for concurrent use, so the connection manager keeps each
//! one behind a single lock.

mod http2;

pub use http2::Http2Transport;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, Method, StatusCode};

use crate::errors::{AvsError, AvsResult};

/// Identifies one request/response exchange on a connection.
pub type StreamId = u64;

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    /// Path relative to the service endpoint, e.g. `/v20160207/events`
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn get(path: impl Into<String>, bearer: &str) -> AvsResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer_header(bearer)?);
        Ok(Self {
            method: Method::GET,
            path: path.into(),
            headers,
            body: None,
        })
    }

    pub fn post(
        path: impl Into<String>,
        bearer: &str,
        content_type: &str,
        body: Bytes,
    ) -> AvsResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer_header(bearer)?);
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type)
                .map_err(|e| AvsError::Protocol(format!("Invalid content type: {e}")))?,
        );
        Ok(Self {
            method: Method::POST,
            path: path.into(),
            headers,
            body: Some(body),
        })
    }
}

fn bearer_header(token: &str) -> AvsResult<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| AvsError::Auth("Access token is not a valid header value".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

enum ResponseBody {
    Buffered(Bytes),
    Streaming(reqwest::Response),
}

/// Status and headers of a response; the body is read on demand.
///
/// Long-lived streams such as the downchannel are kept as an unread response.
pub struct InboundResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl InboundResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Buffered(body),
        }
    }

    pub(crate) fn streaming(response: reqwest::Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: ResponseBody::Streaming(response),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Read the full body.
    pub async fn bytes(self) -> AvsResult<Bytes> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(response) => response
                .bytes()
                .await
                .map_err(|e| AvsError::Transport(format!("Failed to read response body: {e}"))),
        }
    }
}

impl std::fmt::Debug for InboundResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Opens connections to the voice service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> AvsResult<Box<dyn TransportConnection>>;
}

/// One multiplexed connection.
#[async_trait]
pub trait TransportConnection: Send {
    /// Start a request and return its stream id without waiting for the response.
    async fn request(&mut self, request: OutboundRequest) -> AvsResult<StreamId>;

    /// Wait until status and headers of `stream` are available.
    async fn get_response(&mut self, stream: StreamId) -> AvsResult<InboundResponse>;

    /// Tear the connection down. Pending streams fail.
    async fn close(&mut self);
}
