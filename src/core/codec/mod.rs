//! Multipart wire codec.
//!
//! Outbound events are framed as `multipart/form-data` with a JSON `metadata` part and
//! an optional binary `audio` part. Inbound responses use the same framing with a
//! server-chosen boundary announced in the `Content-Type` header; JSON parts carry
//! directives and at most one `application/octet-stream` part carries synthesized
//! speech.
//!
//! The splitter is deliberately permissive: the service does not announce a part
//! count and pads bodies inconsistently, so decoding keeps every recognizable part in
//! order and silently drops parts with unknown content types.

mod multipart;


use bytes::Bytes;
use serde_json::Value;

pub use multipart::{
    JSON_CONTENT_TYPE, OCTET_STREAM_CONTENT_TYPE, decode_body, decode_message, encode_event,
    extract_boundary, multipart_content_type,
};

/// A decoded response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// JSON parts in the order received
    pub content: Vec<Value>,
    /// Binary parts in the order received
    pub attachments: Vec<Bytes>,
}

impl Message {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.attachments.is_empty()
    }
}
