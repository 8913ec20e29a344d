use bytes::{BufMut, Bytes, BytesMut};
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use serde_json::{Value, json};

use super::Message;
use crate::core::protocol::Event;
use crate::errors::{AvsError, AvsResult};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
pub const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";

const CRLF: &[u8] = b"\r\n";
const BLANK_LINE: &[u8] = b"\r\n\r\n";

/// `Content-Type` header value for an outbound body framed with `boundary`.
pub fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

/// Frame an event and the device context as a multipart body.
///
/// The metadata part always comes first; the audio part is present only when the
/// event carries an attachment.
pub fn encode_event(event: &Event, context: &Value, boundary: &str) -> AvsResult<Bytes> {
    let metadata = serde_json::to_vec(&json!({
        "context": context,
        "event": event.to_json(),
    }))?;
    let attachment_len = event.attachment().map_or(0, |audio| audio.len());

    let mut body =
        BytesMut::with_capacity(metadata.len() + attachment_len + 4 * boundary.len() + 256);

    put_delimiter(&mut body, boundary);
    body.put_slice(b"Content-Disposition: form-data; name=\"metadata\"\r\n");
    body.put_slice(format!("Content-Type: {JSON_CONTENT_TYPE}\r\n").as_bytes());
    body.put_slice(CRLF);
    body.put_slice(&metadata);
    body.put_slice(CRLF);

    if let Some(audio) = event.attachment() {
        put_delimiter(&mut body, boundary);
        body.put_slice(b"Content-Disposition: form-data; name=\"audio\"\r\n");
        body.put_slice(format!("Content-Type: {OCTET_STREAM_CONTENT_TYPE}\r\n").as_bytes());
        body.put_slice(CRLF);
        body.put_slice(audio);
        body.put_slice(CRLF);
    }

    body.put_slice(b"--");
    body.put_slice(boundary.as_bytes());
    body.put_slice(b"--");
    body.put_slice(CRLF);

    Ok(body.freeze())
}

fn put_delimiter(body: &mut BytesMut, boundary: &str) {
    body.put_slice(b"--");
    body.put_slice(boundary.as_bytes());
    body.put_slice(CRLF);
}

/// Boundary token announced in a multipart `Content-Type` value.
///
/// The token runs from `boundary=` to the next `;` or the end of the value.
pub fn extract_boundary(content_type: &str) -> AvsResult<String> {
    // ASCII lowercasing keeps byte offsets aligned with the original
    let lowered = content_type.to_ascii_lowercase();
    let start = lowered
        .find("boundary=")
        .map(|idx| idx + "boundary=".len())
        .ok_or_else(|| {
            AvsError::Protocol(format!("No boundary in content type '{content_type}'"))
        })?;

    let rest = &content_type[start..];
    let token = rest.split(';').next().unwrap_or_default().trim().trim_matches('"');

    if token.is_empty() {
        return Err(AvsError::Protocol(format!(
            "Empty boundary in content type '{content_type}'"
        )));
    }
    Ok(token.to_string())
}

/// Decode a response using the boundary from its `Content-Type` header.
pub fn decode_message(headers: &HeaderMap, body: Bytes) -> AvsResult<Message> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .ok_or_else(|| AvsError::Protocol("Response has no Content-Type header".to_string()))?
        .to_str()
        .map_err(|e| AvsError::Protocol(format!("Unreadable Content-Type header: {e}")))?;

    let boundary = extract_boundary(content_type)?;
    decode_body(&body, &boundary)
}

/// Decode a multipart body framed with a known boundary.
pub fn decode_body(body: &Bytes, boundary: &str) -> AvsResult<Message> {
    let mut delimiter = Vec::with_capacity(boundary.len() + 2);
    delimiter.extend_from_slice(b"--");
    delimiter.extend_from_slice(boundary.as_bytes());

    let mut message = Message::default();

    for (start, end) in split_ranges(body, &delimiter) {
        let segment = &body[start..end];

        if segment.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        // Closing marker; anything after it is epilogue
        if segment.starts_with(b"--") {
            break;
        }

        let separator = find(segment, BLANK_LINE).ok_or_else(|| {
            AvsError::Protocol(format!(
                "Multipart segment without header/content separator (boundary '{boundary}')"
            ))
        })?;

        let header_block = String::from_utf8_lossy(segment[..separator].trim_ascii());
        let content_start = start + separator + BLANK_LINE.len();
        // The CRLF before the next delimiter belongs to the framing
        let content_end = if segment.ends_with(CRLF) && end - CRLF.len() >= content_start {
            end - CRLF.len()
        } else {
            end
        };
        let content = body.slice(content_start..content_end);

        match part_media_type(&header_block).as_deref() {
            Some("application/json") => {
                let value: Value = serde_json::from_slice(content.trim_ascii()).map_err(|e| {
                    AvsError::Protocol(format!("Invalid JSON in multipart part: {e}"))
                })?;
                message.content.push(value);
            }
            Some("application/octet-stream") => message.attachments.push(content),
            other => {
                tracing::debug!(content_type = ?other, "Ignoring multipart part");
            }
        }
    }

    Ok(message)
}

/// Media type of a part, lowercased and without parameters.
fn part_media_type(header_block: &str) -> Option<String> {
    header_block.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-type") {
            let media_type = value.split(';').next().unwrap_or_default();
            Some(media_type.trim().to_ascii_lowercase())
        } else {
            None
        }
    })
}

/// Byte ranges between occurrences of `delimiter`, including the leading and
/// trailing remainders.
fn split_ranges(haystack: &[u8], delimiter: &[u8]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = find(&haystack[cursor..], delimiter) {
        ranges.push((cursor, cursor + offset));
        cursor += offset + delimiter.len();
    }
    ranges.push((cursor, haystack.len()));
    ranges
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
