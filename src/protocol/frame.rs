//! Event stream framing
//!
//! Every message travels as a single event:
//!
//! ```text
//! data: <text>\n
//! \n
//! ```
//!
//! An empty text still produces a valid frame (`data: \n\n`); those frames are
//! keep-alives and receivers swallow them.

use bytes::{BufMut, Bytes, BytesMut};

/// Media type announced by stream responses and required in `Accept`
pub const EVENT_STREAM: &str = "text/event-stream";

/// Field name carrying the payload
pub const DATA_FIELD: &str = "data:";

/// Encode a text as one event frame
///
/// Messages are meant to be single lines. A text with embedded line breaks is
/// split into one `data:` line per segment so the event stays well formed.
pub fn encode(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + DATA_FIELD.len() + 3);

    for segment in text.split('\n') {
        let segment = segment.strip_suffix('\r').unwrap_or(segment);
        buf.put_slice(DATA_FIELD.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(segment.as_bytes());
        buf.put_u8(b'\n');
    }
    buf.put_u8(b'\n');

    buf.freeze()
}

/// Extract the payload of a `data:` line
///
/// Returns `None` for any other field, comment or blank line. A single space
/// after the colon is part of the field syntax and is removed.
pub fn decode_data_line(line: &str) -> Option<&str> {
    let payload = line.strip_prefix(DATA_FIELD)?;
    Some(payload.strip_prefix(' ').unwrap_or(payload))
}

/// Check whether an `Accept` header value asks for an event stream
pub fn accepts_event_stream(accept: &str) -> bool {
    accept.split(',').any(|media| {
        let media = media.split(';').next().unwrap_or_default().trim();
        media.eq_ignore_ascii_case(EVENT_STREAM)
    })
}
