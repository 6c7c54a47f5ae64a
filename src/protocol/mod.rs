//! Wire protocol
//!
//! The hub speaks the text event stream format: UTF-8 lines, one `data:` field
//! per message, events separated by a blank line.

pub mod frame;

pub use frame::{accepts_event_stream, decode_data_line, encode, EVENT_STREAM};
