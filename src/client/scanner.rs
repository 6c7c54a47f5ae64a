//! Frame scanner
//!
//! Splits a response body into lines and forwards the payload of every
//! non-empty `data:` line. Anything else (comments, `event:`/`id:` fields,
//! blank separators) is skipped, and so are lines that are not valid UTF-8
//! or longer than [`MAX_LINE_LENGTH`].

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::decode_data_line;

/// Longest line kept, terminator excluded
pub(crate) const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Scan `reader` until EOF, a read error, cancellation, or the output closing
pub(crate) async fn scan<R>(
    mut reader: R,
    output: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        let more = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            more = read_line(&mut reader, &mut line) => more?,
        };

        if !more {
            return Ok(());
        }

        let Ok(text) = std::str::from_utf8(&line) else {
            tracing::debug!(len = line.len(), "Skipping line that is not valid UTF-8");
            continue;
        };

        let payload = match decode_data_line(text) {
            Some(payload) if !payload.is_empty() => payload.to_string(),
            _ => continue,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            sent = output.send(payload) => {
                if sent.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

/// Read the next line into `line`, without its `\n` or `\r\n` terminator
///
/// Returns `false` once the reader is exhausted. An over-long line is
/// consumed up to its newline and handed back empty.
async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let mut read_any = false;
    let mut overlong = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        read_any = true;

        let (chunk, terminated) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (&available[..end], true),
            None => (available, false),
        };

        if !overlong {
            if line.len() + chunk.len() > MAX_LINE_LENGTH + 1 {
                overlong = true;
                line.clear();
            } else {
                line.extend_from_slice(chunk);
            }
        }

        let used = chunk.len() + usize::from(terminated);
        reader.consume(used);

        if terminated {
            break;
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }

    if overlong || line.len() > MAX_LINE_LENGTH {
        tracing::debug!(limit = MAX_LINE_LENGTH, "Dropping over-long line");
        line.clear();
    }

    Ok(read_any)
}
