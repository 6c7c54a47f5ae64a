//! Stream delivery
//!
//! [`Hub::handle`] turns one request into one subscriber: it negotiates the
//! response, replays retained history, then copies frames from the
//! subscriber queue to the transport until either side goes away.
//!
//! The transport is abstracted by [`StreamRequest`] and [`StreamResponse`] so
//! the same delivery loop runs behind the bundled HTTP server or any other
//! server that can write and flush bytes.

use std::future::Future;
use std::io;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::page;
use crate::hub::{Hub, Message, SubscriberHandle};
use crate::protocol::frame::{self, EVENT_STREAM};

/// Incoming stream request
pub trait StreamRequest: Sync {
    /// Header value by case-insensitive name
    fn header(&self, name: &str) -> Option<&str>;

    /// Request target as sent by the client (path and query)
    fn target(&self) -> &str;

    /// Token cancelled when the client disconnects
    fn disconnected(&self) -> CancellationToken;
}

/// Outgoing streamed response
///
/// Status and headers must be set before the first `write` or `flush`.
pub trait StreamResponse: Send {
    /// Set the status code
    fn set_status(&mut self, status: u16);

    /// Set a header, replacing any previous value
    fn set_header(&mut self, name: &str, value: &str);

    /// Write body bytes
    ///
    /// May wait while the client is not reading.
    fn write(&mut self, data: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Push everything written so far to the client
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

impl Hub {
    /// Serve one streaming request
    ///
    /// Requests that do not accept `text/event-stream` get the log page, or
    /// `400` when the page is disabled. Stream requests are registered as
    /// subscribers and served until the client disconnects, the hub shuts
    /// down, or the subscriber is evicted. Write errors end the stream and are
    /// returned; the subscriber is unregistered on every path.
    pub async fn handle<Req, Resp>(&self, request: &Req, response: &mut Resp) -> io::Result<()>
    where
        Req: StreamRequest,
        Resp: StreamResponse,
    {
        let wants_stream = request
            .header("Accept")
            .is_some_and(frame::accepts_event_stream);

        if !wants_stream {
            if self.config().disable_page {
                return respond(
                    response,
                    400,
                    "text/plain; charset=utf-8",
                    "cannot handle plain request",
                )
                .await;
            }

            return respond(
                response,
                200,
                "text/html; charset=utf-8",
                &page::render(request.target()),
            )
            .await;
        }

        let Some((mut subscriber, replay)) = self.register() else {
            return respond(response, 503, "text/plain; charset=utf-8", "hub is shut down").await;
        };

        response.set_status(200);
        response.set_header("Content-Type", EVENT_STREAM);
        response.set_header("Cache-Control", "no-cache");
        response.set_header("Connection", "keep-alive");

        let result = deliver(&mut subscriber, replay, request.disconnected(), response).await;

        if let Err(ref e) = result {
            tracing::debug!(subscriber = subscriber.id(), error = %e, "Stream write failed");
        }

        result
    }
}

async fn respond<R: StreamResponse>(
    response: &mut R,
    status: u16,
    content_type: &str,
    body: &str,
) -> io::Result<()> {
    response.set_status(status);
    response.set_header("Content-Type", content_type);
    response.write(Bytes::copy_from_slice(body.as_bytes())).await?;
    response.flush().await
}

async fn write_frames<R: StreamResponse>(response: &mut R, frames: Vec<Bytes>) -> io::Result<()> {
    for frame in frames {
        response.write(frame).await?;
    }
    response.flush().await
}

async fn deliver<R: StreamResponse>(
    subscriber: &mut SubscriberHandle,
    replay: Vec<Message>,
    disconnected: CancellationToken,
    response: &mut R,
) -> io::Result<()> {
    let terminated = subscriber.shutdown_token();

    // Late joiners get recent history, everyone else a keep-alive proving the stream is live
    let mut pending: Vec<Bytes> = if replay.is_empty() {
        vec![Message::ping().to_frame()]
    } else {
        replay.iter().map(Message::to_frame).collect()
    };

    loop {
        // A client that stops reading parks the write; teardown must still win
        let written = tokio::select! {
            biased;
            _ = disconnected.cancelled() => {
                tracing::debug!(subscriber = subscriber.id(), "Client disconnected");
                break;
            }
            _ = terminated.cancelled() => break,
            written = write_frames(response, std::mem::take(&mut pending)) => written,
        };
        written?;

        let frame = tokio::select! {
            biased;
            _ = disconnected.cancelled() => {
                tracing::debug!(subscriber = subscriber.id(), "Client disconnected");
                break;
            }
            _ = terminated.cancelled() => break,
            frame = subscriber.recv() => match frame {
                Some(frame) => frame,
                None => {
                    tracing::debug!(subscriber = subscriber.id(), "Subscriber queue closed");
                    break;
                }
            },
        };

        pending.push(frame);
    }

    Ok(())
}
