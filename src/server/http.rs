//! hyper transport adapters
//!
//! hyper owns the HTTP/1 protocol (parsing, framing, chunked encoding or
//! close-delimited bodies for HTTP/1.0 peers). These adapters connect it to
//! the [`StreamRequest`] / [`StreamResponse`] seam used by [`Hub::handle`]:
//!
//! ```text
//! hyper service ──► HttpRequest ──► Hub::handle ──► HttpResponse
//!       ▲                                               │ first write/flush
//!       └───────── Response<FrameBody> ◄── head ────────┘
//!                          ▲
//!                          └── frames (bounded mpsc) ◄── write
//! ```
//!
//! Dropping the body (hyper does so when the connection goes away) cancels
//! the request's disconnect token.
//!
//! [`Hub::handle`]: crate::Hub::handle

use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use hyper::body::{Body, Frame};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::handler::{StreamRequest, StreamResponse};

/// Frames buffered between the delivery loop and hyper
pub const BODY_QUEUE_CAPACITY: usize = 4;

/// Streaming response body fed by an [`HttpResponse`]
pub struct FrameBody {
    frames: mpsc::Receiver<Bytes>,
    _disconnect: Option<DropGuard>,
}

impl FrameBody {
    /// Body holding a single chunk
    pub fn full(data: impl Into<Bytes>) -> Self {
        let (tx, rx) = mpsc::channel(1);
        // Fresh channel with one free slot
        let _ = tx.try_send(data.into());

        Self {
            frames: rx,
            _disconnect: None,
        }
    }
}

impl Body for FrameBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.frames
            .poll_recv(cx)
            .map(|data| data.map(|data| Ok(Frame::data(data))))
    }
}

impl std::fmt::Debug for FrameBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBody").finish_non_exhaustive()
    }
}

/// Plain text response with a fixed body
pub fn text_response(status: StatusCode, body: &'static str) -> Response<FrameBody> {
    let mut response = Response::new(FrameBody::full(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Request view handed to the hub
#[derive(Debug, Clone)]
pub struct HttpRequest {
    target: String,
    headers: HeaderMap,
    disconnected: CancellationToken,
}

impl HttpRequest {
    /// Capture what the hub needs from a hyper request
    pub fn new<B>(request: &Request<B>, disconnected: CancellationToken) -> Self {
        let target = request
            .uri()
            .path_and_query()
            .map(|target| target.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Self {
            target,
            headers: request.headers().clone(),
            disconnected,
        }
    }

    /// Request path without the query string
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }
}

impl StreamRequest for HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn disconnected(&self) -> CancellationToken {
        self.disconnected.clone()
    }
}

/// Response collected from the hub and handed to hyper on first write
///
/// Status and headers are sent as soon as the first `write` or `flush`
/// happens; later changes are ignored.
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    pending: Option<(oneshot::Sender<Response<FrameBody>>, FrameBody)>,
    frames: mpsc::Sender<Bytes>,
}

impl HttpResponse {
    /// Create a response and the receiver its head is delivered to
    ///
    /// `disconnect` is released when hyper drops the body.
    pub fn new(disconnect: DropGuard) -> (Self, oneshot::Receiver<Response<FrameBody>>) {
        let (frames, rx) = mpsc::channel(BODY_QUEUE_CAPACITY);
        let (head_tx, head_rx) = oneshot::channel();

        let body = FrameBody {
            frames: rx,
            _disconnect: Some(disconnect),
        };

        let response = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            pending: Some((head_tx, body)),
            frames,
        };

        (response, head_rx)
    }

    /// Whether the head was already handed to hyper
    pub fn is_committed(&self) -> bool {
        self.pending.is_none()
    }

    fn commit(&mut self) -> io::Result<()> {
        let Some((head, body)) = self.pending.take() else {
            return Ok(());
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);

        head.send(response)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))
    }

    /// Send the head if nothing was written and end the body
    pub fn finish(mut self) -> io::Result<()> {
        self.commit()
    }
}

impl StreamResponse for HttpResponse {
    fn set_status(&mut self, status: u16) {
        if self.is_committed() {
            return;
        }

        match StatusCode::from_u16(status) {
            Ok(status) => self.status = status,
            Err(_) => tracing::debug!(status = status, "Ignoring invalid status"),
        }
    }

    fn set_header(&mut self, name: &str, value: &str) {
        if self.is_committed() {
            return;
        }

        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::debug!(header = name, "Ignoring invalid header"),
        }
    }

    async fn write(&mut self, data: Bytes) -> io::Result<()> {
        self.commit()?;

        if data.is_empty() {
            return Ok(());
        }

        self.frames
            .send(data)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))
    }

    async fn flush(&mut self) -> io::Result<()> {
        // hyper writes every frame as soon as it is polled
        self.commit()
    }
}
