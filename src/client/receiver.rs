//! Event stream receiver
//!
//! Connects to a remote event stream and re-exposes its `data:` lines three
//! ways, all fed by one republisher task:
//!
//! - pull: [`StreamClient::next_line`] (buffered FIFO or latest-line relay)
//! - push: an output sink set with [`StreamClient::set_output`]
//! - fan-out: [`StreamClient::subscribe`] broadcast receivers

use std::collections::VecDeque;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::StatusCode;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use super::config::ClientConfig;
use super::scanner;
use super::state::ClientState;
use crate::error::{Error, Result};
use crate::protocol::EVENT_STREAM;

/// Lines in flight between the scanner and the republisher
const LINE_QUEUE_CAPACITY: usize = 64;

/// Per-receiver lag allowed on `subscribe` channels
const BROADCAST_CAPACITY: usize = 256;

type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;
type BodyReader = StreamReader<BodyStream, Bytes>;

/// State shared between the client and its republisher
struct Shared {
    state: Mutex<ClientState>,
    buffer: Mutex<VecDeque<String>>,
    sink: Mutex<Option<Box<dyn Write + Send>>>,
    latest: watch::Sender<Option<String>>,
    lines: broadcast::Sender<String>,
}

impl Shared {
    fn set_state(&self, state: ClientState) {
        *self.state.lock() = state;
    }

    fn publish(&self, config: &ClientConfig, line: String) {
        self.write_sink(config, &line);

        if config.is_buffered() {
            let mut buffer = self.buffer.lock();
            if buffer.len() == config.buffer_size {
                buffer.pop_front();
            }
            buffer.push_back(line.clone());
        }

        // No receivers is fine
        let _ = self.lines.send(line.clone());

        self.latest.send_replace(Some(line));
    }

    fn write_sink(&self, config: &ClientConfig, line: &str) {
        let mut sink = self.sink.lock();
        let Some(writer) = sink.as_mut() else {
            return;
        };

        let result = if config.append_newline {
            writer
                .write_all(line.as_bytes())
                .and_then(|_| writer.write_all(b"\n"))
        } else {
            writer.write_all(line.as_bytes())
        };

        if let Err(e) = result.and_then(|_| writer.flush()) {
            tracing::warn!(error = %e, "Output sink write failed");
        }
    }
}

/// Event stream receiver
///
/// # Example
/// ```no_run
/// use ssehub::client::{ClientConfig, StreamClient};
///
/// # async fn example() -> ssehub::Result<()> {
/// let config = ClientConfig::default().buffer_size(100);
/// let mut client = StreamClient::new("http://localhost:8080/log", config);
///
/// client.connect().await?;
///
/// while let Some(line) = client.next_line().await {
///     println!("{}", line);
/// }
/// # Ok(())
/// # }
/// ```
pub struct StreamClient {
    url: String,
    config: ClientConfig,
    shared: Arc<Shared>,
    latest: watch::Receiver<Option<String>>,
    cancel: CancellationToken,
}

impl StreamClient {
    /// Create an unconnected receiver
    pub fn new(url: impl Into<String>, config: ClientConfig) -> Self {
        Self::with_token(url.into(), config, CancellationToken::new())
    }

    /// Create an unconnected receiver that also stops when `parent` is cancelled
    pub fn with_cancellation(
        url: impl Into<String>,
        config: ClientConfig,
        parent: &CancellationToken,
    ) -> Self {
        Self::with_token(url.into(), config, parent.child_token())
    }

    fn with_token(url: String, config: ClientConfig, cancel: CancellationToken) -> Self {
        let (latest_tx, latest) = watch::channel(None);
        let (lines, _) = broadcast::channel(BROADCAST_CAPACITY);

        let shared = Arc::new(Shared {
            state: Mutex::new(ClientState::Unconnected),
            buffer: Mutex::new(VecDeque::with_capacity(config.buffer_size.min(1024))),
            sink: Mutex::new(None),
            latest: latest_tx,
            lines,
        });

        Self {
            url,
            config,
            shared,
            latest,
            cancel,
        }
    }

    /// Stream URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Receiver configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Write every received line to `sink`
    ///
    /// Replaces any previous sink. Write failures are logged, they do not
    /// end the stream.
    pub fn set_output<W>(&self, sink: W)
    where
        W: Write + Send + 'static,
    {
        *self.shared.sink.lock() = Some(Box::new(sink));
    }

    /// Open the stream and receive lines in the background
    pub async fn connect(&mut self) -> Result<()> {
        let reader = self.open().await?;
        let (lines, _republisher) = self.spawn_republisher();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            if let Err(e) = scanner::scan(reader, lines, cancel).await {
                tracing::debug!(error = %e, "Stream read failed");
            }
        });

        Ok(())
    }

    /// Open the stream and scan it on the calling task
    ///
    /// Returns once the stream ended or the receiver was shut down. Lines are
    /// still delivered through the republisher, so `subscribe` receivers and
    /// the output sink work as with [`connect`](Self::connect).
    pub async fn connect_sync(&mut self) -> Result<()> {
        let reader = self.open().await?;
        let (lines, republisher) = self.spawn_republisher();

        if let Err(e) = scanner::scan(reader, lines, self.cancel.clone()).await {
            tracing::debug!(error = %e, "Stream read failed");
        }

        // Every scanned line is published before returning
        let _ = republisher.await;
        Ok(())
    }

    /// Next received line
    ///
    /// Buffered receivers return the oldest unread line without waiting.
    /// Unbuffered receivers return the most recent line not yet seen. When
    /// nothing is available this waits for the next line. `None` means the
    /// stream is over.
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.take_available() {
                return Some(line);
            }

            if self.cancel.is_cancelled() {
                return None;
            }

            tokio::select! {
                biased;
                changed = self.latest.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = self.cancel.cancelled() => {}
            }
        }
    }

    fn take_available(&mut self) -> Option<String> {
        if self.config.is_buffered() {
            return self.shared.buffer.lock().pop_front();
        }

        if self.latest.has_changed().unwrap_or(false) {
            return self.latest.borrow_and_update().clone();
        }

        None
    }

    /// Receive every line published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.shared.lines.subscribe()
    }

    /// Stop receiving; pending `next_line` calls return `None`
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled when the receiver stops
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ClientState {
        *self.shared.state.lock()
    }

    /// Lines may still arrive
    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    async fn open(&mut self) -> Result<BodyReader> {
        {
            let mut state = self.shared.state.lock();
            if *state != ClientState::Unconnected {
                return Err(Error::AlreadyConnected);
            }
            *state = ClientState::Connecting;
        }

        match self.request().await {
            Ok(reader) => {
                self.shared.set_state(ClientState::Streaming);
                tracing::info!(url = %self.url, "Connected to event stream");
                Ok(reader)
            }
            Err(e) => {
                self.shared.set_state(ClientState::Closed);
                self.cancel.cancel();
                tracing::debug!(url = %self.url, error = %e, "Connect failed");
                Err(e)
            }
        }
    }

    async fn request(&self) -> Result<BodyReader> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build()?;

        let response = http
            .request(self.config.method.clone(), &self.url)
            .header(ACCEPT, EVENT_STREAM)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Error::UnexpectedStatus(response.status()));
        }

        let body: BodyStream = Box::pin(response.bytes_stream().map_err(io::Error::other));
        Ok(StreamReader::new(body))
    }

    fn spawn_republisher(&self) -> (mpsc::Sender<String>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(LINE_QUEUE_CAPACITY);
        let handle = tokio::spawn(republish(
            self.shared.clone(),
            self.config.clone(),
            rx,
            self.cancel.clone(),
            self.url.clone(),
        ));
        (tx, handle)
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("url", &self.url)
            .field("state", &self.state())
            .finish()
    }
}

async fn republish(
    shared: Arc<Shared>,
    config: ClientConfig,
    mut lines: mpsc::Receiver<String>,
    cancel: CancellationToken,
    url: String,
) {
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        shared.publish(&config, line);
    }

    shared.set_state(ClientState::Closed);
    cancel.cancel();

    tracing::info!(url = %url, "Event stream closed");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned response, then keep the socket open until `hold` is cancelled
    async fn canned_server(
        status: &'static str,
        frames: Vec<&'static str>,
        hold: CancellationToken,
    ) -> (String, tokio::sync::oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/log", listener.local_addr().unwrap());
        let (head_tx, head_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.ends_with(b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let _ = head_tx.send(String::from_utf8_lossy(&head).into_owned());

            let mut response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
                status
            );
            for frame in frames {
                response.push_str(frame);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();

            hold.cancelled().await;
        });

        (url, head_rx)
    }

    async fn wait_closed(client: &StreamClient) {
        tokio::time::timeout(Duration::from_secs(5), client.cancellation_token().cancelled())
            .await
            .expect("receiver did not close");
        while !client.state().is_closed() {
            tokio::task::yield_now().await;
        }
    }

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_buffer_keeps_newest_lines() {
        let hold = CancellationToken::new();
        let (url, _) = canned_server(
            "200 OK",
            vec!["data: x\n\n", "data: y\n\n", "data: z\n\n"],
            hold.clone(),
        )
        .await;
        hold.cancel();

        let mut client = StreamClient::new(url, ClientConfig::default().buffer_size(2));
        client.connect().await.unwrap();
        wait_closed(&client).await;

        assert_eq!(client.next_line().await.as_deref(), Some("y"));
        assert_eq!(client.next_line().await.as_deref(), Some("z"));
        assert_eq!(client.next_line().await, None);
        assert_eq!(client.next_line().await, None);
    }

    #[tokio::test]
    async fn test_buffered_lines_in_order() {
        let hold = CancellationToken::new();
        let (url, _) = canned_server(
            "200 OK",
            vec![": hello\n\n", "data: a\n\n", "event: x\ndata: b\n\n", "data: \n\n"],
            hold.clone(),
        )
        .await;

        let mut client = StreamClient::new(url, ClientConfig::default().buffer_size(10));
        client.connect().await.unwrap();
        assert!(client.is_live());

        assert_eq!(client.next_line().await.as_deref(), Some("a"));
        assert_eq!(client.next_line().await.as_deref(), Some("b"));

        hold.cancel();
        assert_eq!(client.next_line().await, None);
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_relay_returns_latest_line() {
        let hold = CancellationToken::new();
        let (url, _) = canned_server(
            "200 OK",
            vec!["data: x\n\n", "data: y\n\n", "data: z\n\n"],
            hold.clone(),
        )
        .await;
        hold.cancel();

        let mut client = StreamClient::new(url, ClientConfig::default());
        client.connect().await.unwrap();
        wait_closed(&client).await;

        assert_eq!(client.next_line().await.as_deref(), Some("z"));
        assert_eq!(client.next_line().await, None);
    }

    #[tokio::test]
    async fn test_request_head() {
        let hold = CancellationToken::new();
        let (url, head) = canned_server("200 OK", vec![], hold.clone()).await;

        let mut client = StreamClient::new(url, ClientConfig::default().method(reqwest::Method::POST));
        client.connect().await.unwrap();

        let head = head.await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("post /log http/1.1\r\n"));
        assert!(head.contains("accept: text/event-stream\r\n"));

        hold.cancel();
    }

    #[tokio::test]
    async fn test_unexpected_status() {
        let hold = CancellationToken::new();
        let (url, _) = canned_server("404 Not Found", vec![], hold.clone()).await;

        let mut client = StreamClient::new(url, ClientConfig::default());
        let result = client.connect().await;

        assert!(matches!(
            result,
            Err(Error::UnexpectedStatus(status)) if status == StatusCode::NOT_FOUND
        ));
        assert_eq!(client.state(), ClientState::Closed);
        assert_eq!(client.next_line().await, None);

        hold.cancel();
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let mut client = StreamClient::new(url, ClientConfig::default());
        assert!(matches!(client.connect().await, Err(Error::Request(_))));
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_connect_twice() {
        let hold = CancellationToken::new();
        let (url, _) = canned_server("200 OK", vec![], hold.clone()).await;

        let mut client = StreamClient::new(url, ClientConfig::default());
        client.connect().await.unwrap();
        assert!(matches!(client.connect().await, Err(Error::AlreadyConnected)));

        hold.cancel();
    }

    #[tokio::test]
    async fn test_output_sink() {
        let hold = CancellationToken::new();
        let (url, _) = canned_server("200 OK", vec!["data: a\n\n", "data: b\n\n"], hold.clone()).await;
        hold.cancel();

        let sink = SharedSink::default();
        let mut client = StreamClient::new(url, ClientConfig::default().append_newline());
        client.set_output(sink.clone());
        client.connect().await.unwrap();
        wait_closed(&client).await;

        assert_eq!(&*sink.0.lock(), b"a\nb\n");
    }

    #[tokio::test]
    async fn test_subscribe() {
        let hold = CancellationToken::new();
        let (url, _) = canned_server("200 OK", vec!["data: a\n\n", "data: b\n\n"], hold.clone()).await;
        hold.cancel();

        let mut client = StreamClient::new(url, ClientConfig::default());
        let mut lines = client.subscribe();
        client.connect().await.unwrap();

        assert_eq!(lines.recv().await.unwrap(), "a");
        assert_eq!(lines.recv().await.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_connect_sync_runs_until_end() {
        let hold = CancellationToken::new();
        let (url, _) = canned_server("200 OK", vec!["data: a\n\n", "data: b\n\n"], hold.clone()).await;
        hold.cancel();

        let sink = SharedSink::default();
        let mut client = StreamClient::new(url, ClientConfig::default().buffer_size(4));
        client.set_output(sink.clone());
        client.connect_sync().await.unwrap();

        assert_eq!(client.state(), ClientState::Closed);
        assert_eq!(&*sink.0.lock(), b"ab");
        assert_eq!(client.next_line().await.as_deref(), Some("a"));
        assert_eq!(client.next_line().await.as_deref(), Some("b"));
        assert_eq!(client.next_line().await, None);
    }

    #[tokio::test]
    async fn test_parent_cancellation() {
        let hold = CancellationToken::new();
        let (url, _) = canned_server("200 OK", vec!["data: a\n\n"], hold.clone()).await;

        let parent = CancellationToken::new();
        let mut client = StreamClient::with_cancellation(url, ClientConfig::default(), &parent);
        client.connect().await.unwrap();
        assert_eq!(client.next_line().await.as_deref(), Some("a"));

        parent.cancel();
        assert_eq!(client.next_line().await, None);
        wait_closed(&client).await;

        hold.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_is_terminal() {
        let hold = CancellationToken::new();
        let (url, _) = canned_server("200 OK", vec![], hold.clone()).await;

        let mut client = StreamClient::new(url, ClientConfig::default().buffer_size(1));
        client.connect().await.unwrap();

        let waiter = client.cancellation_token();
        client.shutdown();
        waiter.cancelled().await;

        assert_eq!(client.next_line().await, None);
        wait_closed(&client).await;

        hold.cancel();
    }
}
