//! Event stream server
//!
//! Handles the TCP accept loop and spawns one hyper HTTP/1 connection task
//! per client.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::config::ServerConfig;
use super::http::{text_response, FrameBody, HttpRequest, HttpResponse};
use crate::error::Result;
use crate::hub::Hub;

/// HTTP server exposing a hub as an event stream
pub struct HubServer {
    config: ServerConfig,
    hub: Hub,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl HubServer {
    /// Create a new server for a hub
    pub fn new(config: ServerConfig, hub: Hub) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            hub,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// The hub behind this server
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// Starts the hub and serves until an accept error bubbles up, which does
    /// not happen in practice: accept failures are logged and skipped.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server with graceful shutdown
    ///
    /// Once `shutdown` resolves the hub is shut down, which ends every open
    /// stream.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.serve_until(listener, std::future::pending()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            addr = %listener.local_addr()?,
            path = %self.config.path,
            "Event stream server listening"
        );

        self.hub.start();
        let connections = CancellationToken::new();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener, &connections) => result,
        };

        // Connections finish their current response, the hub ends the streams
        connections.cancel();
        self.hub.shutdown().await;

        result
    }

    async fn accept_loop(
        &self,
        listener: &TcpListener,
        connections: &CancellationToken,
    ) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr, connections.clone());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(
        &self,
        socket: TcpStream,
        peer_addr: SocketAddr,
        shutdown: CancellationToken,
    ) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            connection_id = connection_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = self.config.clone();
        let hub = self.hub.clone();

        tokio::spawn(async move {
            let _permit = permit;

            if let Err(e) = serve_connection(socket, config, hub, shutdown).await {
                tracing::debug!(
                    connection_id = connection_id,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(connection_id = connection_id, "Connection closed");
        });
    }
}

async fn serve_connection(
    socket: TcpStream,
    config: ServerConfig,
    hub: Hub,
    shutdown: CancellationToken,
) -> Result<()> {
    let path: Arc<str> = Arc::from(config.path.as_str());

    let service = service_fn(move |request: Request<Incoming>| {
        let hub = hub.clone();
        let path = Arc::clone(&path);
        async move { Ok::<_, Infallible>(route(request, &hub, &path).await) }
    });

    let connection = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(config.request_timeout)
        .serve_connection(TokioIo::new(socket), service);
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => result?,
        _ = shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            connection.await?;
        }
    }

    Ok(())
}

/// Answer one request
///
/// Stream requests run on their own task; the response head comes back as
/// soon as the hub writes or flushes for the first time.
async fn route(request: Request<Incoming>, hub: &Hub, path: &str) -> Response<FrameBody> {
    if request.uri().path() != path {
        return text_response(StatusCode::NOT_FOUND, "not found");
    }

    let disconnected = CancellationToken::new();
    let stream_request = HttpRequest::new(&request, disconnected.clone());
    let (mut response, head) = HttpResponse::new(disconnected.drop_guard());

    let hub = hub.clone();
    tokio::spawn(async move {
        // Write errors mean the client left; the hub already logged them
        let _ = hub.handle(&stream_request, &mut response).await;
        let _ = response.finish();
    });

    match head.await {
        Ok(response) => response,
        Err(_) => text_response(StatusCode::INTERNAL_SERVER_ERROR, "stream handler failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::client::{ClientConfig, StreamClient};
    use crate::error::Error;
    use crate::hub::HubConfig;
    use crate::protocol::EVENT_STREAM;

    struct TestServer {
        url: String,
        hub: Hub,
        stop: CancellationToken,
        task: tokio::task::JoinHandle<Result<()>>,
    }

    async fn start_server(hub_config: HubConfig, config: ServerConfig) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}{}", listener.local_addr().unwrap(), config.path);

        let hub = Hub::new(hub_config);
        let server = HubServer::new(config, hub.clone());
        let stop = CancellationToken::new();
        let shutdown = stop.clone().cancelled_owned();
        let task = tokio::spawn(async move { server.serve_until(listener, shutdown).await });

        TestServer {
            url,
            hub,
            stop,
            task,
        }
    }

    async fn next(client: &mut StreamClient) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), client.next_line())
            .await
            .expect("no line in time")
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn quiet() -> HubConfig {
        HubConfig::default().disable_keep_alive()
    }

    #[tokio::test]
    async fn test_stream_to_receiver() {
        let server = start_server(quiet(), ServerConfig::default().path("/log")).await;

        let mut client = StreamClient::new(&server.url, ClientConfig::default().buffer_size(10));
        client.connect().await.unwrap();
        wait_until(|| server.hub.subscriber_count() == 1).await;

        server.hub.send("one").await;
        server.hub.send("two").await;

        assert_eq!(next(&mut client).await.as_deref(), Some("one"));
        assert_eq!(next(&mut client).await.as_deref(), Some("two"));

        server.stop.cancel();
        server.task.await.unwrap().unwrap();

        // Hub shutdown ends the stream, which ends the receiver
        assert_eq!(next(&mut client).await, None);
    }

    #[tokio::test]
    async fn test_receiver_gets_retained_history() {
        let server = start_server(quiet().retention(2), ServerConfig::default()).await;

        for text in ["a", "b", "c"] {
            server.hub.send(text).await;
        }
        wait_until(|| server.hub.stats().broadcast == 3).await;

        let mut client = StreamClient::new(&server.url, ClientConfig::default().buffer_size(10));
        client.connect().await.unwrap();

        assert_eq!(next(&mut client).await.as_deref(), Some("b"));
        assert_eq!(next(&mut client).await.as_deref(), Some("c"));

        server.stop.cancel();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_receiver_disconnect_unregisters() {
        // Keep-alive writes surface the closed socket even on an idle stream
        let config = HubConfig::default().keep_alive(Duration::from_millis(50));
        let server = start_server(config, ServerConfig::default()).await;

        let mut client = StreamClient::new(&server.url, ClientConfig::default());
        client.connect().await.unwrap();
        wait_until(|| server.hub.subscriber_count() == 1).await;

        client.shutdown();
        wait_until(|| server.hub.subscriber_count() == 0).await;

        server.stop.cancel();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_plain_request_gets_page() {
        let server = start_server(quiet(), ServerConfig::default().path("/log")).await;

        let response = reqwest::get(&server.url).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body = response.text().await.unwrap();
        assert!(body.contains("new EventSource('/log')"));

        server.stop.cancel();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_plain_request_rejected() {
        let server = start_server(quiet().disable_page(), ServerConfig::default()).await;

        let response = reqwest::get(&server.url).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        server.stop.cancel();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let server = start_server(quiet(), ServerConfig::default().path("/log")).await;
        let url = server.url.replace("/log", "/other");

        let response = reqwest::Client::new()
            .get(&url)
            .header(reqwest::header::ACCEPT, EVENT_STREAM)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

        let mut client = StreamClient::new(&url, ClientConfig::default());
        assert!(matches!(
            client.connect().await,
            Err(Error::UnexpectedStatus(status)) if status == reqwest::StatusCode::NOT_FOUND
        ));

        server.stop.cancel();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let server = start_server(quiet(), ServerConfig::default().max_connections(1)).await;

        let mut first = StreamClient::new(&server.url, ClientConfig::default());
        first.connect().await.unwrap();
        wait_until(|| server.hub.subscriber_count() == 1).await;

        // The second connection is dropped before a response is written
        let mut second = StreamClient::new(&server.url, ClientConfig::default());
        assert!(matches!(second.connect().await, Err(Error::Request(_))));

        server.stop.cancel();
        server.task.await.unwrap().unwrap();
    }

    async fn raw_exchange(url: &str, request: &str) -> String {
        let addr = url.trim_start_matches("http://");
        let addr = &addr[..addr.find('/').unwrap_or(addr.len())];

        let mut socket = TcpStream::connect(addr).await.unwrap();
        socket.write_all(request.as_bytes()).await.unwrap();

        let mut raw = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), socket.read_to_end(&mut raw))
            .await
            .expect("response not closed in time")
            .unwrap();
        String::from_utf8(raw).unwrap()
    }

    #[tokio::test]
    async fn test_http10_client_gets_unchunked_body() {
        let server = start_server(quiet().disable_page(), ServerConfig::default()).await;

        let response = raw_exchange(
            &server.url,
            "GET / HTTP/1.0\r\nAccept: text/plain\r\n\r\n",
        )
        .await;
        let lowered = response.to_ascii_lowercase();

        assert!(lowered.contains(" 400 bad request\r\n"));
        assert!(!lowered.contains("transfer-encoding"));
        assert!(response.ends_with("\r\n\r\ncannot handle plain request"));

        server.stop.cancel();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_malformed_request_rejected() {
        let server = start_server(quiet(), ServerConfig::default()).await;

        let response = raw_exchange(&server.url, "NOT HTTP AT ALL\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 400"));
        assert_eq!(server.hub.subscriber_count(), 0);

        server.stop.cancel();
        server.task.await.unwrap().unwrap();
    }
}
