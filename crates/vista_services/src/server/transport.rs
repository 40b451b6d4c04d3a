//! Transport Layer
//!
//! Frame-level byte transport under the scene server protocol. The
//! WebSocket implementation talks to a real server; [`MemoryTransport`]
//! pairs two endpoints inside one process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use vista_core::SceneError;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout")]
    Timeout,
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

impl From<TransportError> for SceneError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::InvalidUrl(msg) => SceneError::invalid(msg),
            TransportError::Timeout => SceneError::Timeout("transport".to_string()),
            other => SceneError::ConnectionFailure(other.to_string()),
        }
    }
}

/// Abstract transport for whole-frame messages
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame
    async fn send(&mut self, data: &[u8]) -> TransportResult<()>;

    /// Wait for the next frame
    async fn receive(&mut self) -> TransportResult<Vec<u8>>;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;

    /// Close the transport
    async fn close(&mut self) -> TransportResult<()>;

    /// Get transport statistics
    fn stats(&self) -> TransportStats;
}

/// Transport statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub send_errors: u64,
    pub receive_errors: u64,
}

impl TransportStats {
    fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.messages_sent += 1;
    }

    fn record_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
        self.messages_received += 1;
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport
///
/// Frames are sent as text since the protocol is JSON. Incoming text and
/// binary frames are both accepted.
pub struct WebSocketTransport {
    write: Option<futures_util::stream::SplitSink<WsStream, Message>>,
    receiver: mpsc::UnboundedReceiver<TransportResult<Vec<u8>>>,
    stats: Arc<Mutex<TransportStats>>,
    connected: Arc<AtomicBool>,
}

impl WebSocketTransport {
    /// Connect to a WebSocket server
    pub async fn connect(url: &str) -> TransportResult<Self> {
        let parsed = url::Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        log::debug!("Connecting to WebSocket: {}", url);
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        log::debug!("WebSocket connection established");

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Mutex::new(TransportStats::default()));
        let connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::read_loop(read, tx, stats.clone(), connected.clone()));

        Ok(Self {
            write: Some(write),
            receiver: rx,
            stats,
            connected,
        })
    }

    /// Background read loop
    async fn read_loop(
        mut read: futures_util::stream::SplitStream<WsStream>,
        tx: mpsc::UnboundedSender<TransportResult<Vec<u8>>>,
        stats: Arc<Mutex<TransportStats>>,
        connected: Arc<AtomicBool>,
    ) {
        loop {
            let data = match read.next().await {
                Some(Ok(Message::Binary(data))) => data,
                Some(Ok(Message::Text(text))) => text.into_bytes(),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    connected.store(false, Ordering::SeqCst);
                    let _ = tx.send(Err(TransportError::Closed));
                    break;
                }
                Some(Err(e)) => {
                    stats.lock().receive_errors += 1;
                    connected.store(false, Ordering::SeqCst);
                    let _ = tx.send(Err(TransportError::ReceiveFailed(e.to_string())));
                    break;
                }
            };
            stats.lock().record_received(data.len());
            if tx.send(Ok(data)).is_err() {
                break;
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        let write = self.write.as_mut().ok_or(TransportError::Closed)?;

        let message = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_string()),
            Err(_) => Message::Binary(data.to_vec()),
        };
        if let Err(e) = write.send(message).await {
            self.stats.lock().send_errors += 1;
            return Err(TransportError::SendFailed(e.to_string()));
        }

        self.stats.lock().record_sent(data.len());
        Ok(())
    }

    async fn receive(&mut self) -> TransportResult<Vec<u8>> {
        self.receiver.recv().await.ok_or(TransportError::Closed)?
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> TransportResult<()> {
        if let Some(mut write) = self.write.take() {
            let _ = write.send(Message::Close(None)).await;
            let _ = write.close().await;
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.stats.lock().clone()
    }
}

/// One end of an in-process transport pair
pub struct MemoryTransport {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    stats: Mutex<TransportStats>,
}

impl MemoryTransport {
    /// Create two connected endpoints
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a = Self {
            tx: Some(a_tx),
            rx: a_rx,
            stats: Mutex::new(TransportStats::default()),
        };
        let b = Self {
            tx: Some(b_tx),
            rx: b_rx,
            stats: Mutex::new(TransportStats::default()),
        };
        (a, b)
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        if tx.send(data.to_vec()).is_err() {
            self.stats.lock().send_errors += 1;
            return Err(TransportError::Closed);
        }
        self.stats.lock().record_sent(data.len());
        Ok(())
    }

    async fn receive(&mut self) -> TransportResult<Vec<u8>> {
        let data = self.rx.recv().await.ok_or(TransportError::Closed)?;
        self.stats.lock().record_received(data.len());
        Ok(data)
    }

    fn is_connected(&self) -> bool {
        self.tx.as_ref().map(|tx| !tx.is_closed()).unwrap_or(false)
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.stats.lock().clone()
    }
}
