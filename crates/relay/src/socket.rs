//! Secondary duplex transport: a single WebSocket that carries the same
//! payloads as the vibration topic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

const MANUAL_DISCONNECT: &str = "Manual disconnect";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Connected,
    Message(Vec<u8>),
    Disconnected(String),
    Error(String),
}

/// Opening and closing of the secondary socket, as driven by control messages.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    /// Replaces any open connection with one to `url`.
    async fn open(&self, url: &str);

    async fn close(&self);
}

struct Connection {
    url: String,
    close_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    // Set before the final event goes out
    ended: Arc<AtomicBool>,
}

impl Connection {
    async fn shutdown(self) {
        let _ = self.close_tx.send(());
        if let Err(err) = self.handle.await {
            warn!(?err, url = %self.url, "WebSocket task ended abnormally");
        }
    }
}

#[derive(Clone)]
pub struct SocketManager {
    current: Arc<Mutex<Option<Connection>>>,
    events_tx: broadcast::Sender<SocketEvent>,
}

impl Default for SocketManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketManager {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self { current: Arc::new(Mutex::new(None)), events_tx }
    }

    pub fn events(&self) -> broadcast::Receiver<SocketEvent> {
        self.events_tx.subscribe()
    }

    /// URL of the live connection; a connection the peer closed or that failed
    /// is released here.
    pub async fn current_url(&self) -> Option<String> {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|c| c.ended.load(Ordering::Acquire)) {
            *current = None;
        }
        current.as_ref().map(|c| c.url.clone())
    }
}

#[async_trait]
impl SocketTransport for SocketManager {
    async fn open(&self, url: &str) {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            debug!(url = %previous.url, "Closing previous WebSocket before reconnecting");
            previous.shutdown().await;
        }
        info!(%url, "Opening WebSocket");
        let (close_tx, close_rx) = oneshot::channel();
        let ended = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_socket(url.to_string(), self.events_tx.clone(), close_rx, ended.clone()));
        *current = Some(Connection { url: url.to_string(), close_tx, handle, ended });
    }

    async fn close(&self) {
        let connection = self.current.lock().await.take();
        match connection {
            Some(connection) => connection.shutdown().await,
            None => debug!("No WebSocket open"),
        }
    }
}

async fn run_socket(
    url: String,
    events: broadcast::Sender<SocketEvent>,
    close_rx: oneshot::Receiver<()>,
    ended: Arc<AtomicBool>,
) {
    let last = drive_socket(&url, &events, close_rx).await;
    ended.store(true, Ordering::Release);
    let _ = events.send(last);
}

/// Runs one connection until it ends and returns the event describing the end.
async fn drive_socket(
    url: &str,
    events: &broadcast::Sender<SocketEvent>,
    mut close_rx: oneshot::Receiver<()>,
) -> SocketEvent {
    let stream = tokio::select! {
        result = connect_async(url) => match result {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!(error = %e, %url, "WebSocket connect failed");
                return SocketEvent::Error(e.to_string());
            }
        },
        _ = &mut close_rx => return SocketEvent::Disconnected(MANUAL_DISCONNECT.to_string()),
    };

    info!(%url, "WebSocket connected");
    let _ = events.send(SocketEvent::Connected);
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                let frame = CloseFrame { code: CloseCode::Normal, reason: MANUAL_DISCONNECT.into() };
                match timeout(Duration::from_secs(2), write.send(Message::Close(Some(frame)))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(error = %e, "WebSocket close frame not sent"),
                    Err(_) => debug!("Timed out sending WebSocket close frame"),
                }
                info!(%url, "WebSocket disconnected");
                return SocketEvent::Disconnected(MANUAL_DISCONNECT.to_string());
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(SocketEvent::Message(text.into_bytes()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let _ = events.send(SocketEvent::Message(bytes));
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                    info!(%url, %reason, "WebSocket closed by peer");
                    return SocketEvent::Disconnected(format!("Closed: {}", reason));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, %url, "WebSocket error");
                    return SocketEvent::Error(e.to_string());
                }
                None => return SocketEvent::Disconnected("Closed".to_string()),
            }
        }
    }
}
