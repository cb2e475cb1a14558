use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures::SinkExt;
use futures::stream::SplitSink;
use tokio::sync::Mutex;
use tracing::debug;

use meetbridge_core::ServerEvent;

/// Serializes all outbound frames for one session.
///
/// The socket loop, the STT pump and every background task share this sender;
/// the async mutex guarantees frames from concurrent producers are never
/// interleaved. Once the session begins closing, every further send is
/// silently dropped, and a write failure itself marks the session closing.
pub struct SessionSender {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    closing: AtomicBool,
}

impl SessionSender {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            closing: AtomicBool::new(false),
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn begin_close(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub async fn send(&self, event: &ServerEvent) {
        if self.is_closing() {
            return;
        }
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(error) => {
                debug!(%error, "Failed to serialize outbound event");
                return;
            }
        };
        let mut sink = self.sink.lock().await;
        if let Err(error) = sink.send(Message::text(text)).await {
            debug!(%error, "WebSocket send failed");
            self.begin_close();
        }
    }

    pub async fn pong(&self, data: axum::body::Bytes) {
        if self.is_closing() {
            return;
        }
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Pong(data)).await;
    }

    /// Sends the close frame. Callers mark the session closing first; the
    /// frame itself is best-effort.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
    }
}
