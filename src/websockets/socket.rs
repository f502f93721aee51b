use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure on the realtime channel. Always recovered locally by dropping
/// the affected connection, never surfaced to an HTTP caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
}

/// Minimal duplex transport seam: text frames in, text frames out.
#[async_trait]
pub trait SocketTransport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next text frame from the client, `None` once the peer is gone.
    async fn next_text(&mut self) -> Result<Option<String>, TransportError>;

    async fn close(&mut self);
}

#[async_trait]
impl SocketTransport for WebSocket {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn next_text(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Binary and ping/pong frames are not part of the protocol.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.send(Message::Close(None)).await;
    }
}

/// Callback for frames the client sends upstream.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn on_message(&self, room_id: &str, voter_id: &str, text: String);
}

/// One participant's live connection: pumps broadcaster output to the
/// socket and hands inbound frames to the [`InboundHandler`], until either
/// side goes away.
pub struct Connection {
    room_id: String,
    voter_id: String,
    transport: Box<dyn SocketTransport>,
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: Arc<dyn InboundHandler>,
}

impl Connection {
    pub fn new(
        room_id: String,
        voter_id: String,
        transport: Box<dyn SocketTransport>,
        outbound: mpsc::UnboundedReceiver<String>,
        inbound: Arc<dyn InboundHandler>,
    ) -> Self {
        Self {
            room_id,
            voter_id,
            transport,
            outbound,
            inbound,
        }
    }

    /// Drives the connection until the outbound channel closes (the voter
    /// was replaced or the room dropped) or the client disconnects.
    pub async fn run(mut self) -> Result<(), TransportError> {
        let result = loop {
            tokio::select! {
                queued = self.outbound.recv() => {
                    match queued {
                        Some(message) => {
                            if let Err(e) = self.transport.send_text(message).await {
                                break Err(e);
                            }
                        }
                        // Sender dropped from the registry.
                        None => break Ok(()),
                    }
                }
                frame = self.transport.next_text() => {
                    match frame {
                        Ok(Some(text)) => {
                            self.inbound
                                .on_message(&self.room_id, &self.voter_id, text)
                                .await;
                        }
                        Ok(None) => break Ok(()),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        self.transport.close().await;
        result
    }
}
