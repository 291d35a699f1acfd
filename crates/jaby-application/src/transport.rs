//! Transport boundary: how outbound events reach a live connection.

use async_trait::async_trait;
use jaby_core::protocol::OutboundEvent;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection closed between lookup and send.
    #[error("connection '{0}' is gone")]
    Disconnected(String),

    #[error("send to '{connection_id}' failed: {message}")]
    Failed {
        connection_id: String,
        message: String,
    },
}

/// Pushes outbound events to one connection.
#[async_trait]
pub trait ConnectionTransport: Send + Sync {
    async fn send(&self, connection_id: &str, event: &OutboundEvent) -> Result<(), TransportError>;
}

/// In-process transport with one unbounded channel per connection.
#[derive(Debug, Default)]
pub struct ChannelTransport {
    senders: RwLock<HashMap<String, mpsc::UnboundedSender<OutboundEvent>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or reopens) a connection and returns its receiving end.
    pub fn open(&self, connection_id: impl Into<String>) -> mpsc::UnboundedReceiver<OutboundEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(connection_id.into(), tx);
        rx
    }

    /// Forgets a connection. Later sends to it report `Disconnected`.
    pub fn close(&self, connection_id: &str) -> bool {
        self.senders
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(connection_id)
            .is_some()
    }

    pub fn is_open(&self, connection_id: &str) -> bool {
        self.senders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(connection_id)
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[async_trait]
impl ConnectionTransport for ChannelTransport {
    async fn send(&self, connection_id: &str, event: &OutboundEvent) -> Result<(), TransportError> {
        let sender = self
            .senders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(connection_id)
            .cloned()
            .ok_or_else(|| TransportError::Disconnected(connection_id.to_string()))?;

        sender
            .send(event.clone())
            .map_err(|_| TransportError::Disconnected(connection_id.to_string()))
    }
}
