//! Outbound fan-out: resolve an audience to live connections and push.

use crate::connection_registry::ConnectionRegistry;
use crate::transport::{ConnectionTransport, TransportError};
use async_trait::async_trait;
use futures::future::join_all;
use jaby_core::protocol::{Audience, Delivery};
use std::sync::Arc;

/// Where rule actions and the router hand outbound deliveries.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    /// Delivers to every live connection of the audience and returns how many
    /// connections received the event.
    async fn deliver(&self, delivery: &Delivery) -> usize;
}

/// Fans deliveries out through the connection registry and a transport.
pub struct Fanout {
    registry: Arc<ConnectionRegistry>,
    transport: Arc<dyn ConnectionTransport>,
}

impl Fanout {
    pub fn new(registry: Arc<ConnectionRegistry>, transport: Arc<dyn ConnectionTransport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    async fn resolve(&self, audience: &Audience) -> Vec<String> {
        match audience {
            Audience::Connection(connection_id) => vec![connection_id.clone()],
            Audience::User(user_id) => self.registry.connections_of(user_id).await,
            Audience::Everyone => self.registry.all_connections().await,
        }
    }
}

#[async_trait]
impl OutboundSink for Fanout {
    async fn deliver(&self, delivery: &Delivery) -> usize {
        let targets = self.resolve(&delivery.audience).await;
        let event = &delivery.event;

        let results = join_all(targets.iter().map(|connection_id| async move {
            (connection_id, self.transport.send(connection_id, event).await)
        }))
        .await;

        let mut delivered = 0;
        for (connection_id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(TransportError::Disconnected(_)) => {
                    tracing::debug!(connection_id, event = event.name(), "stale connection skipped");
                }
                Err(e) => {
                    tracing::warn!(connection_id, event = event.name(), error = %e, "delivery failed");
                }
            }
        }
        delivered
    }
}
