//! Translates inbound protocol events into session operations.

use crate::dispatch::OutboundSink;
use crate::session::{AttachOutcome, SessionManager};
use chrono::Utc;
use jaby_core::fact::{Answer, Fact, Message};
use jaby_core::protocol::{Audience, Delivery, InboundEvent, OutboundEvent, Usage};
use jaby_core::repository::ContextRepository;
use jaby_core::user::UserProfile;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Routes events from live connections into the session manager.
///
/// The router holds no session state of its own. Malformed events and
/// downstream failures are logged and dropped.
pub struct EventRouter {
    sessions: Arc<SessionManager>,
    outbound: Arc<dyn OutboundSink>,
    context: Arc<dyn ContextRepository>,
    context_ttl: Duration,
    started_at: Instant,
}

impl EventRouter {
    pub fn new(
        sessions: Arc<SessionManager>,
        outbound: Arc<dyn OutboundSink>,
        context: Arc<dyn ContextRepository>,
        context_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            outbound,
            context,
            context_ttl,
            started_at: Instant::now(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Parses a `(name, payload)` pair from the wire and handles it.
    pub async fn handle_wire(
        &self,
        connection_id: &str,
        user: &UserProfile,
        name: &str,
        payload: Value,
    ) {
        match InboundEvent::from_wire(name, payload) {
            Ok(event) => self.handle(connection_id, user, event).await,
            Err(e) => {
                tracing::warn!(user_id = %user.id, connection_id, event = name, error = %e, "dropping malformed event");
            }
        }
    }

    pub async fn handle(&self, connection_id: &str, user: &UserProfile, event: InboundEvent) {
        tracing::debug!(user_id = %user.id, connection_id, event = event.name(), "inbound event");

        match event {
            InboundEvent::Start => self.start(connection_id, user).await,
            InboundEvent::Message { message } => {
                let fact = Fact::Message(Message::new(message));
                self.sessions.assert_fact(&user.id, Some(fact), true).await;
            }
            InboundEvent::Answer { question, answer } => {
                let fact = Fact::Answer(Answer::new(question, answer));
                self.sessions.assert_fact(&user.id, Some(fact), true).await;
            }
            InboundEvent::Status { ttl, context } => {
                if ttl.is_some_and(|ttl| ttl <= Utc::now()) {
                    tracing::debug!(user_id = %user.id, connection_id, "status with expired ttl ignored");
                    return;
                }
                self.status(connection_id, user, context).await;
            }
            InboundEvent::Disconnect => {
                let outcome = self.sessions.detach(&user.id, connection_id).await;
                tracing::debug!(user_id = %user.id, connection_id, ?outcome, "connection detached");
            }
        }
    }

    async fn start(&self, connection_id: &str, user: &UserProfile) {
        let outcome = self.sessions.attach(user, connection_id).await;
        if let AttachOutcome::Degraded { reason } = &outcome {
            tracing::warn!(user_id = %user.id, connection_id, %reason, "connection has no session");
        }

        match self.context.purge_expired(&user.id).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(user_id = %user.id, removed, "expired context purged"),
            Err(e) => tracing::warn!(user_id = %user.id, error = %e, "failed to purge context"),
        }
    }

    async fn status(&self, connection_id: &str, user: &UserProfile, context: Map<String, Value>) {
        if let Err(e) = self
            .context
            .save_context(&user.id, context, self.context_ttl)
            .await
        {
            tracing::warn!(user_id = %user.id, connection_id, error = %e, "failed to store context");
        }

        let usage = self.usage().await;
        let delivery = Delivery::new(
            Audience::Connection(connection_id.to_string()),
            OutboundEvent::online(Some(usage)),
        );
        self.outbound.deliver(&delivery).await;
    }

    /// Process usage as reported in the liveness echo.
    pub async fn usage(&self) -> Usage {
        Usage {
            pid: std::process::id(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            sessions: self.sessions.live_sessions().await,
            connections: self.sessions.registry().total_connections().await,
        }
    }

    /// Pushes `event` to every live connection.
    pub async fn broadcast(&self, event: OutboundEvent) -> usize {
        self.outbound
            .deliver(&Delivery::new(Audience::Everyone, event))
            .await
    }

    /// Detaches every registered connection so that sessions are saved.
    /// Returns the number of connections detached.
    pub async fn disconnect_all(&self) -> usize {
        let connections = self.sessions.registry().snapshot().await;
        let count = connections.len();
        for (user_id, connection_id) in connections {
            self.sessions.detach(&user_id, &connection_id).await;
        }
        if count > 0 {
            tracing::info!(count, "all connections disconnected");
        }
        count
    }
}
