//! Persistence contracts for per-user facts and short-lived context.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::Result;
use crate::fact::FactRecord;

/// Durable store for a user's persistable facts.
#[async_trait]
pub trait FactRepository: Send + Sync {
    /// Loads every stored fact record for `user_id`.
    ///
    /// A user with nothing stored yields an empty list, not an error.
    async fn load_facts(&self, user_id: &str) -> Result<Vec<FactRecord>>;

    /// Replaces the stored fact records for `user_id`.
    async fn save_facts(&self, user_id: &str, facts: &[FactRecord]) -> Result<()>;
}

/// One timestamped context blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub when: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl ContextEntry {
    /// Creates an entry stamped at `when` that lives for `ttl`.
    pub fn new(when: DateTime<Utc>, ttl: Duration, context: Map<String, Value>) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| when.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            when,
            expires_at,
            context,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Store for short-lived liveness context with expiry.
#[async_trait]
pub trait ContextRepository: Send + Sync {
    /// Stores `context` for `user_id`, expiring after `ttl`.
    async fn save_context(
        &self,
        user_id: &str,
        context: Map<String, Value>,
        ttl: Duration,
    ) -> Result<ContextEntry>;

    /// Live (unexpired) entries for `user_id`, oldest first.
    async fn load_context(&self, user_id: &str) -> Result<Vec<ContextEntry>>;

    /// Drops expired entries for `user_id` and returns how many were removed.
    async fn purge_expired(&self, user_id: &str) -> Result<usize>;
}
