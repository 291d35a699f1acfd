//! Which live connections belong to which user.

use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Connections {
    by_user: HashMap<String, BTreeSet<String>>,
    owner: HashMap<String, String>,
}

/// Tracks live connection ids per user id.
///
/// A connection belongs to exactly one user; adding it under a different
/// user moves it.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Connections>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connection_id` for `user_id`. Returns `false` if it was
    /// already registered for that user.
    pub async fn add(&self, user_id: &str, connection_id: &str) -> bool {
        let mut inner = self.inner.write().await;

        if let Some(previous) = inner.owner.get(connection_id).cloned() {
            if previous == user_id {
                return false;
            }
            tracing::warn!(
                connection_id,
                from = %previous,
                to = user_id,
                "connection re-registered under another user"
            );
            Self::detach_from(&mut inner, &previous, connection_id);
        }

        inner
            .owner
            .insert(connection_id.to_string(), user_id.to_string());
        inner
            .by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(connection_id.to_string())
    }

    /// Removes `connection_id` from `user_id`. Returns `false` if it was not
    /// registered for that user.
    pub async fn remove(&self, user_id: &str, connection_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner.owner.get(connection_id).map(String::as_str) != Some(user_id) {
            return false;
        }
        inner.owner.remove(connection_id);
        Self::detach_from(&mut inner, user_id, connection_id)
    }

    pub async fn connections_of(&self, user_id: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .by_user
            .get(user_id)
            .map(|connections| connections.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self, user_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner.by_user.get(user_id).map_or(0, BTreeSet::len)
    }

    pub async fn has_connections(&self, user_id: &str) -> bool {
        self.connection_count(user_id).await > 0
    }

    pub async fn user_of(&self, connection_id: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner.owner.get(connection_id).cloned()
    }

    /// Every live connection across all users.
    pub async fn all_connections(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut all: Vec<String> = inner.owner.keys().cloned().collect();
        all.sort();
        all
    }

    pub async fn total_connections(&self) -> usize {
        self.inner.read().await.owner.len()
    }

    /// Every live `(user_id, connection_id)` pair.
    pub async fn snapshot(&self) -> Vec<(String, String)> {
        let inner = self.inner.read().await;
        let mut pairs: Vec<(String, String)> = inner
            .owner
            .iter()
            .map(|(connection, user)| (user.clone(), connection.clone()))
            .collect();
        pairs.sort();
        pairs
    }

    fn detach_from(inner: &mut Connections, user_id: &str, connection_id: &str) -> bool {
        let Some(connections) = inner.by_user.get_mut(user_id) else {
            return false;
        };
        let removed = connections.remove(connection_id);
        if connections.is_empty() {
            inner.by_user.remove(user_id);
        }
        removed
    }
}
