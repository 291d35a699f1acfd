//! Directory-backed `ContextRepository` with expiry.

use crate::paths::{JabyPaths, file_stem_for};
use crate::storage::AtomicJsonFile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jaby_core::error::{JabyError, Result};
use jaby_core::repository::{ContextEntry, ContextRepository};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

/// Stores each user's context entries as a JSON array under
/// `data_dir/context/<user>.json`. Expired entries are dropped on every
/// write and by [`ContextRepository::purge_expired`].
pub struct DirContextRepository {
    context_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl DirContextRepository {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            context_dir: JabyPaths::context_dir(data_dir.as_ref()),
            write_lock: Mutex::new(()),
        }
    }

    fn document(&self, user_id: &str) -> AtomicJsonFile<Vec<ContextEntry>> {
        AtomicJsonFile::new(
            self.context_dir
                .join(format!("{}.json", file_stem_for(user_id))),
        )
    }

    async fn read_entries(&self, user_id: &str) -> Result<Vec<ContextEntry>> {
        self.document(user_id)
            .load()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| JabyError::data_access(format!("{:#}", e)))
    }

    async fn write_entries(&self, user_id: &str, entries: &[ContextEntry]) -> Result<()> {
        let document = self.document(user_id);
        let written = if entries.is_empty() {
            document.remove().await
        } else {
            document.save(&entries.to_vec()).await
        };
        written.map_err(|e| JabyError::data_access(format!("{:#}", e)))
    }

    fn split_live(
        entries: Vec<ContextEntry>,
        now: DateTime<Utc>,
    ) -> (Vec<ContextEntry>, usize) {
        let total = entries.len();
        let live: Vec<ContextEntry> = entries
            .into_iter()
            .filter(|entry| !entry.is_expired(now))
            .collect();
        let expired = total - live.len();
        (live, expired)
    }
}

#[async_trait]
impl ContextRepository for DirContextRepository {
    async fn save_context(
        &self,
        user_id: &str,
        context: Map<String, Value>,
        ttl: Duration,
    ) -> Result<ContextEntry> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let (mut entries, _) = Self::split_live(self.read_entries(user_id).await?, now);

        let entry = ContextEntry::new(now, ttl, context);
        entries.push(entry.clone());
        self.write_entries(user_id, &entries).await?;
        Ok(entry)
    }

    async fn load_context(&self, user_id: &str) -> Result<Vec<ContextEntry>> {
        let (live, _) = Self::split_live(self.read_entries(user_id).await?, Utc::now());
        Ok(live)
    }

    async fn purge_expired(&self, user_id: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let (live, expired) = Self::split_live(self.read_entries(user_id).await?, Utc::now());
        if expired > 0 {
            self.write_entries(user_id, &live).await?;
            tracing::debug!(user_id, expired, "expired context purged");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn context(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load_context() {
        let temp_dir = TempDir::new().unwrap();
        let repo = DirContextRepository::new(temp_dir.path());

        let saved = repo
            .save_context("u1", context(json!({"battery": 80})), Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(saved.expires_at > saved.when);

        let loaded = repo.load_context("u1").await.unwrap();
        assert_eq!(loaded, vec![saved]);
        assert_eq!(loaded[0].context["battery"], 80);
    }

    #[tokio::test]
    async fn test_expired_entries_are_hidden_and_purged() {
        let temp_dir = TempDir::new().unwrap();
        let repo = DirContextRepository::new(temp_dir.path());

        repo.save_context("u1", Map::new(), Duration::ZERO)
            .await
            .unwrap();
        assert!(repo.load_context("u1").await.unwrap().is_empty());

        assert_eq!(repo.purge_expired("u1").await.unwrap(), 1);
        assert_eq!(repo.purge_expired("u1").await.unwrap(), 0);
        assert!(!temp_dir.path().join("context/u1.json").exists());
    }

    #[tokio::test]
    async fn test_write_drops_expired_entries() {
        let temp_dir = TempDir::new().unwrap();
        let repo = DirContextRepository::new(temp_dir.path());

        repo.save_context("u1", context(json!({"n": 1})), Duration::ZERO)
            .await
            .unwrap();
        repo.save_context("u1", context(json!({"n": 2})), Duration::from_secs(60))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(temp_dir.path().join("context/u1.json")).unwrap();
        let stored: Vec<ContextEntry> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].context["n"], 2);
    }
}
