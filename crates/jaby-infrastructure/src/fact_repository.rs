//! Directory-backed `FactRepository`.

use crate::paths::{JabyPaths, file_stem_for};
use crate::storage::AtomicJsonFile;
use async_trait::async_trait;
use jaby_core::error::{JabyError, Result};
use jaby_core::fact::FactRecord;
use jaby_core::repository::FactRepository;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// The per-user document: `{ "_id": user, "facts": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactDocument {
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(default)]
    pub facts: Vec<FactRecord>,
}

/// Stores one JSON document per user.
///
/// Directory structure:
/// ```text
/// data_dir/
/// └── facts/
///     ├── user-1.json
///     └── user-2.json
/// ```
pub struct DirFactRepository {
    facts_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl DirFactRepository {
    /// Creates a repository rooted at `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            facts_dir: JabyPaths::facts_dir(data_dir.as_ref()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn facts_dir(&self) -> &Path {
        &self.facts_dir
    }

    fn document(&self, user_id: &str) -> AtomicJsonFile<FactDocument> {
        AtomicJsonFile::new(
            self.facts_dir
                .join(format!("{}.json", file_stem_for(user_id))),
        )
    }
}

#[async_trait]
impl FactRepository for DirFactRepository {
    async fn load_facts(&self, user_id: &str) -> Result<Vec<FactRecord>> {
        let document = self
            .document(user_id)
            .load()
            .await
            .map_err(|e| JabyError::data_access(format!("{:#}", e)))?;

        match document {
            Some(document) if document.user_id != user_id => Err(JabyError::data_access(format!(
                "fact document for '{}' belongs to '{}'",
                user_id, document.user_id
            ))),
            Some(document) => Ok(document.facts),
            None => Ok(Vec::new()),
        }
    }

    async fn save_facts(&self, user_id: &str, facts: &[FactRecord]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let document = FactDocument {
            user_id: user_id.to_string(),
            facts: facts.to_vec(),
        };
        self.document(user_id)
            .save(&document)
            .await
            .map_err(|e| JabyError::data_access(format!("{:#}", e)))?;
        tracing::debug!(user_id, count = facts.len(), "facts saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jaby_core::fact::{Fact, Knowledge};
    use tempfile::TempDir;

    fn knowledge_record(kind: &str) -> FactRecord {
        Fact::Knowledge(Knowledge::new(kind).with_field("score", 3))
            .to_record()
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_facts() {
        let temp_dir = TempDir::new().unwrap();
        let repo = DirFactRepository::new(temp_dir.path());
        assert!(repo.load_facts("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let repo = DirFactRepository::new(temp_dir.path());
        let records = vec![knowledge_record("a"), knowledge_record("b")];

        repo.save_facts("u1", &records).await.unwrap();
        assert_eq!(repo.load_facts("u1").await.unwrap(), records);

        let raw = std::fs::read_to_string(temp_dir.path().join("facts/u1.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["_id"], "u1");
        assert_eq!(value["facts"][0]["type"], "Knowledge");
    }

    #[tokio::test]
    async fn test_save_replaces_previous_document() {
        let temp_dir = TempDir::new().unwrap();
        let repo = DirFactRepository::new(temp_dir.path());

        repo.save_facts("u1", &[knowledge_record("a"), knowledge_record("b")])
            .await
            .unwrap();
        repo.save_facts("u1", &[knowledge_record("c")]).await.unwrap();

        let loaded = repo.load_facts("u1").await.unwrap();
        assert_eq!(loaded, vec![knowledge_record("c")]);
    }

    #[tokio::test]
    async fn test_users_with_path_characters_stay_inside_facts_dir() {
        let temp_dir = TempDir::new().unwrap();
        let repo = DirFactRepository::new(temp_dir.path());

        repo.save_facts("../escape", &[knowledge_record("a")])
            .await
            .unwrap();

        assert!(!temp_dir.path().join("escape.json").exists());
        assert_eq!(repo.load_facts("../escape").await.unwrap().len(), 1);
        assert!(repo.load_facts("escape").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_data_access_error() {
        let temp_dir = TempDir::new().unwrap();
        let repo = DirFactRepository::new(temp_dir.path());
        std::fs::create_dir_all(repo.facts_dir()).unwrap();
        std::fs::write(repo.facts_dir().join("u1.json"), "[oops").unwrap();

        let err = repo.load_facts("u1").await.unwrap_err();
        assert!(matches!(err, JabyError::DataAccess(_)));
    }
}
