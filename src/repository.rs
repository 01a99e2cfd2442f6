//! Destination of committed objects

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CommitError;
use crate::objects::ConstructionTarget;

/// Persists constructed objects. Never retried by the engine.
pub trait Repository: Send + Sync {
    /// Store `object` durably and return its identity
    fn persist(&self, object: &ConstructionTarget) -> Result<String, CommitError>;
}

/// An object as written by [`FileRepository`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub object: ConstructionTarget,
    pub ingested_at: DateTime<Utc>,
}

/// Writes one JSON document per object into a directory
#[derive(Debug, Clone)]
pub struct FileRepository {
    dir: PathBuf,
}

impl FileRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File an object id maps to. ASCII letters, digits and `-` are kept and
    /// every other byte becomes `_XX` in hex, so `ns:1` is `ns_3A1.json` and
    /// distinct ids never share a file.
    pub fn object_path(&self, id: &str) -> PathBuf {
        let mut file_name = String::with_capacity(id.len());
        for byte in id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                file_name.push(char::from(byte));
            } else {
                file_name.push_str(&format!("_{:02X}", byte));
            }
        }
        self.dir.join(format!("{}.json", file_name))
    }

    /// Load a previously persisted object
    pub fn load(&self, id: &str) -> Result<Option<StoredObject>, CommitError> {
        let path = self.object_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }
}

impl Repository for FileRepository {
    fn persist(&self, object: &ConstructionTarget) -> Result<String, CommitError> {
        if object.id.trim().is_empty() {
            return Err(CommitError::Rejected {
                id: object.id.clone(),
                reason: "object has no identifier".to_string(),
            });
        }

        let path = self.object_path(&object.id);
        if path.exists() {
            return Err(CommitError::AlreadyExists(object.id.clone()));
        }

        fs::create_dir_all(&self.dir)?;
        let stored = StoredObject {
            object: object.clone(),
            ingested_at: Utc::now(),
        };
        fs::write(&path, serde_json::to_string_pretty(&stored)?)?;
        debug!(object = %object.id, path = %path.display(), "Persisted object");
        Ok(object.id.clone())
    }
}

/// Process-local repository for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    objects: Mutex<Vec<ConstructionTarget>>,
    attempts: Mutex<Vec<String>>,
    fail_on: HashSet<String>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject persisting the object with `id`
    pub fn fail_on(mut self, id: impl Into<String>) -> Self {
        self.fail_on.insert(id.into());
        self
    }

    /// Objects stored so far, in commit order
    pub fn persisted(&self) -> Vec<ConstructionTarget> {
        self.objects.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// Ids of every persist call, including failed ones
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl Repository for InMemoryRepository {
    fn persist(&self, object: &ConstructionTarget) -> Result<String, CommitError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(object.id.clone());
        }

        if self.fail_on.contains(&object.id) {
            return Err(CommitError::Rejected {
                id: object.id.clone(),
                reason: "rejected by repository".to_string(),
            });
        }

        let mut objects = self.objects.lock().map_err(|_| CommitError::Rejected {
            id: object.id.clone(),
            reason: "repository lock poisoned".to_string(),
        })?;
        if objects.iter().any(|o| o.id == object.id) {
            return Err(CommitError::AlreadyExists(object.id.clone()));
        }
        objects.push(object.clone());
        Ok(object.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{DefaultObjectFactory, ObjectFactory, Relationship};
    use tempfile::TempDir;

    fn thesis(id: &str) -> ConstructionTarget {
        DefaultObjectFactory.create(
            id,
            "Thesis",
            &["modelA".to_string()],
            vec![Relationship::member_of("col:1")],
        )
    }

    #[test]
    fn test_file_repository_writes_object() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileRepository::new(temp_dir.path().join("objects"));

        let id = repo.persist(&thesis("ns:1")).unwrap();
        assert_eq!(id, "ns:1");
        assert!(temp_dir.path().join("objects/ns_3A1.json").exists());

        let stored = repo.load("ns:1").unwrap().unwrap();
        assert_eq!(stored.object.label, "Thesis");
        assert_eq!(stored.object.collections(), vec!["col:1"]);
    }

    #[test]
    fn test_file_repository_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        repo.persist(&thesis("ns:1")).unwrap();
        let err = repo.persist(&thesis("ns:1")).unwrap_err();
        assert!(matches!(err, CommitError::AlreadyExists(id) if id == "ns:1"));
    }

    #[test]
    fn test_object_path_encodes_id() {
        let repo = FileRepository::new("/repo");
        assert_eq!(repo.object_path("ns:a/b"), PathBuf::from("/repo/ns_3Aa_2Fb.json"));
        assert_eq!(repo.object_path("ns_a"), PathBuf::from("/repo/ns_5Fa.json"));
        assert_eq!(repo.object_path("../x"), PathBuf::from("/repo/_2E_2E_2Fx.json"));
    }

    #[test]
    fn test_similar_ids_persist_to_separate_files() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        for id in ["ns:a", "ns_a", "ns.a", "ns/a"] {
            let mut object = thesis("ns:a");
            object.id = id.to_string();
            assert_eq!(repo.persist(&object).unwrap(), id);
        }
        for id in ["ns:a", "ns_a", "ns.a", "ns/a"] {
            assert_eq!(repo.load(id).unwrap().unwrap().object.id, id);
        }
    }

    #[test]
    fn test_in_memory_repository_fails_on_request() {
        let repo = InMemoryRepository::new().fail_on("ns:2");

        assert!(repo.persist(&thesis("ns:1")).is_ok());
        assert!(repo.persist(&thesis("ns:2")).is_err());
        assert!(repo.persist(&thesis("ns:3")).is_ok());

        let ids: Vec<_> = repo.persisted().into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec!["ns:1", "ns:3"]);
        assert_eq!(repo.attempts(), vec!["ns:1", "ns:2", "ns:3"]);
    }
}
