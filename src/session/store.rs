//! Durable storage for session state between invocations

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::debug;

use super::SessionState;
use crate::error::WizardError;

/// Loads session state at the start of an invocation and saves it at the end
pub trait SessionStore: Send + Sync {
    /// Load a session; `Ok(None)` when it does not exist yet
    fn load(&self, session_id: &str) -> Result<Option<SessionState>, WizardError>;

    fn save(&self, session_id: &str, state: &SessionState) -> Result<(), WizardError>;

    /// Remove a session. Removing an unknown session is not an error.
    fn remove(&self, session_id: &str) -> Result<(), WizardError>;
}

/// Session ids end up in file names, so keep them to a safe alphabet
pub fn validate_session_id(session_id: &str) -> Result<(), WizardError> {
    let valid = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(WizardError::InvalidSessionId(session_id.to_string()))
    }
}

/// One JSON file per session in a directory
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn session_file(&self, session_id: &str) -> Result<PathBuf, WizardError> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{}.json", session_id)))
    }

    /// List ids of all stored sessions
    pub fn list(&self) -> Result<Vec<String>, WizardError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, session_id: &str) -> Result<Option<SessionState>, WizardError> {
        let path = self.session_file(session_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        let state = serde_json::from_str(&contents)?;
        debug!(session = %session_id, "Loaded session state");
        Ok(Some(state))
    }

    fn save(&self, session_id: &str, state: &SessionState) -> Result<(), WizardError> {
        let path = self.session_file(session_id)?;
        fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(state)?;
        fs::write(path, contents)?;
        debug!(session = %session_id, "Saved session state");
        Ok(())
    }

    fn remove(&self, session_id: &str) -> Result<(), WizardError> {
        let path = self.session_file(session_id)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Process-local store, mainly for tests and embedding
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .map(|s| s.contains_key(session_id))
            .unwrap_or(false)
    }
}

// States are kept serialized so a load always hands out an independent copy,
// the same as a file round trip would.
impl SessionStore for InMemorySessionStore {
    fn load(&self, session_id: &str) -> Result<Option<SessionState>, WizardError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| WizardError::Store("lock poisoned".to_string()))?;
        sessions
            .get(session_id)
            .map(|json| serde_json::from_str(json).map_err(WizardError::from))
            .transpose()
    }

    fn save(&self, session_id: &str, state: &SessionState) -> Result<(), WizardError> {
        let json = serde_json::to_string(state)?;
        self.sessions
            .lock()
            .map_err(|_| WizardError::Store("lock poisoned".to_string()))?
            .insert(session_id.to_string(), json);
        Ok(())
    }

    fn remove(&self, session_id: &str) -> Result<(), WizardError> {
        self.sessions
            .lock()
            .map_err(|_| WizardError::Store("lock poisoned".to_string()))?
            .remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::DefaultObjectFactory;
    use crate::session::WizardConfig;
    use tempfile::TempDir;

    fn new_state() -> SessionState {
        SessionState::initialize(
            WizardConfig::new(["modelA"]).with_label("Thesis"),
            &DefaultObjectFactory,
            "ns",
        )
        .unwrap()
    }

    #[test]
    fn test_file_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path().join("sessions"));
        let mut state = new_state();
        state.current_step_id = Some("files".into());

        assert!(store.load("abc").unwrap().is_none());
        store.save("abc", &state).unwrap();

        let loaded = store.load("abc").unwrap().unwrap();
        assert_eq!(loaded.current_step_id.as_deref(), Some("files"));
        assert_eq!(loaded.objects, state.objects);
        assert_eq!(store.list().unwrap(), vec!["abc".to_string()]);

        store.remove("abc").unwrap();
        assert!(store.load("abc").unwrap().is_none());
        store.remove("abc").unwrap();
    }

    #[test]
    fn test_file_store_rejects_path_like_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path());
        let err = store.load("../escape").unwrap_err();
        assert!(matches!(err, WizardError::InvalidSessionId(_)));
    }

    #[test]
    fn test_in_memory_store_round_trip() {
        let store = InMemorySessionStore::new();
        let state = new_state();

        store.save("s1", &state).unwrap();
        assert!(store.contains("s1"));
        assert_eq!(store.load("s1").unwrap().unwrap().objects, state.objects);

        store.remove("s1").unwrap();
        assert!(!store.contains("s1"));
    }

    #[test]
    fn test_poisoned_in_memory_store_is_not_a_configuration_error() {
        let store = InMemorySessionStore::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.sessions.lock().unwrap();
            panic!("writer died holding the lock");
        }));

        let err = store.save("s1", &new_state()).unwrap_err();
        assert!(matches!(err, WizardError::Store(_)));
        assert!(!err.is_configuration());
        assert!(matches!(store.load("s1"), Err(WizardError::Store(_))));
    }
}
