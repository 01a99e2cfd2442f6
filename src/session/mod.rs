//! Session state threaded through every wizard operation
//!
//! One [`SessionState`] exists per wizard instance. It is created on the first
//! invocation, persisted between invocations by a [`SessionStore`], and
//! dropped once the objects are committed or the session is abandoned.

pub mod storage;
pub mod store;

pub use storage::{get_step_storage, restore, stash, StepStorage, StepStorageEntry};
pub use store::{FileSessionStore, InMemorySessionStore, SessionStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::WizardError;
use crate::objects::{ConstructionTarget, ObjectFactory, Relationship};

/// Submitted form values, keyed by field name
pub type Values = serde_json::Map<String, serde_json::Value>;

/// Configuration a wizard session is started with.
///
/// Stored verbatim as the session's shared storage; write-once at
/// initialization, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WizardConfig {
    /// Content models of the object being created. Must not be empty.
    #[serde(default)]
    pub models: Vec<String>,
    /// Collections the new object becomes a member of
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub label: String,
    /// Namespace to mint the object id in (ignored when `id` is set)
    #[serde(default)]
    pub namespace: Option<String>,
    /// Explicit object id
    #[serde(default)]
    pub id: Option<String>,
    /// Additional settings for step providers
    #[serde(default)]
    pub extra: Values,
}

impl WizardConfig {
    pub fn new(models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            models: models.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collections.push(collection.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Reject configurations a session cannot be built from
    pub fn validate(&self) -> Result<(), WizardError> {
        if self.models.iter().all(|m| m.trim().is_empty()) {
            return Err(WizardError::configuration(
                "at least one content model is required to create an object",
            ));
        }
        Ok(())
    }
}

/// Aggregate state of one wizard session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Active step; `None` means the first step of the ordering
    #[serde(default)]
    pub current_step_id: Option<String>,
    /// Objects under construction (never empty)
    pub objects: Vec<ConstructionTarget>,
    shared_storage: WizardConfig,
    #[serde(default)]
    pub step_storage: StepStorage,
    /// Input accepted by the active step in this request, not yet stashed
    #[serde(default)]
    pub pending_values: Values,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Build a fresh session from validated configuration
    pub fn initialize(
        config: WizardConfig,
        factory: &dyn ObjectFactory,
        default_namespace: &str,
    ) -> Result<Self, WizardError> {
        config.validate()?;

        let id_or_namespace = config
            .id
            .clone()
            .or_else(|| config.namespace.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_namespace.to_string());
        let relationships = config
            .collections
            .iter()
            .map(|c| Relationship::member_of(c.clone()))
            .collect();
        let object = factory.create(&id_or_namespace, &config.label, &config.models, relationships);

        info!(
            object = %object.id,
            models = ?config.models,
            "Initialized wizard session"
        );

        let now = Utc::now();
        Ok(Self {
            current_step_id: None,
            objects: vec![object],
            shared_storage: config,
            step_storage: StepStorage::default(),
            pending_values: Values::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Initialize `slot` on first call; later calls return the existing state untouched
    pub fn ensure_initialized<'a>(
        slot: &'a mut Option<SessionState>,
        config: &WizardConfig,
        factory: &dyn ObjectFactory,
        default_namespace: &str,
    ) -> Result<&'a mut SessionState, WizardError> {
        if slot.is_none() {
            *slot = Some(Self::initialize(config.clone(), factory, default_namespace)?);
        }
        slot.as_mut()
            .ok_or_else(|| WizardError::configuration("session state unavailable"))
    }

    /// Read-only view of the configuration the session was started with
    pub fn shared_storage(&self) -> &WizardConfig {
        &self.shared_storage
    }

    pub fn models(&self) -> &[String] {
        &self.shared_storage.models
    }

    /// The first object under construction
    pub fn primary_object(&self) -> Option<&ConstructionTarget> {
        self.objects.first()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{DefaultObjectFactory, IS_MEMBER_OF_COLLECTION};

    fn thesis_config() -> WizardConfig {
        WizardConfig::new(["modelA"])
            .with_collection("col:1")
            .with_label("Thesis")
    }

    #[test]
    fn test_initialize_builds_one_object() {
        let state =
            SessionState::initialize(thesis_config(), &DefaultObjectFactory, "islandora").unwrap();

        assert_eq!(state.objects.len(), 1);
        let object = &state.objects[0];
        assert_eq!(object.label, "Thesis");
        assert!(object.id.starts_with("islandora:"));
        assert!(object.has_relationship(IS_MEMBER_OF_COLLECTION, "col:1"));
        assert!(state.current_step_id.is_none());
    }

    #[test]
    fn test_initialize_prefers_explicit_id_then_namespace() {
        let config = thesis_config().with_namespace("ns").with_id("ns:7");
        let state = SessionState::initialize(config, &DefaultObjectFactory, "islandora").unwrap();
        assert_eq!(state.objects[0].id, "ns:7");

        let config = thesis_config().with_namespace("ns");
        let state = SessionState::initialize(config, &DefaultObjectFactory, "islandora").unwrap();
        assert!(state.objects[0].id.starts_with("ns:"));
    }

    #[test]
    fn test_initialize_rejects_empty_models() {
        let config = WizardConfig::default().with_label("Thesis");
        let err = SessionState::initialize(config, &DefaultObjectFactory, "islandora").unwrap_err();
        assert!(err.is_configuration());

        let blank = WizardConfig::new([" "]);
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_ensure_initialized_is_idempotent() {
        let mut slot = None;
        let config = thesis_config();

        let first = SessionState::ensure_initialized(&mut slot, &config, &DefaultObjectFactory, "ns")
            .unwrap()
            .clone();
        let second =
            SessionState::ensure_initialized(&mut slot, &config, &DefaultObjectFactory, "ns")
                .unwrap();

        assert_eq!(first.objects, second.objects);
        assert_eq!(first.shared_storage(), second.shared_storage());
    }

    #[test]
    fn test_session_state_json_round_trip_keeps_shared_storage() {
        let state =
            SessionState::initialize(thesis_config(), &DefaultObjectFactory, "islandora").unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let restored: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.shared_storage(), state.shared_storage());
        assert_eq!(restored.objects, state.objects);
    }
}
