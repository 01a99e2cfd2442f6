//! Objects under construction
//!
//! A [`ConstructionTarget`] lives inside the session until commit. Steps may
//! edit it freely; the repository takes ownership when it is persisted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Relationship predicate linking an object to a collection
pub const IS_MEMBER_OF_COLLECTION: &str = "isMemberOfCollection";
/// Relationship predicate linking an object to a content model
pub const HAS_MODEL: &str = "hasModel";

/// A relationship descriptor attached to an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Predicate name (e.g., "isMemberOfCollection")
    pub relationship: String,
    /// Identifier of the related object
    pub pid: String,
}

impl Relationship {
    pub fn new(relationship: impl Into<String>, pid: impl Into<String>) -> Self {
        Self {
            relationship: relationship.into(),
            pid: pid.into(),
        }
    }

    pub fn member_of(collection: impl Into<String>) -> Self {
        Self::new(IS_MEMBER_OF_COLLECTION, collection)
    }
}

/// An in-memory object being built across the wizard's steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionTarget {
    pub id: String,
    pub label: String,
    /// Content models this object will conform to
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    /// Free-form properties set by steps (metadata, file references, ...)
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl ConstructionTarget {
    /// Check whether a relationship is already attached
    pub fn has_relationship(&self, relationship: &str, pid: &str) -> bool {
        self.relationships
            .iter()
            .any(|r| r.relationship == relationship && r.pid == pid)
    }

    /// Attach a relationship unless an identical one exists
    pub fn add_relationship(&mut self, relationship: Relationship) {
        if !self.has_relationship(&relationship.relationship, &relationship.pid) {
            self.relationships.push(relationship);
        }
    }

    /// Collections this object is a member of
    pub fn collections(&self) -> Vec<&str> {
        self.relationships
            .iter()
            .filter(|r| r.relationship == IS_MEMBER_OF_COLLECTION)
            .map(|r| r.pid.as_str())
            .collect()
    }
}

/// Builds new objects at session initialization
pub trait ObjectFactory: Send + Sync {
    /// Create a new in-memory object.
    ///
    /// `id_or_namespace` is either a full identifier (`ns:local`) or a bare
    /// namespace in which a fresh identifier is minted.
    fn create(
        &self,
        id_or_namespace: &str,
        label: &str,
        models: &[String],
        relationships: Vec<Relationship>,
    ) -> ConstructionTarget;
}

/// Factory minting `<namespace>:<uuid>` identifiers
#[derive(Debug, Clone, Default)]
pub struct DefaultObjectFactory;

impl ObjectFactory for DefaultObjectFactory {
    fn create(
        &self,
        id_or_namespace: &str,
        label: &str,
        models: &[String],
        relationships: Vec<Relationship>,
    ) -> ConstructionTarget {
        let id = if id_or_namespace.contains(':') {
            id_or_namespace.to_string()
        } else {
            format!("{}:{}", id_or_namespace, Uuid::new_v4().simple())
        };

        let mut object = ConstructionTarget {
            id,
            label: label.to_string(),
            models: models.to_vec(),
            relationships: Vec::new(),
            properties: serde_json::Map::new(),
        };
        for model in models {
            object.add_relationship(Relationship::new(HAS_MODEL, model.clone()));
        }
        for relationship in relationships {
            object.add_relationship(relationship);
        }
        object
    }
}
