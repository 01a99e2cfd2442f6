//! Error types for the ingest wizard

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while driving a wizard session
#[derive(Debug, Error)]
pub enum WizardError {
    /// Required session configuration is missing or invalid.
    ///
    /// Fatal for the invocation: the caller gets a message and a way back,
    /// never a partially rendered form.
    #[error("invalid wizard configuration: {0}")]
    Configuration(String),

    #[error("step '{0}' is not part of the current step ordering")]
    UnknownStep(String),

    #[error("no action registered for '{0}'")]
    UnknownAction(String),

    #[error("step '{step}' requires resource {} which is not available", path.display())]
    MissingResource { step: String, path: PathBuf },

    #[error("step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid session id '{0}'")]
    InvalidSessionId(String),

    #[error("session store unavailable: {0}")]
    Store(String),

    #[error("session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WizardError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        WizardError::Configuration(message.into())
    }

    /// Check if this error aborts the whole wizard
    pub fn is_configuration(&self) -> bool {
        matches!(self, WizardError::Configuration(_))
    }
}

/// Failure to persist one object during the final commit
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("object '{0}' already exists in the repository")]
    AlreadyExists(String),

    #[error("repository rejected object '{id}': {reason}")]
    Rejected { id: String, reason: String },

    #[error("repository I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize object: {0}")]
    Serialize(#[from] serde_json::Error),
}
