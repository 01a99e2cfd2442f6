//! Wizard steps and their ordering
//!
//! Steps are contributed by [`StepProvider`]s and assembled by the
//! [`StepRegistry`] into a [`StepOrdering`] sorted by weight.

pub mod manifest;
pub mod registry;

pub use manifest::{FieldManifest, ManifestProvider, ModelManifest, StepManifest};
pub use registry::{HookKey, StepMap, StepProvider, StepRegistry};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::form::FieldError;
use crate::session::SessionState;

/// Validation hook: inspects the pending input of the active step
pub type ValidateFn = Arc<dyn Fn(&SessionState) -> Result<(), Vec<FieldError>> + Send + Sync>;
/// Submit hook: applies accepted input to the session before the pointer moves
pub type SubmitFn = Arc<dyn Fn(&mut SessionState) -> anyhow::Result<()> + Send + Sync>;
/// Undo hook: reverses what submit did, run when the user comes back to the step
pub type UndoFn = Arc<dyn Fn(&mut SessionState) + Send + Sync>;

/// How the engine executes a step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Renders a form and waits for the user
    #[default]
    Interactive,
    /// Background processing; reserved, currently skipped by the engine
    Batch,
}

/// Optional callables resolved once by the provider that builds the step
#[derive(Clone, Default)]
pub struct StepHandlers {
    pub validate: Option<ValidateFn>,
    pub submit: Option<SubmitFn>,
    pub undo: Option<UndoFn>,
}

impl fmt::Debug for StepHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepHandlers")
            .field("validate", &self.validate.is_some())
            .field("submit", &self.submit.is_some())
            .field("undo", &self.undo.is_some())
            .finish()
    }
}

/// One page of the wizard
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique within a session
    pub id: String,
    /// Ordering weight, nominally -50..=50; lower runs first
    pub weight: i32,
    pub kind: StepKind,
    /// Name of the [`crate::form::StepAction`] that builds this step's form
    pub action_reference: String,
    /// Extra parameters passed to the action
    pub args: Vec<serde_json::Value>,
    /// File that must be available before the step executes
    pub required_resource: Option<PathBuf>,
    pub handlers: StepHandlers,
}

impl Step {
    /// Create an interactive step backed by `action_reference`
    pub fn interactive(id: impl Into<String>, action_reference: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            weight: 0,
            kind: StepKind::Interactive,
            action_reference: action_reference.into(),
            args: Vec::new(),
            required_resource: None,
            handlers: StepHandlers::default(),
        }
    }

    /// Create a batch step (not executed yet)
    pub fn batch(id: impl Into<String>, action_reference: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Batch,
            ..Self::interactive(id, action_reference)
        }
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = serde_json::Value>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn with_required_resource(mut self, path: impl Into<PathBuf>) -> Self {
        self.required_resource = Some(path.into());
        self
    }

    pub fn on_validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionState) -> Result<(), Vec<FieldError>> + Send + Sync + 'static,
    {
        self.handlers.validate = Some(Arc::new(f));
        self
    }

    pub fn on_submit<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut SessionState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.submit = Some(Arc::new(f));
        self
    }

    pub fn on_undo<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut SessionState) + Send + Sync + 'static,
    {
        self.handlers.undo = Some(Arc::new(f));
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.kind == StepKind::Interactive
    }
}

/// Steps sorted ascending by weight.
///
/// Equal weights keep the order in which the steps were contributed; callers
/// must not rely on that tie order.
#[derive(Debug, Clone, Default)]
pub struct StepOrdering {
    steps: Vec<Step>,
}

impl StepOrdering {
    pub fn from_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        let mut steps: Vec<Step> = steps.into_iter().collect();
        steps.sort_by_key(|s| s.weight);
        Self { steps }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    pub fn first(&self) -> Option<&Step> {
        self.steps.first()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
