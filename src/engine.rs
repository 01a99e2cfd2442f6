//! Request cycle orchestration
//!
//! One [`WizardEngine::invoke`] call is one user round trip: load the session,
//! initialize it if needed, apply the trigger the user pressed, render the
//! active step and save the session again. Submitting the last step commits
//! every object under construction to the [`Repository`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::WizardError;
use crate::form::{FieldError, Form, FormAction, FormAlter, StepAction};
use crate::navigation;
use crate::objects::{DefaultObjectFactory, ObjectFactory};
use crate::repository::Repository;
use crate::session::{stash, SessionState, SessionStore, Values, WizardConfig};
use crate::steps::{
    ManifestProvider, ModelManifest, Step, StepKind, StepOrdering, StepProvider, StepRegistry,
};

/// Namespace used when neither an id nor a namespace is configured
pub const DEFAULT_NAMESPACE: &str = "islandora";

/// User action that drives a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Next,
    Previous,
    Ingest,
}

/// Input of one round trip
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WizardRequest {
    /// Used only when the session does not exist yet
    #[serde(default)]
    pub configuration: WizardConfig,
    #[serde(default)]
    pub trigger: Option<Trigger>,
    /// Values the user submitted with the trigger
    #[serde(default)]
    pub input: Values,
}

impl WizardRequest {
    pub fn new(configuration: WizardConfig) -> Self {
        Self {
            configuration,
            ..Self::default()
        }
    }

    pub fn trigger(trigger: Trigger, input: Values) -> Self {
        Self {
            trigger: Some(trigger),
            input,
            ..Self::default()
        }
    }
}

/// The active step, ready to show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedStep {
    pub step_id: String,
    pub form: Form,
    /// 1-based position in the ordering
    pub position: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedObject {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitFailure {
    pub id: String,
    pub label: String,
    pub reason: String,
}

/// Outcome of the commit loop, one entry per object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub committed: Vec<CommittedObject>,
    pub failed: Vec<CommitFailure>,
}

impl CommitReport {
    /// Object to send the user to after the wizard finishes
    pub fn redirect_to(&self) -> Option<&str> {
        self.committed.first().map(|o| o.id.as_str())
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of one round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WizardResponse {
    Form(RenderedStep),
    /// The active step has nothing to render
    NoContent { step_id: String },
    Committed(CommitReport),
    /// The wizard cannot run; the caller should offer a way back
    Aborted { message: String },
}

enum TriggerOutcome {
    Moved,
    Rejected(Vec<FieldError>),
    Committed(CommitReport),
}

/// Drives wizard sessions
pub struct WizardEngine {
    registry: StepRegistry,
    actions: HashMap<String, Arc<dyn StepAction>>,
    form_alters: HashMap<String, Vec<Arc<dyn FormAlter>>>,
    factory: Arc<dyn ObjectFactory>,
    repository: Arc<dyn Repository>,
    default_namespace: String,
}

impl WizardEngine {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            registry: StepRegistry::new(),
            actions: HashMap::new(),
            form_alters: HashMap::new(),
            factory: Arc::new(DefaultObjectFactory),
            repository,
            default_namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// Engine with the manifest-backed steps and defaults from `config`
    pub fn from_config(config: &Config, repository: Arc<dyn Repository>) -> Self {
        let mut engine =
            Self::new(repository).with_default_namespace(&config.ingest.default_namespace);
        engine.register_manifests(config.models.clone());
        engine
    }

    pub fn with_factory(mut self, factory: Arc<dyn ObjectFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    pub fn register_provider(&mut self, provider: Arc<dyn StepProvider>) {
        self.registry.register(provider);
    }

    /// Register the executable unit behind an `action_reference`. Replaces any
    /// action already registered under `name`.
    pub fn register_action(&mut self, name: impl Into<String>, action: impl StepAction + 'static) {
        self.actions.insert(name.into(), Arc::new(action));
    }

    /// Add a post-processing hook for forms built by the action `name`
    pub fn register_form_alter(&mut self, name: impl Into<String>, alter: impl FormAlter + 'static) {
        self.form_alters
            .entry(name.into())
            .or_default()
            .push(Arc::new(alter));
    }

    /// Register a [`ManifestProvider`] and its form actions.
    ///
    /// Actions registered earlier under the same name are kept.
    pub fn register_manifests(&mut self, manifests: Vec<ModelManifest>) {
        if manifests.is_empty() {
            return;
        }
        let provider = ManifestProvider::new(manifests);
        for (name, action) in provider.actions() {
            self.actions.entry(name).or_insert(action);
        }
        self.registry.register(Arc::new(provider));
    }

    /// Steps `config` would go through, without creating a session
    pub fn approximate_steps(&self, config: &WizardConfig) -> StepOrdering {
        self.registry
            .approximate_steps(config, self.factory.as_ref(), &self.default_namespace)
    }

    /// Whether objects described by `config` need the wizard at all
    pub fn can_display(&self, config: &WizardConfig) -> bool {
        !self.approximate_steps(config).is_empty()
    }

    /// Run one round trip for `session_id`.
    ///
    /// A configuration error aborts the invocation and is returned as
    /// [`WizardResponse::Aborted`]; the session is not saved. A committed
    /// session is removed from the store.
    pub fn invoke(
        &mut self,
        store: &dyn SessionStore,
        session_id: &str,
        request: WizardRequest,
    ) -> Result<WizardResponse, WizardError> {
        let mut slot = store.load(session_id)?;

        match self.process(&mut slot, request) {
            Ok(WizardResponse::Committed(report)) => {
                store.remove(session_id)?;
                info!(
                    session = %session_id,
                    committed = report.committed.len(),
                    failed = report.failed.len(),
                    "Wizard session finished"
                );
                Ok(WizardResponse::Committed(report))
            }
            Ok(response) => {
                if let Some(state) = slot.as_mut() {
                    state.touch();
                    store.save(session_id, state)?;
                }
                Ok(response)
            }
            Err(e) if e.is_configuration() => {
                warn!(session = %session_id, error = %e, "Wizard aborted");
                Ok(WizardResponse::Aborted {
                    message: e.to_string(),
                })
            }
            Err(e) => {
                // Keep whatever moved so the user can go back from here
                if let Some(state) = slot.as_ref() {
                    store.save(session_id, state)?;
                }
                Err(e)
            }
        }
    }

    /// Drop a session without committing anything
    pub fn abandon(&self, store: &dyn SessionStore, session_id: &str) -> Result<(), WizardError> {
        store.remove(session_id)?;
        info!(session = %session_id, "Wizard session abandoned");
        Ok(())
    }

    fn process(
        &mut self,
        slot: &mut Option<SessionState>,
        request: WizardRequest,
    ) -> Result<WizardResponse, WizardError> {
        // The step set is only trusted for the duration of one request
        self.registry.invalidate();

        let state = SessionState::ensure_initialized(
            slot,
            &request.configuration,
            self.factory.as_ref(),
            &self.default_namespace,
        )?;

        let mut errors = Vec::new();
        if let Some(trigger) = request.trigger {
            // Input overrides the values restored for the step, field by field
            state.pending_values.extend(request.input);
            match self.handle_trigger(state, trigger)? {
                TriggerOutcome::Committed(report) => return Ok(WizardResponse::Committed(report)),
                TriggerOutcome::Rejected(rejected) => errors = rejected,
                TriggerOutcome::Moved => {}
            }
        }

        self.render(state, errors)
    }

    /// Apply `trigger` to the active step
    fn handle_trigger(
        &mut self,
        state: &mut SessionState,
        trigger: Trigger,
    ) -> Result<TriggerOutcome, WizardError> {
        let ordering = self.registry.steps(state);
        if navigation::reconcile(state, &ordering) {
            return Ok(TriggerOutcome::Rejected(vec![FieldError::general(
                "The step you were on no longer applies; continue from here",
            )]));
        }
        let (step_id, step) = active_step(state, &ordering)?;
        let last = navigation::is_last_step(state, &ordering);
        debug!(step = %step_id, ?trigger, "Handling trigger");

        match trigger {
            // Going back never validates the active step
            Trigger::Previous => {
                navigation::retreat(state, &mut self.registry);
                Ok(TriggerOutcome::Moved)
            }
            Trigger::Next if last => Ok(TriggerOutcome::Rejected(vec![FieldError::general(
                "This is the last step; ingest to finish",
            )])),
            Trigger::Ingest if !last => Ok(TriggerOutcome::Rejected(vec![FieldError::general(
                "Ingest is only available on the last step",
            )])),
            Trigger::Next => {
                if let Some(errors) = accept(&step, state) {
                    return Ok(TriggerOutcome::Rejected(errors));
                }
                navigation::advance(state, &mut self.registry);
                Ok(TriggerOutcome::Moved)
            }
            Trigger::Ingest => {
                if let Some(errors) = accept(&step, state) {
                    return Ok(TriggerOutcome::Rejected(errors));
                }
                stash(state, &step_id);
                Ok(TriggerOutcome::Committed(self.commit(state)))
            }
        }
    }

    /// Render the active step with `errors` attached
    fn render(
        &mut self,
        state: &mut SessionState,
        errors: Vec<FieldError>,
    ) -> Result<WizardResponse, WizardError> {
        let ordering = self.registry.steps(state);
        navigation::reconcile(state, &ordering);
        let (step_id, step) = active_step(state, &ordering)?;
        // Later moves resolve against the step the user actually saw
        if state.current_step_id.is_none() {
            state.current_step_id = Some(step_id.clone());
        }

        if let Some(path) = &step.required_resource {
            if !path.exists() {
                return Err(WizardError::MissingResource {
                    step: step_id,
                    path: path.clone(),
                });
            }
        }

        if step.kind == StepKind::Batch {
            warn!(step = %step_id, "Batch steps are not supported, skipping");
            return Ok(WizardResponse::NoContent { step_id });
        }

        let action = self
            .actions
            .get(&step.action_reference)
            .ok_or_else(|| WizardError::UnknownAction(step.action_reference.clone()))?;
        let mut form = action
            .build(state, &step.args)
            .map_err(|source| WizardError::StepFailed {
                step: step_id.clone(),
                source,
            })?;

        form.populate(&state.pending_values);
        form.errors.extend(errors);
        form.actions.clear();
        if !navigation::is_first_step(state, &ordering) {
            form.actions.push(FormAction::Previous);
        }
        if navigation::is_last_step(state, &ordering) {
            form.actions.push(FormAction::Ingest);
        } else {
            form.actions.push(FormAction::Next);
        }

        if let Some(alters) = self.form_alters.get(&step.action_reference) {
            for alter in alters {
                alter.alter(&mut form, state);
            }
        }

        Ok(WizardResponse::Form(RenderedStep {
            position: ordering.position(&step_id).map_or(0, |p| p + 1),
            total: ordering.len(),
            step_id,
            form,
        }))
    }

    /// Persist every object independently. A failure is recorded and the
    /// loop moves on.
    pub fn commit(&self, state: &SessionState) -> CommitReport {
        let mut report = CommitReport::default();
        for object in &state.objects {
            match self.repository.persist(object) {
                Ok(id) => {
                    info!(object = %id, label = %object.label, "Committed object");
                    report.committed.push(CommittedObject {
                        id,
                        label: object.label.clone(),
                    });
                }
                Err(e) => {
                    warn!(object = %object.id, label = %object.label, error = %e, "Commit failed");
                    report.failed.push(CommitFailure {
                        id: object.id.clone(),
                        label: object.label.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }
}

/// Resolve the active step in `ordering`
fn active_step(state: &SessionState, ordering: &StepOrdering) -> Result<(String, Step), WizardError> {
    let step_id = navigation::current_step_id(state, ordering)
        .ok_or_else(|| WizardError::configuration("no steps apply to this object"))?;
    let step = ordering
        .get(&step_id)
        .cloned()
        .ok_or_else(|| WizardError::UnknownStep(step_id.clone()))?;
    Ok((step_id, step))
}

/// Validate and submit the active step. Returns the errors that block the move.
fn accept(step: &Step, state: &mut SessionState) -> Option<Vec<FieldError>> {
    if let Some(validate) = &step.handlers.validate {
        if let Err(errors) = validate(state) {
            if !errors.is_empty() {
                debug!(step = %step.id, errors = errors.len(), "Validation failed");
                return Some(errors);
            }
        }
    }

    if let Some(submit) = &step.handlers.submit {
        if let Err(e) = submit(state) {
            warn!(step = %step.id, error = %e, "Submit handler failed");
            return Some(vec![FieldError::general(format!("{:#}", e))]);
        }
    }

    None
}
