//! Step discovery and assembly
//!
//! For every hook key applicable to a session (one generic key plus one per
//! content model), each registered provider contributes steps, then every
//! provider gets a chance to alter the merged map. The result is sorted by
//! weight and cached until [`StepRegistry::invalidate`] is called.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::{Step, StepOrdering};
use crate::objects::ObjectFactory;
use crate::session::{SessionState, WizardConfig};

/// Steps keyed by id, in contribution order
pub type StepMap = IndexMap<String, Step>;

/// Identifies which set of steps a provider is asked for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookKey {
    /// Steps that apply to every object
    All,
    /// Steps that apply to objects of one content model
    Model(String),
}

impl HookKey {
    /// Hook keys for a session's models: the generic key first, then one per model
    pub fn for_models(models: &[String]) -> Vec<HookKey> {
        std::iter::once(HookKey::All)
            .chain(
                models
                    .iter()
                    .filter(|m| !m.trim().is_empty())
                    .map(|m| HookKey::Model(m.clone())),
            )
            .collect()
    }

    /// Conventional hook name, used in logs
    pub fn name(&self) -> String {
        match self {
            HookKey::All => "ingest_steps".to_string(),
            HookKey::Model(model) => format!("{}_ingest_steps", model),
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            HookKey::All => None,
            HookKey::Model(model) => Some(model),
        }
    }
}

impl fmt::Display for HookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A plugin contributing and altering wizard steps.
///
/// Providers are invoked in registration order. `contribute` must be
/// idempotent for equivalent session state.
pub trait StepProvider: Send + Sync {
    /// Provider name (for logging)
    fn name(&self) -> &str;

    /// Steps this provider adds for `hook`
    fn contribute(&self, hook: &HookKey, state: &SessionState) -> Vec<Step>;

    /// Add, remove or modify steps after all contributions are merged
    fn alter(&self, _hook: &HookKey, _steps: &mut StepMap, _state: &mut SessionState) {}
}

/// Assembles the step ordering for a session
#[derive(Default)]
pub struct StepRegistry {
    providers: Vec<Arc<dyn StepProvider>>,
    cache: Option<StepOrdering>,
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Invalidates the cached ordering.
    pub fn register(&mut self, provider: Arc<dyn StepProvider>) {
        debug!(provider = provider.name(), "Registered step provider");
        self.providers.push(provider);
        self.cache = None;
    }

    /// Ordering for `state`, reusing the cached one if still valid
    pub fn steps(&mut self, state: &mut SessionState) -> StepOrdering {
        if let Some(ordering) = &self.cache {
            return ordering.clone();
        }
        let ordering = self.build_steps(state);
        self.cache = Some(ordering.clone());
        ordering
    }

    /// Drop the cached ordering so the next [`Self::steps`] call rebuilds it
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Run discovery from scratch, bypassing the cache.
    ///
    /// The session must already be initialized, which guarantees a
    /// non-empty model list.
    pub fn build_steps(&self, state: &mut SessionState) -> StepOrdering {
        let hooks = HookKey::for_models(state.models());
        let mut steps = StepMap::new();

        for hook in &hooks {
            for provider in &self.providers {
                for step in provider.contribute(hook, state) {
                    if step.id.trim().is_empty() {
                        warn!(
                            provider = provider.name(),
                            hook = %hook,
                            "Dropping step without an id"
                        );
                        continue;
                    }
                    if steps.contains_key(&step.id) {
                        debug!(
                            provider = provider.name(),
                            step = %step.id,
                            "Step replaced by later contribution"
                        );
                    }
                    steps.insert(step.id.clone(), step);
                }
            }
        }

        for hook in &hooks {
            for provider in &self.providers {
                provider.alter(hook, &mut steps, state);
            }
        }
        steps.retain(|id, _| !id.trim().is_empty());

        let ordering = StepOrdering::from_steps(steps.into_values());
        debug!(steps = ?ordering.ids(), "Assembled step ordering");
        ordering
    }

    /// Best-effort ordering for a configuration that has no session yet.
    ///
    /// Invalid configuration yields an empty ordering instead of an error.
    /// Used to check up front whether an object type needs any step at all.
    pub fn approximate_steps(
        &self,
        config: &WizardConfig,
        factory: &dyn ObjectFactory,
        default_namespace: &str,
    ) -> StepOrdering {
        match SessionState::initialize(config.clone(), factory, default_namespace) {
            Ok(mut scratch) => self.build_steps(&mut scratch),
            Err(e) => {
                debug!(error = %e, "Configuration not usable, no steps apply");
                StepOrdering::default()
            }
        }
    }
}
