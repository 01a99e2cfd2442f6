//! Per-step persistence inside a session
//!
//! Each step gets a lazily created bag. The `values` slot holds what the step's
//! form last accepted; `data` is free for the step's own handlers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{SessionState, Values};

/// Storage bag for a single step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepStorageEntry {
    /// Values stashed when the user last left this step
    #[serde(default)]
    pub values: Option<Values>,
    /// Auxiliary data owned by the step's handlers
    #[serde(default)]
    pub data: Values,
}

/// Mapping of step id to its storage bag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepStorage {
    entries: HashMap<String, StepStorageEntry>,
}

impl StepStorage {
    /// Get the bag for `step_id`, creating an empty one if unseen
    pub fn entry(&mut self, step_id: &str) -> &mut StepStorageEntry {
        self.entries.entry(step_id.to_string()).or_default()
    }

    pub fn get(&self, step_id: &str) -> Option<&StepStorageEntry> {
        self.entries.get(step_id)
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.entries.contains_key(step_id)
    }
}

/// Move pending input into `step_id`'s storage and clear the pending area.
///
/// Must run while `step_id` is still the active step, before the pointer moves.
pub fn stash(state: &mut SessionState, step_id: &str) {
    let values = std::mem::take(&mut state.pending_values);
    state.step_storage.entry(step_id).values = Some(values);
}

/// Copy `step_id`'s stored values back into the pending area.
///
/// Must run after the pointer moves, before the next render.
pub fn restore(state: &mut SessionState, step_id: &str) {
    state.pending_values = state
        .step_storage
        .get(step_id)
        .and_then(|e| e.values.clone())
        .unwrap_or_default();
}

/// Storage bag for `step_id`, or for the active step when `None`.
///
/// Returns `None` only when no step id is given and the session has not
/// pinned a current step yet.
pub fn get_step_storage<'a>(
    state: &'a mut SessionState,
    step_id: Option<&str>,
) -> Option<&'a mut StepStorageEntry> {
    let id = match step_id {
        Some(id) => id.to_string(),
        None => state.current_step_id.clone()?,
    };
    Some(state.step_storage.entry(&id))
}
