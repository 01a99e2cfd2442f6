//! Position tracking and movement between steps
//!
//! Lookups work on a [`StepOrdering`] the caller already holds. The two moves,
//! [`advance`] and [`retreat`], go through the [`StepRegistry`] so they can
//! decide whether the ordering has to be rebuilt first.

use tracing::{debug, warn};

use crate::session::{restore, stash, SessionState};
use crate::steps::{StepOrdering, StepRegistry};

/// Active step id: the pinned one, else the first step of `ordering`
pub fn current_step_id(state: &SessionState, ordering: &StepOrdering) -> Option<String> {
    state
        .current_step_id
        .clone()
        .or_else(|| ordering.first().map(|s| s.id.clone()))
}

fn current_position(state: &SessionState, ordering: &StepOrdering) -> Option<usize> {
    let current = current_step_id(state, ordering)?;
    ordering.position(&current)
}

pub fn next_step_id(state: &SessionState, ordering: &StepOrdering) -> Option<String> {
    let position = current_position(state, ordering)?;
    ordering.iter().nth(position + 1).map(|s| s.id.clone())
}

pub fn previous_step_id(state: &SessionState, ordering: &StepOrdering) -> Option<String> {
    let position = current_position(state, ordering)?;
    let previous = position.checked_sub(1)?;
    ordering.iter().nth(previous).map(|s| s.id.clone())
}

pub fn is_first_step(state: &SessionState, ordering: &StepOrdering) -> bool {
    current_position(state, ordering) == Some(0)
}

pub fn is_last_step(state: &SessionState, ordering: &StepOrdering) -> bool {
    match current_position(state, ordering) {
        Some(position) => position + 1 == ordering.len(),
        None => false,
    }
}

/// Stash the active step and move the pointer to `target`
fn move_to(state: &mut SessionState, from: &str, target: &str) {
    stash(state, from);
    state.current_step_id = Some(target.to_string());
    state.touch();
}

/// Point a pinned step that dropped out of `ordering` back at the first step.
///
/// The input pending for the dropped step is stashed under its id and the
/// first step's values are restored. Returns `true` when the pointer moved.
pub fn reconcile(state: &mut SessionState, ordering: &StepOrdering) -> bool {
    let Some(pinned) = state.current_step_id.clone() else {
        return false;
    };
    if ordering.position(&pinned).is_some() {
        return false;
    }

    let first = ordering.first().map(|s| s.id.clone());
    warn!(step = %pinned, first = ?first, "Active step no longer applies, returning to the first step");
    stash(state, &pinned);
    state.current_step_id = first.clone();
    if let Some(first) = first {
        restore(state, &first);
    }
    state.touch();
    true
}

/// Move forward one step. Returns the new step id, or `None` on the last step.
///
/// The step being left is resolved against the ordering the user saw. The
/// ordering is then rebuilt: the step just submitted may have changed which
/// steps follow it.
pub fn advance(state: &mut SessionState, registry: &mut StepRegistry) -> Option<String> {
    let seen = registry.steps(state);
    let current = current_step_id(state, &seen)?;

    registry.invalidate();
    let ordering = registry.steps(state);

    let Some(position) = ordering.position(&current) else {
        debug!(step = %current, "Submitted step no longer applies, not advancing");
        return None;
    };
    let Some(next) = ordering.iter().nth(position + 1).map(|s| s.id.clone()) else {
        debug!(step = %current, "Already on the last step, not advancing");
        return None;
    };

    move_to(state, &current, &next);
    restore(state, &next);
    debug!(from = %current, to = %next, "Advanced");
    Some(next)
}

/// Move back one step. Returns the new step id, or `None` on the first step.
///
/// Uses the cached ordering. The undo handler of the step returned to runs
/// after the pointer moves and before its values are restored.
pub fn retreat(state: &mut SessionState, registry: &mut StepRegistry) -> Option<String> {
    let ordering = registry.steps(state);

    let current = current_step_id(state, &ordering)?;
    let Some(previous) = previous_step_id(state, &ordering) else {
        debug!(step = %current, "Already on the first step, not retreating");
        return None;
    };

    move_to(state, &current, &previous);
    if let Some(undo) = ordering
        .get(&previous)
        .and_then(|step| step.handlers.undo.clone())
    {
        undo(state);
    }
    restore(state, &previous);
    debug!(from = %current, to = %previous, "Retreated");
    Some(previous)
}
