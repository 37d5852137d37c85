//! Guarded stage updates
//!
//! Every stage change goes through [`ensure_transition`] inside the
//! controller's unit, so the check and the write see the same version of the
//! entity.

use pipeline_concurrency::{ConcurrencyController, Discipline, Session};
use pipeline_core::{ensure_transition, EntityStore, Result, Staged, Versioned};
use std::sync::Arc;
use tracing::debug;

/// Applies stage transitions under a fixed discipline
pub struct StageService<S: EntityStore> {
    controller: Arc<ConcurrencyController<S>>,
    discipline: Discipline,
}

impl<S: EntityStore> StageService<S> {
    /// Service mutating through `controller` under `discipline`
    pub fn new(controller: Arc<ConcurrencyController<S>>, discipline: Discipline) -> Self {
        Self {
            controller,
            discipline,
        }
    }

    /// Discipline transitions run under
    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Move entity `id` to `target`, in its own unit of work
    ///
    /// An unset or unlisted target fails with `InvalidStateTransition` and
    /// nothing is written.
    pub fn transition<E: Staged>(&self, id: E::Id, target: Option<E::Stage>) -> Result<Versioned<E>> {
        let moved = match self.discipline {
            Discipline::Exclusive => self
                .controller
                .update_with_lock::<E, _>(id, |entity| advance(entity, target)),
            Discipline::Optimistic => {
                let attempts = self.controller.retry_policy().max_attempts;
                self.controller
                    .update_with_retry::<E, _>(id, |entity| advance(entity, target), attempts)
            }
        }?;
        debug!(entity = %moved.value.key(), stage = %moved.value.stage(), version = %moved.version, "stage changed");
        Ok(moved)
    }

    /// Stage a transition into an already-open session
    pub fn transition_in<E: Staged>(
        session: &mut Session<'_, S>,
        id: E::Id,
        target: Option<E::Stage>,
    ) -> Result<Versioned<E>> {
        let current = session.read::<E>(id)?;
        let next = advance(current.value, target)?;
        let version = session.write(next.clone())?;
        Ok(Versioned::new(next, version))
    }
}

fn advance<E: Staged>(entity: E, target: Option<E::Stage>) -> Result<E> {
    let to = ensure_transition(entity.key(), entity.stage(), target)?;
    Ok(entity.with_stage(to))
}
