//! Concurrency controller for entity mutations
//!
//! Every mutation of a stored entity runs inside exactly one unit of work
//! opened here, under one of two disciplines:
//!
//! - **Exclusive**: handle acquired before the read, held across the write,
//!   released after commit (or failure). Same-key callers are serialized.
//! - **Optimistic**: unlocked read, version-conditioned write, bounded retry
//!   on `Conflict` via [`retry_on_conflict`].
//!
//! ## Unit sequence
//!
//! ```text
//! 1. begin()           - fresh unit, never shared with the caller's unit
//! 2. work(&mut session) - reads/writes staged under the discipline
//! 3. IF work fails: drop unit (staged writes discarded, handles released)
//! 4. commit()          - validate + apply atomically
//! 5. drop unit         - handles released
//! ```

use pipeline_core::{Entity, EntityStore, Error, Result, Versioned};
use std::sync::Arc;
use tracing::debug;

use crate::retry::{retry_on_conflict, RetryPolicy};
use crate::session::{Discipline, Session};

/// Owner of the locking discipline applied to the store
///
/// # Thread Safety
///
/// The controller is `Sync`; share it behind an `Arc` and call it from any
/// number of threads. Isolation comes from the store's lock table and commit
/// validation, not from the controller itself.
pub struct ConcurrencyController<S: EntityStore> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S: EntityStore> ConcurrencyController<S> {
    /// Controller with the default retry policy
    pub fn new(store: Arc<S>) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    /// Controller with a specific retry policy for optimistic units
    pub fn with_retry(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Read an entity without locking
    ///
    /// The store itself is not handed out; every mutation goes through a
    /// unit of work opened here.
    pub fn get<E: Entity>(&self, id: E::Id) -> Result<Versioned<E>> {
        self.store.get_by_id::<E>(id)
    }

    /// Every stored entity of type `E`
    pub fn scan<E: Entity>(&self) -> Vec<Versioned<E>> {
        self.store.scan::<E>()
    }

    /// Retry policy for optimistic units
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `work` in a brand-new unit of work
    ///
    /// This is the isolation boundary: the unit is created here and cannot
    /// be supplied by the caller, so nested calls always get their own
    /// commit. On `Ok` the unit commits; on `Err` it is dropped and nothing
    /// it staged is applied.
    pub fn with_new_unit_of_work<T>(
        &self,
        discipline: Discipline,
        work: impl FnOnce(&mut Session<'_, S>) -> Result<T>,
    ) -> Result<T> {
        let mut session = Session::begin(self.store.as_ref(), discipline);
        let unit = session.unit_id();
        let output = work(&mut session)?;
        let staged = session.staged_len();
        session.commit()?;
        debug!(%unit, %discipline, staged, "unit of work finished");
        Ok(output)
    }

    /// Run `work` in one exclusive unit
    pub fn run_exclusive<T>(&self, work: impl FnOnce(&mut Session<'_, S>) -> Result<T>) -> Result<T> {
        self.with_new_unit_of_work(Discipline::Exclusive, work)
    }

    /// Run `work` in optimistic units, retrying on `Conflict` per the
    /// controller's policy
    ///
    /// `work` may run several times; each run sees fresh reads.
    pub fn run_optimistic<T>(&self, work: impl FnMut(&mut Session<'_, S>) -> Result<T>) -> Result<T> {
        self.run_optimistic_with(&self.retry, work)
    }

    fn run_optimistic_with<T>(
        &self,
        policy: &RetryPolicy,
        mut work: impl FnMut(&mut Session<'_, S>) -> Result<T>,
    ) -> Result<T> {
        retry_on_conflict(policy, |_attempt| {
            self.with_new_unit_of_work(Discipline::Optimistic, |session| work(session))
        })
    }

    /// Run `work` under the given discipline; optimistic work is retried
    pub fn run<T>(
        &self,
        discipline: Discipline,
        work: impl FnMut(&mut Session<'_, S>) -> Result<T>,
    ) -> Result<T> {
        match discipline {
            Discipline::Exclusive => self.run_exclusive(work),
            Discipline::Optimistic => self.run_optimistic(work),
        }
    }

    /// Exclusive read-modify-write of one entity
    ///
    /// Blocks while another exclusive unit holds the entity. Returns the
    /// entity as committed, with its new version.
    pub fn update_with_lock<E, F>(&self, id: E::Id, mutation: F) -> Result<Versioned<E>>
    where
        E: Entity,
        F: FnOnce(E) -> Result<E>,
    {
        self.run_exclusive(|session| apply_mutation(session, id, mutation))
    }

    /// Optimistic read-modify-write of one entity with up to `max_attempts`
    /// attempts
    ///
    /// `mutation` may be called once per attempt and must not have side
    /// effects outside its return value.
    pub fn update_with_retry<E, F>(
        &self,
        id: E::Id,
        mut mutation: F,
        max_attempts: u32,
    ) -> Result<Versioned<E>>
    where
        E: Entity,
        F: FnMut(E) -> Result<E>,
    {
        let policy = self.retry.with_max_attempts(max_attempts);
        self.run_optimistic_with(&policy, |session| {
            apply_mutation(session, id, &mut mutation)
        })
    }
}

fn apply_mutation<S, E, F>(session: &mut Session<'_, S>, id: E::Id, mutation: F) -> Result<Versioned<E>>
where
    S: EntityStore,
    E: Entity,
    F: FnOnce(E) -> Result<E>,
{
    let current = session.read::<E>(id)?;
    let next = mutation(current.value)?;
    if next.id() != id {
        return Err(Error::Internal(format!(
            "mutation changed identity of {} to {}",
            E::key_of(id),
            next.key()
        )));
    }
    let version = session.write(next.clone())?;
    Ok(Versioned::new(next, version))
}
