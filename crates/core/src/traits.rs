//! Storage collaborator contract
//!
//! The pipeline core never owns entity state. It is handed an [`EntityStore`]
//! and mutates entities only through units of work that store hands out.
//!
//! ## Unit of work
//!
//! A unit buffers writes and holds exclusive lock handles:
//!
//! ```text
//! begin()                              -> Unit
//! get_by_id_exclusive(&mut unit, id)   -> acquires handle, reads
//! save / save_if_version_matches / insert (&mut unit, ..) -> staged
//! commit(unit)                         -> validate all, apply all
//! drop(unit)                           -> discard staged writes, release handles
//! ```
//!
//! Dropping a unit without committing is the rollback path: nothing staged is
//! applied and every handle the unit acquired is released.

use crate::error::Result;
use crate::model::Entity;
use crate::types::{EntityKey, Version, Versioned};

/// Identifier of a unit of work; owner of its lock handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u64);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// An open unit of work
pub trait UnitOfWork: Send {
    /// Identity of this unit
    fn id(&self) -> UnitId;

    /// Keys this unit currently holds exclusive handles on
    fn held_locks(&self) -> Vec<EntityKey>;

    /// Number of staged writes
    fn staged_len(&self) -> usize;
}

/// Storage collaborator
///
/// Implementations must make [`EntityStore::commit`] all-or-nothing: either
/// every staged write of the unit is applied (each bumping its entity's
/// version by exactly one) or none is.
pub trait EntityStore: Send + Sync {
    /// Unit of work type
    type Unit: UnitOfWork;

    /// Open a fresh unit of work
    fn begin(&self) -> Self::Unit;

    /// Validate and apply every write staged in `unit`
    ///
    /// Conditional writes whose expected version no longer matches, or whose
    /// entity is exclusively held by another unit, fail with `Conflict`. So
    /// does a plain overwrite from a unit that does not hold the entity's
    /// handle (for instance after losing it as a deadlock victim).
    /// Inserts of existing keys fail with `AlreadyExists`. On any failure
    /// nothing is applied. Lock handles are released when the unit is
    /// consumed, whatever the outcome.
    fn commit(&self, unit: Self::Unit) -> Result<()>;

    /// Read an entity without locking
    fn get_by_id<E: Entity>(&self, id: E::Id) -> Result<Versioned<E>>;

    /// Acquire the exclusive handle on `id` for `unit`, then read it
    ///
    /// Blocks until the handle is free or the store's acquisition timeout
    /// elapses. On timeout the unit is stripped of every handle it holds and
    /// the call fails with `DeadlockDetected` or `LockTimeout`.
    fn get_by_id_exclusive<E: Entity>(&self, unit: &mut Self::Unit, id: E::Id)
        -> Result<Versioned<E>>;

    /// Stage a plain overwrite
    ///
    /// Only commits while `unit` still holds the handle acquired by
    /// [`get_by_id_exclusive`](Self::get_by_id_exclusive).
    fn save<E: Entity>(&self, unit: &mut Self::Unit, entity: E);

    /// Stage a write that only applies if the stored version is `expected`
    fn save_if_version_matches<E: Entity>(
        &self,
        unit: &mut Self::Unit,
        entity: E,
        expected: Version,
    );

    /// Stage creation of a new entity
    fn insert<E: Entity>(&self, unit: &mut Self::Unit, entity: E);

    /// Every stored entity of type `E`
    fn scan<E: Entity>(&self) -> Vec<Versioned<E>>;
}
