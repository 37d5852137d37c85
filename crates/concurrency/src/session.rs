//! Discipline-aware access to one unit of work
//!
//! A [`Session`] wraps a store unit and routes reads and writes according to
//! its [`Discipline`]:
//!
//! | Discipline | read | write |
//! |------------|------|-------|
//! | Exclusive | `get_by_id_exclusive` (acquires handle) | `save` |
//! | Optimistic | `get_by_id` (no lock) | `save_if_version_matches(version read)` |
//!
//! Reads see the session's own staged writes. Callers above this layer never
//! see the store's unit type, so they cannot join, reuse or forget to commit
//! a unit.

use pipeline_core::{
    Entity, EntityKey, EntityStore, Error, Record, Result, UnitId, UnitOfWork, Version, Versioned,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Locking discipline for one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    /// Lock before read, hold until commit
    Exclusive,
    /// Read freely, write conditioned on the version read
    Optimistic,
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discipline::Exclusive => f.write_str("exclusive"),
            Discipline::Optimistic => f.write_str("optimistic"),
        }
    }
}

/// One open unit of work plus the versions it has read
pub struct Session<'a, S: EntityStore> {
    store: &'a S,
    unit: S::Unit,
    discipline: Discipline,
    reads: HashMap<EntityKey, Version>,
    pending: HashMap<EntityKey, Record>,
    created: HashSet<EntityKey>,
}

impl<'a, S: EntityStore> Session<'a, S> {
    pub(crate) fn begin(store: &'a S, discipline: Discipline) -> Self {
        Self {
            store,
            unit: store.begin(),
            discipline,
            reads: HashMap::new(),
            pending: HashMap::new(),
            created: HashSet::new(),
        }
    }

    /// Discipline of this session
    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Unit this session wraps
    pub fn unit_id(&self) -> UnitId {
        self.unit.id()
    }

    /// Read an entity under this session's discipline
    ///
    /// The first version observed for a key is the one later writes are
    /// conditioned on. An entity already written or created in this session
    /// is returned as staged, with the version it will commit as.
    pub fn read<E: Entity>(&mut self, id: E::Id) -> Result<Versioned<E>> {
        let key = E::key_of(id);
        if let Some(entity) = self.pending.get(&key).cloned().and_then(E::from_record) {
            let version = match self.reads.get(&key) {
                Some(read) => read.next(),
                None => Version::INITIAL,
            };
            return Ok(Versioned::new(entity, version));
        }

        let current = match self.discipline {
            Discipline::Exclusive => self.store.get_by_id_exclusive::<E>(&mut self.unit, id)?,
            Discipline::Optimistic => self.store.get_by_id::<E>(id)?,
        };
        self.reads.entry(key).or_insert(current.version);
        Ok(current)
    }

    /// Stage an update of an entity previously read in this session
    ///
    /// Returns the version the entity will carry once the unit commits.
    pub fn write<E: Entity>(&mut self, entity: E) -> Result<Version> {
        let key = entity.key();
        if self.created.contains(&key) {
            return Ok(self.create(entity));
        }
        let expected = *self.reads.get(&key).ok_or_else(|| {
            Error::Internal(format!("{} written without being read in {}", key, self.unit.id()))
        })?;

        self.pending.insert(key, entity.clone().into_record());
        match self.discipline {
            Discipline::Exclusive => self.store.save(&mut self.unit, entity),
            Discipline::Optimistic => {
                self.store
                    .save_if_version_matches(&mut self.unit, entity, expected)
            }
        }
        Ok(expected.next())
    }

    /// Stage creation of a new entity
    pub fn create<E: Entity>(&mut self, entity: E) -> Version {
        let key = entity.key();
        self.created.insert(key);
        self.pending.insert(key, entity.clone().into_record());
        self.store.insert(&mut self.unit, entity);
        Version::INITIAL
    }

    /// Number of writes staged so far
    pub fn staged_len(&self) -> usize {
        self.unit.staged_len()
    }

    pub(crate) fn commit(self) -> Result<()> {
        self.store.commit(self.unit)
    }
}

impl<S: EntityStore> fmt::Debug for Session<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("unit", &self.unit.id())
            .field("discipline", &self.discipline)
            .field("reads", &self.reads.len())
            .finish()
    }
}
