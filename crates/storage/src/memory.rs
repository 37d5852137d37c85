//! In-memory entity store
//!
//! Reference implementation of [`EntityStore`].
//!
//! # Design
//!
//! - DashMap keyed by [`EntityKey`]: sharded, concurrent point reads
//! - Commit gate (`RwLock<()>`): commits take the write side, reads the read
//!   side, so a multi-entity commit is never observed half-applied
//! - [`LockTable`]: exclusive handles for units of work
//!
//! # Commit sequence
//!
//! ```text
//! 1. Take commit gate (write)
//! 2. Validate every staged write (versions, lock ownership, inserts)
//! 3. IF any fails: return error, nothing applied
//! 4. Apply every write, bumping each version by one
//! 5. Drop the unit -> lock handles released
//! ```

use dashmap::DashMap;
use parking_lot::RwLock;
use pipeline_core::{
    ConflictReason, Entity, EntityKey, EntityStore, Error, Record, Result, UnitId, UnitOfWork,
    Version, Versioned,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::lock::LockTable;

/// Acquisition timeout used by [`MemoryStore::new`]
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Overwrite,
    IfVersion(Version),
    Insert,
}

#[derive(Debug)]
struct StagedWrite {
    record: Record,
    kind: WriteKind,
}

/// Unit of work for [`MemoryStore`]
///
/// Dropping the unit releases every lock handle it holds.
#[derive(Debug)]
pub struct MemoryUnit {
    id: UnitId,
    locks: Arc<LockTable>,
    writes: Vec<StagedWrite>,
}

impl MemoryUnit {
    fn stage(&mut self, record: Record, kind: WriteKind) {
        let key = record.key();
        // One write per key: later writes replace the record, the first
        // write's condition stands.
        if let Some(existing) = self.writes.iter_mut().find(|w| w.record.key() == key) {
            existing.record = record;
            return;
        }
        self.writes.push(StagedWrite { record, kind });
    }
}

impl UnitOfWork for MemoryUnit {
    fn id(&self) -> UnitId {
        self.id
    }

    fn held_locks(&self) -> Vec<EntityKey> {
        self.locks.held_by(self.id)
    }

    fn staged_len(&self) -> usize {
        self.writes.len()
    }
}

impl Drop for MemoryUnit {
    fn drop(&mut self) {
        self.locks.release_all(self.id);
    }
}

/// Store counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Units committed with at least one write
    pub commits: u64,
    /// Units whose commit was rejected
    pub rejected: u64,
    /// Entities currently stored
    pub entities: usize,
}

/// DashMap-backed entity store
///
/// # Example
///
/// ```ignore
/// use pipeline_storage::MemoryStore;
///
/// let store = MemoryStore::new();
/// let mut unit = store.begin();
/// store.insert(&mut unit, Lead::new("Acme"));
/// store.commit(unit)?;
/// ```
pub struct MemoryStore {
    records: DashMap<EntityKey, Versioned<Record>>,
    locks: Arc<LockTable>,
    commit_gate: RwLock<()>,
    next_unit: AtomicU64,
    commits: AtomicU64,
    rejected: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store with [`DEFAULT_LOCK_TIMEOUT`]
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create an empty store whose lock acquisitions give up after `timeout`
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self {
            records: DashMap::new(),
            locks: Arc::new(LockTable::new(timeout)),
            commit_gate: RwLock::new(()),
            next_unit: AtomicU64::new(1),
            commits: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// The lock table backing exclusive handles
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            commits: self.commits.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            entities: self.records.len(),
        }
    }

    fn read<E: Entity>(&self, key: EntityKey) -> Result<Versioned<E>> {
        let _gate = self.commit_gate.read();
        let stored = self
            .records
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or(Error::NotFound { entity: key })?;
        let version = stored.version;
        E::from_record(stored.value)
            .map(|entity| Versioned::new(entity, version))
            .ok_or_else(|| Error::Internal(format!("record under {} has the wrong type", key)))
    }

    fn validate(&self, unit: UnitId, write: &StagedWrite) -> Result<()> {
        let key = write.record.key();
        let current = self.records.get(&key).map(|entry| entry.version);

        if write.kind == WriteKind::Insert {
            return match current {
                Some(_) => Err(Error::AlreadyExists { entity: key }),
                None => Ok(()),
            };
        }

        match self.locks.holder(&key) {
            Some(holder) if holder != unit => {
                return Err(Error::Conflict {
                    entity: key,
                    reason: ConflictReason::Locked,
                })
            }
            // A plain overwrite is only safe under the writer's own handle.
            None if write.kind == WriteKind::Overwrite && current.is_some() => {
                return Err(Error::Conflict {
                    entity: key,
                    reason: ConflictReason::LockLost,
                })
            }
            _ => {}
        }

        match (write.kind, current) {
            (WriteKind::IfVersion(expected), None) => Err(Error::Conflict {
                entity: key,
                reason: ConflictReason::Missing { expected },
            }),
            (WriteKind::IfVersion(expected), Some(actual)) if actual != expected => {
                Err(Error::Conflict {
                    entity: key,
                    reason: ConflictReason::VersionMismatch { expected, actual },
                })
            }
            (WriteKind::Overwrite, None) => Err(Error::NotFound { entity: key }),
            _ => Ok(()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entities", &self.records.len())
            .field("locks", &self.locks.len())
            .finish()
    }
}

impl EntityStore for MemoryStore {
    type Unit = MemoryUnit;

    fn begin(&self) -> MemoryUnit {
        MemoryUnit {
            id: UnitId(self.next_unit.fetch_add(1, Ordering::Relaxed)),
            locks: Arc::clone(&self.locks),
            writes: Vec::new(),
        }
    }

    fn commit(&self, mut unit: MemoryUnit) -> Result<()> {
        let writes = std::mem::take(&mut unit.writes);
        if writes.is_empty() {
            return Ok(());
        }

        let _gate = self.commit_gate.write();

        if let Some(err) = writes.iter().find_map(|w| self.validate(unit.id, w).err()) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(unit = %unit.id, error = %err, "commit rejected");
            return Err(err);
        }

        let applied = writes.len();
        for write in writes {
            let key = write.record.key();
            let version = match self.records.get(&key) {
                Some(entry) => entry.version.next(),
                None => Version::INITIAL,
            };
            self.records.insert(key, Versioned::new(write.record, version));
        }

        self.commits.fetch_add(1, Ordering::Relaxed);
        debug!(unit = %unit.id, applied, "unit committed");
        Ok(())
    }

    fn get_by_id<E: Entity>(&self, id: E::Id) -> Result<Versioned<E>> {
        self.read(E::key_of(id))
    }

    fn get_by_id_exclusive<E: Entity>(
        &self,
        unit: &mut MemoryUnit,
        id: E::Id,
    ) -> Result<Versioned<E>> {
        let key = E::key_of(id);
        self.locks.acquire(unit.id, key)?;
        self.read(key)
    }

    fn save<E: Entity>(&self, unit: &mut MemoryUnit, entity: E) {
        unit.stage(entity.into_record(), WriteKind::Overwrite);
    }

    fn save_if_version_matches<E: Entity>(
        &self,
        unit: &mut MemoryUnit,
        entity: E,
        expected: Version,
    ) {
        unit.stage(entity.into_record(), WriteKind::IfVersion(expected));
    }

    fn insert<E: Entity>(&self, unit: &mut MemoryUnit, entity: E) {
        unit.stage(entity.into_record(), WriteKind::Insert);
    }

    fn scan<E: Entity>(&self) -> Vec<Versioned<E>> {
        let _gate = self.commit_gate.read();
        self.records
            .iter()
            .filter_map(|entry| {
                let version = entry.value().version;
                E::from_record(entry.value().value.clone()).map(|e| Versioned::new(e, version))
            })
            .collect()
    }
}
