//! Exclusive lock handles
//!
//! One handle per [`EntityKey`], owned by one unit of work. Requesters of a
//! held key park on a condition variable until the holder releases or their
//! acquisition timeout elapses.
//!
//! # Deadlock handling
//!
//! No wait-for graph is kept. A requester whose timeout elapses re-checks the
//! key one last time; if it is still held, the requester becomes the victim:
//! every handle it owns is released inside the same critical section and the
//! call fails. In an A→B / B→A cycle the two timed-out waiters are serialized
//! by the table mutex, so the second one to run its final check finds the
//! victim's key free and proceeds. Exactly one caller fails.
//!
//! A victim that held other handles gets `DeadlockDetected`; one that held
//! nothing could not have been part of a cycle and gets `LockTimeout`.

use parking_lot::{Condvar, Mutex};
use pipeline_core::{EntityKey, Error, Result, UnitId};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct LockState {
    owners: HashMap<EntityKey, UnitId>,
    held: HashMap<UnitId, Vec<EntityKey>>,
}

impl LockState {
    fn grant(&mut self, owner: UnitId, key: EntityKey) {
        self.owners.insert(key, owner);
        self.held.entry(owner).or_default().push(key);
    }

    fn release_all(&mut self, owner: UnitId) -> usize {
        let keys = self.held.remove(&owner).unwrap_or_default();
        for key in &keys {
            self.owners.remove(key);
        }
        keys.len()
    }
}

/// Table of outstanding exclusive handles
#[derive(Debug)]
pub struct LockTable {
    state: Mutex<LockState>,
    released: Condvar,
    timeout: Duration,
}

impl LockTable {
    /// Create a table whose acquisitions give up after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Acquisition timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquire the handle on `key` for `owner`
    ///
    /// Re-entrant: a key the owner already holds is granted immediately.
    pub fn acquire(&self, owner: UnitId, key: EntityKey) -> Result<()> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut state = self.state.lock();

        loop {
            match state.owners.get(&key) {
                None => {
                    state.grant(owner, key);
                    debug!(unit = %owner, entity = %key, "lock granted");
                    return Ok(());
                }
                Some(holder) if *holder == owner => return Ok(()),
                Some(_) => {}
            }

            if Instant::now() >= deadline {
                let held = state.release_all(owner);
                let waited_ms = started.elapsed().as_millis() as u64;
                if held > 0 {
                    self.released.notify_all();
                    warn!(unit = %owner, entity = %key, held, waited_ms, "deadlock victim released its locks");
                    return Err(Error::DeadlockDetected {
                        entity: key,
                        held,
                        waited_ms,
                    });
                }
                warn!(unit = %owner, entity = %key, waited_ms, "lock acquisition timed out");
                return Err(Error::LockTimeout {
                    entity: key,
                    waited_ms,
                });
            }

            self.released.wait_until(&mut state, deadline);
        }
    }

    /// Release every handle `owner` holds
    pub fn release_all(&self, owner: UnitId) -> usize {
        let released = self.state.lock().release_all(owner);
        if released > 0 {
            self.released.notify_all();
            debug!(unit = %owner, released, "locks released");
        }
        released
    }

    /// Current holder of `key`
    pub fn holder(&self, key: &EntityKey) -> Option<UnitId> {
        self.state.lock().owners.get(key).copied()
    }

    /// Keys `owner` holds, in acquisition order
    pub fn held_by(&self, owner: UnitId) -> Vec<EntityKey> {
        self.state
            .lock()
            .held
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of outstanding handles
    pub fn len(&self) -> usize {
        self.state.lock().owners.len()
    }

    /// True when no handle is outstanding
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
