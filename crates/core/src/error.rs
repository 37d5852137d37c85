//! Error types for the pipeline core
//!
//! Every business-rule violation and concurrency failure is a typed variant.
//! Only [`Error::Conflict`] is ever retried inside the core; everything else
//! propagates to the immediate caller unmodified.

use thiserror::Error;

use crate::stage::LeadStage;
use crate::types::{EntityKey, LeadId, Version};

/// All pipeline errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Referenced entity does not exist
    #[error("not found: {entity}")]
    NotFound {
        /// Missing entity
        entity: EntityKey,
    },

    /// Stage change not permitted by the transition table
    #[error("invalid state transition on {entity}: {from} -> {}", .to.unwrap_or("<unset>"))]
    InvalidStateTransition {
        /// Entity the change was requested on
        entity: EntityKey,
        /// Current stage
        from: &'static str,
        /// Requested stage, if any
        to: Option<&'static str>,
    },

    /// Conversion requested for a lead that was already converted
    #[error("lead {lead} already converted (stage {stage})")]
    AlreadyConverted {
        /// The lead
        lead: LeadId,
        /// Its stage at the time of the request
        stage: LeadStage,
    },

    /// Version mismatch or concurrent modification
    #[error("conflict on {entity}: {reason}")]
    Conflict {
        /// Contended entity
        entity: EntityKey,
        /// What went wrong
        reason: ConflictReason,
    },

    /// Lock acquisition timed out while the requester held other locks
    #[error("deadlock detected acquiring {entity} after {waited_ms}ms (holding {held} lock(s))")]
    DeadlockDetected {
        /// Entity that could not be locked
        entity: EntityKey,
        /// Locks the requester held when it was chosen as victim
        held: usize,
        /// Time spent waiting
        waited_ms: u64,
    },

    /// Lock acquisition timed out
    #[error("timed out acquiring {entity} after {waited_ms}ms")]
    LockTimeout {
        /// Entity that could not be locked
        entity: EntityKey,
        /// Time spent waiting
        waited_ms: u64,
    },

    /// Negative monetary amount
    #[error("invalid amount: {minor} (must be non-negative)")]
    InvalidAmount {
        /// Rejected value in minor units
        minor: i64,
    },

    /// Insert of an entity whose key is already taken
    #[error("already exists: {entity}")]
    AlreadyExists {
        /// Existing entity
        entity: EntityKey,
    },

    /// Stage name that matches no stage
    #[error("unknown {kind} stage: {name}")]
    UnknownStage {
        /// "lead" or "deal"
        kind: &'static str,
        /// Rejected name
        name: String,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Storage collaborator failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Why a write was rejected as conflicting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// Stored version moved past the expected one
    VersionMismatch {
        /// Version the writer read
        expected: Version,
        /// Version currently stored
        actual: Version,
    },
    /// Entity vanished between read and write
    Missing {
        /// Version the writer read
        expected: Version,
    },
    /// Another unit holds the exclusive handle
    Locked,
    /// Plain overwrite from a unit that no longer holds the handle
    LockLost,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::VersionMismatch { expected, actual } => {
                write!(f, "version mismatch: expected {}, got {}", expected, actual)
            }
            ConflictReason::Missing { expected } => {
                write!(f, "entity removed since {}", expected)
            }
            ConflictReason::Locked => f.write_str("held under an exclusive lock"),
            ConflictReason::LockLost => f.write_str("exclusive lock no longer held by writer"),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// Retryable errors (conflicts) may succeed on retry with fresh data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if this is a conflict error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this is a rejected stage change, including
    /// [`Error::AlreadyConverted`].
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            Error::InvalidStateTransition { .. } | Error::AlreadyConverted { .. }
        )
    }

    /// Check if exclusive lock acquisition failed.
    pub fn is_lock_failure(&self) -> bool {
        matches!(
            self,
            Error::DeadlockDetected { .. } | Error::LockTimeout { .. }
        )
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, Error::Internal(_) | Error::Storage(_))
    }

    /// Entity this error refers to, when there is one
    pub fn entity(&self) -> Option<EntityKey> {
        match self {
            Error::NotFound { entity }
            | Error::InvalidStateTransition { entity, .. }
            | Error::Conflict { entity, .. }
            | Error::DeadlockDetected { entity, .. }
            | Error::LockTimeout { entity, .. }
            | Error::AlreadyExists { entity } => Some(*entity),
            Error::AlreadyConverted { lead, .. } => Some(EntityKey::Lead(*lead)),
            _ => None,
        }
    }
}
