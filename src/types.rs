//! Public types for the pipeline API.
//!
//! This module re-exports types from internal crates with a clean public interface.

// Entities and identifiers
pub use pipeline_core::{Amount, Deal, DealId, EntityKey, Lead, LeadId};

// Stages and the transition guard
pub use pipeline_core::{can_transition, DealStage, LeadStage, Stage};

// Versions
pub use pipeline_core::{Version, Versioned};

// Errors
pub use pipeline_core::{ConflictReason, Error, Result};

// Store contract and the in-memory store
pub use pipeline_core::{Entity, EntityStore, Staged, UnitOfWork};
pub use pipeline_storage::{MemoryStore, StoreStats};

// Concurrency
pub use pipeline_concurrency::{
    retry_on_conflict, Backoff, ConcurrencyController, Discipline, RetryPolicy, Session,
};

// Batches
pub use pipeline_engine::BatchReport;
