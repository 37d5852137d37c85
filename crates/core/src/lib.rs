//! Core types for the sales pipeline
//!
//! This crate defines the vocabulary every other layer speaks:
//! - Entities: [`Lead`], [`Deal`] and their identifiers
//! - Stage sequences and the transition guard ([`can_transition`])
//! - Optimistic concurrency tokens ([`Version`], [`Versioned`])
//! - The storage collaborator contract ([`EntityStore`], [`UnitOfWork`])
//! - The error taxonomy ([`Error`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod model;
pub mod stage;
pub mod traits;
pub mod types;

pub use error::{ConflictReason, Error, Result};
pub use model::{Deal, Entity, Lead, Record, Staged};
pub use stage::{can_transition, ensure_transition, DealStage, LeadStage, Stage};
pub use traits::{EntityStore, UnitId, UnitOfWork};
pub use types::{Amount, DealId, EntityKey, LeadId, Version, Versioned};
