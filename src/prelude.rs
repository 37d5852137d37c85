//! Convenient imports for the pipeline.
//!
//! This module re-exports the most commonly used types so you can get started
//! with a single import:
//!
//! ```ignore
//! use pipeline::prelude::*;
//!
//! let pipeline = Pipeline::in_memory();
//! let lead = pipeline.create_lead("Acme")?;
//! ```

// Main entry point
pub use crate::pipeline::{Pipeline, PipelineBuilder};
pub use crate::options::PipelineOptions;

// Error handling
pub use crate::types::{Error, Result};

// Domain
pub use crate::types::{Amount, Deal, DealId, DealStage, Lead, LeadId, LeadStage, Versioned};

// Concurrency
pub use crate::types::{Backoff, ConcurrencyController, Discipline, RetryPolicy};
