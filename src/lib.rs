//! # Pipeline
//!
//! Sales pipeline core: leads move through stages and convert into deals,
//! which move through a stricter stage sequence of their own.
//!
//! The interesting part is mutation under concurrency:
//!
//! - Every change runs in an explicit unit of work that commits
//!   all-or-nothing
//! - Exclusive units lock before reading; opposite-order lock cycles are
//!   broken by acquisition timeout, failing exactly one caller
//! - Optimistic units write conditioned on the version they read and retry
//!   on conflict with bounded backoff
//! - Batches commit item by item and stop at the first failure
//!
//! ## Quick Start
//!
//! ```ignore
//! use pipeline::prelude::*;
//!
//! let pipeline = Pipeline::in_memory();
//!
//! let lead = pipeline.create_lead("Acme")?;
//! pipeline.transition_lead(lead.id, LeadStage::Contacted)?;
//! pipeline.transition_lead(lead.id, LeadStage::Qualified)?;
//!
//! let deal = pipeline.convert_lead_to_deal(lead.id, Amount::from_minor(50_000)?)?;
//! pipeline.transition_deal(deal.id(), DealStage::Qualified)?;
//! ```
//!
//! ## Layers
//!
//! - `pipeline-core` - entities, stage tables, error taxonomy, store contract
//! - `pipeline-storage` - in-memory store and lock table
//! - `pipeline-concurrency` - exclusive/optimistic units, retry
//! - `pipeline-engine` - conversion, transitions, batches

#![warn(missing_docs)]

mod options;
mod pipeline;
mod types;

pub mod prelude;

// Re-export main entry points
pub use options::{PipelineOptions, DEFAULT_LOCK_TIMEOUT_MS};
pub use pipeline::{Pipeline, PipelineBuilder};

// Re-export types
pub use types::*;
