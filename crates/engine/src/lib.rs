//! Pipeline workflows
//!
//! This crate builds the pipeline's operations on top of the concurrency
//! layer:
//! - ConversionCoordinator: lead to deal conversion as one atomic unit
//! - StageService: guarded stage transitions for leads and deals
//! - BatchIsolationExecutor: ordered, fail-fast batches with per-item commits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod conversion;
pub mod transition;

pub use batch::{BatchIsolationExecutor, BatchReport};
pub use conversion::{ensure_convertible, ConversionCoordinator};
pub use transition::StageService;
