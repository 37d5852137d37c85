//! Storage layer for the pipeline
//!
//! This crate implements the reference storage collaborator with:
//! - MemoryStore: DashMap-backed entity map behind a commit gate
//! - MemoryUnit: buffered unit of work, all-or-nothing commit
//! - LockTable: exclusive handles with acquisition timeout and deadlock
//!   victim selection

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lock;
pub mod memory;

pub use lock::LockTable;
pub use memory::{MemoryStore, MemoryUnit, StoreStats, DEFAULT_LOCK_TIMEOUT};
