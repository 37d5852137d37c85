//! Concurrency layer for the pipeline
//!
//! This crate implements the two locking disciplines entity mutations run
//! under:
//! - ConcurrencyController: explicit unit-of-work boundary per mutation
//! - Session: discipline-aware reads and writes inside one unit
//! - Exclusive (pessimistic) units via the store's lock handles
//! - Optimistic units with version-checked writes and bounded retry

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod retry;
pub mod session;

pub use controller::ConcurrencyController;
pub use retry::{retry_on_conflict, retry_with_sleep, Backoff, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
pub use session::{Discipline, Session};
