//! Batch isolation
//!
//! Runs one guarded operation per id, in order, each in its own unit of work:
//!
//! ```text
//! ids:     a    b    c    d
//! op:      ok   ok   err  (never called)
//! result:  a, b committed and durable; c rolled back by its own unit;
//!          c's error returned verbatim
//! ```
//!
//! Operations receive the [`ConcurrencyController`], whose every entry point
//! opens a fresh unit; there is no batch-wide unit an item could join, so a
//! later failure cannot undo an earlier item.

use pipeline_concurrency::ConcurrencyController;
use pipeline_core::{EntityStore, Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of a batch: the committed prefix and the failure that stopped it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport<I> {
    /// Ids whose operation committed, in order
    pub committed: Vec<I>,
    /// Id whose operation failed, with its error
    pub failed: Option<(I, Error)>,
}

impl<I> BatchReport<I> {
    /// True when every id committed
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }

    /// The failing item's error, or `Ok(())`
    pub fn into_result(self) -> Result<()> {
        match self.failed {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }
}

/// Sequential, fail-fast executor with per-item commit boundaries
pub struct BatchIsolationExecutor<S: EntityStore> {
    controller: Arc<ConcurrencyController<S>>,
}

impl<S: EntityStore> BatchIsolationExecutor<S> {
    /// Executor running items through `controller`
    pub fn new(controller: Arc<ConcurrencyController<S>>) -> Self {
        Self { controller }
    }

    /// Run `operation` for each id until one fails; return that error
    pub fn process_all<I, T, F>(&self, ids: &[I], operation: F) -> Result<()>
    where
        I: Clone + fmt::Debug,
        F: FnMut(&ConcurrencyController<S>, &I) -> Result<T>,
    {
        self.process_all_reporting(ids, operation).into_result()
    }

    /// Like [`process_all`](Self::process_all), but report which prefix
    /// committed
    pub fn process_all_reporting<I, T, F>(&self, ids: &[I], mut operation: F) -> BatchReport<I>
    where
        I: Clone + fmt::Debug,
        F: FnMut(&ConcurrencyController<S>, &I) -> Result<T>,
    {
        let mut committed = Vec::with_capacity(ids.len());

        for (index, id) in ids.iter().enumerate() {
            if let Err(err) = operation(&self.controller, id) {
                error!(index, item = ?id, committed = committed.len(), error = %err, "batch item failed");
                return BatchReport {
                    committed,
                    failed: Some((id.clone(), err)),
                };
            }
            committed.push(id.clone());
        }

        info!(committed = committed.len(), "batch completed");
        BatchReport {
            committed,
            failed: None,
        }
    }
}
