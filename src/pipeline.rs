//! Main pipeline entry point.
//!
//! This module provides the `Pipeline` struct, the primary entry point for
//! all pipeline operations, and its builder.

use pipeline_concurrency::{ConcurrencyController, Discipline};
use pipeline_core::{
    Amount, Deal, DealId, DealStage, Entity, EntityStore, Lead, LeadId, LeadStage, Result,
    Versioned,
};
use pipeline_engine::{BatchIsolationExecutor, BatchReport, ConversionCoordinator, StageService};
use pipeline_storage::{LockTable, MemoryStore, StoreStats};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::options::PipelineOptions;

/// The sales pipeline.
///
/// Owns the wiring from an injected store to the workflows. Every mutating
/// call runs in its own unit of work.
///
/// # Example
///
/// ```ignore
/// use pipeline::prelude::*;
///
/// let pipeline = Pipeline::in_memory();
///
/// let lead = pipeline.create_lead("Acme")?;
/// pipeline.transition_lead(lead.id, LeadStage::Contacted)?;
/// pipeline.transition_lead(lead.id, LeadStage::Qualified)?;
///
/// let deal = pipeline.convert_lead_to_deal(lead.id, Amount::from_minor(50_000)?)?;
/// pipeline.transition_deal(deal.id(), DealStage::Qualified)?;
/// ```
pub struct Pipeline<S: EntityStore = MemoryStore> {
    store: Arc<S>,
    controller: Arc<ConcurrencyController<S>>,
    coordinator: ConversionCoordinator<S>,
    stages: StageService<S>,
    batches: BatchIsolationExecutor<S>,
    options: PipelineOptions,
}

impl Pipeline<MemoryStore> {
    /// In-memory pipeline with default options.
    pub fn in_memory() -> Self {
        let options = PipelineOptions::default();
        let store = Arc::new(MemoryStore::with_lock_timeout(options.lock_timeout()));
        Self::assemble(store, options)
    }

    /// Create a builder for pipeline configuration.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Store counters.
    pub fn metrics(&self) -> StoreStats {
        self.store.stats()
    }

    /// Exclusive handles currently held, for inspection.
    pub fn locks(&self) -> &LockTable {
        self.store.locks()
    }
}

impl<S: EntityStore> Pipeline<S> {
    fn assemble(store: Arc<S>, options: PipelineOptions) -> Self {
        let controller = Arc::new(ConcurrencyController::with_retry(
            Arc::clone(&store),
            options.retry,
        ));
        Self {
            coordinator: ConversionCoordinator::new(Arc::clone(&controller)),
            stages: StageService::new(Arc::clone(&controller), options.discipline),
            batches: BatchIsolationExecutor::new(Arc::clone(&controller)),
            controller,
            store,
            options,
        }
    }

    /// Options this pipeline was built with.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// The concurrency controller, for custom guarded operations.
    pub fn controller(&self) -> &ConcurrencyController<S> {
        &self.controller
    }

    // ========================================================================
    // Intake and reads
    // ========================================================================

    /// Capture a new lead in stage NEW.
    pub fn create_lead(&self, name: impl Into<String>) -> Result<Lead> {
        let lead = Lead::new(name);
        self.controller
            .run_exclusive(|session| Ok(session.create(lead.clone())))?;
        debug!(lead = %lead.id, "lead created");
        Ok(lead)
    }

    /// Read a lead and its version.
    pub fn lead(&self, id: LeadId) -> Result<Versioned<Lead>> {
        self.store.get_by_id::<Lead>(id)
    }

    /// Read a deal and its version.
    pub fn deal(&self, id: DealId) -> Result<Versioned<Deal>> {
        self.store.get_by_id::<Deal>(id)
    }

    /// Deals converted from `lead_id` (at most one).
    pub fn deals_for_lead(&self, lead_id: LeadId) -> Vec<Deal> {
        self.store
            .scan::<Deal>()
            .into_iter()
            .map(Versioned::into_value)
            .filter(|deal| deal.lead_id() == lead_id)
            .collect()
    }

    // ========================================================================
    // Workflows
    // ========================================================================

    /// Move a deal to `target`.
    ///
    /// Fails with `InvalidStateTransition` when the deal table does not list
    /// the move (including an unset target and moves out of WON or LOST).
    pub fn transition_deal(&self, deal_id: DealId, target: impl Into<Option<DealStage>>) -> Result<Deal> {
        self.stages
            .transition::<Deal>(deal_id, target.into())
            .map(Versioned::into_value)
    }

    /// Move a lead to `target`. CONVERTED is only reachable through
    /// [`convert_lead_to_deal`](Self::convert_lead_to_deal).
    pub fn transition_lead(&self, lead_id: LeadId, target: impl Into<Option<LeadStage>>) -> Result<Lead> {
        self.stages
            .transition::<Lead>(lead_id, target.into())
            .map(Versioned::into_value)
    }

    /// Convert a QUALIFIED lead into a new deal under the configured
    /// discipline.
    pub fn convert_lead_to_deal(&self, lead_id: LeadId, amount: Amount) -> Result<Deal> {
        self.convert_lead_to_deal_with(lead_id, amount, self.options.discipline)
    }

    /// Convert a QUALIFIED lead into a new deal under `discipline`.
    pub fn convert_lead_to_deal_with(
        &self,
        lead_id: LeadId,
        amount: Amount,
        discipline: Discipline,
    ) -> Result<Deal> {
        self.coordinator.convert(lead_id, amount, discipline)
    }

    /// Exclusive read-modify-write of one entity.
    pub fn update_with_lock<E, F>(&self, id: E::Id, mutation: F) -> Result<Versioned<E>>
    where
        E: Entity,
        F: FnOnce(E) -> Result<E>,
    {
        self.controller.update_with_lock(id, mutation)
    }

    /// Optimistic read-modify-write of one entity, retried on conflict up
    /// to `max_attempts` attempts.
    pub fn update_with_retry<E, F>(&self, id: E::Id, mutation: F, max_attempts: u32) -> Result<Versioned<E>>
    where
        E: Entity,
        F: FnMut(E) -> Result<E>,
    {
        self.controller.update_with_retry(id, mutation, max_attempts)
    }

    /// Run `operation` for each id in order, each in its own unit of work;
    /// stop at and return the first error.
    pub fn process_batch<I, T, F>(&self, ids: &[I], operation: F) -> Result<()>
    where
        I: Clone + fmt::Debug,
        F: FnMut(&ConcurrencyController<S>, &I) -> Result<T>,
    {
        self.batches.process_all(ids, operation)
    }

    /// Like [`process_batch`](Self::process_batch), reporting the committed
    /// prefix.
    pub fn process_batch_reporting<I, T, F>(&self, ids: &[I], operation: F) -> BatchReport<I>
    where
        I: Clone + fmt::Debug,
        F: FnMut(&ConcurrencyController<S>, &I) -> Result<T>,
    {
        self.batches.process_all_reporting(ids, operation)
    }
}

impl<S: EntityStore> fmt::Debug for Pipeline<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Builder for pipeline configuration.
///
/// # Example
///
/// ```ignore
/// // Contended workload: exclusive locking, longer timeout
/// let pipeline = Pipeline::builder()
///     .options(PipelineOptions::high_contention())
///     .open()?;
///
/// // Tests: tiny timeout, no retry
/// let pipeline = Pipeline::builder()
///     .lock_timeout(Duration::from_millis(50))
///     .max_attempts(1)
///     .open()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    options: PipelineOptions,
}

impl PipelineBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all options at once.
    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the exclusive lock acquisition timeout.
    ///
    /// Stored in whole milliseconds; a partial millisecond rounds up.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        // Round up so a sub-millisecond timeout never collapses to zero.
        let millis = (timeout.as_nanos() + 999_999) / 1_000_000;
        self.options.lock_timeout_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    /// Set the optimistic attempt budget.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.options.retry.max_attempts = max_attempts;
        self
    }

    /// Set the optimistic backoff schedule.
    pub fn backoff(mut self, backoff: pipeline_concurrency::Backoff) -> Self {
        self.options.retry.backoff = backoff;
        self
    }

    /// Set the discipline used by transitions and conversions.
    pub fn discipline(mut self, discipline: Discipline) -> Self {
        self.options.discipline = discipline;
        self
    }

    /// Open an in-memory pipeline.
    pub fn open(self) -> Result<Pipeline<MemoryStore>> {
        self.options.validate()?;
        let store = Arc::new(MemoryStore::with_lock_timeout(self.options.lock_timeout()));
        Ok(Pipeline::assemble(store, self.options))
    }

    /// Open a pipeline over an existing store.
    ///
    /// The store's own acquisition timeout applies; `lock_timeout` is only
    /// used by [`open`](Self::open).
    pub fn with_store<S: EntityStore>(self, store: Arc<S>) -> Result<Pipeline<S>> {
        self.options.validate()?;
        Ok(Pipeline::assemble(store, self.options))
    }
}
