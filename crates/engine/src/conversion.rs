//! Lead to deal conversion
//!
//! Conversion is one atomic unit:
//!
//! ```text
//! read lead (NotFound if missing)
//! check stage == QUALIFIED (AlreadyConverted / InvalidStateTransition otherwise)
//! stage insert of Deal { stage: NEW, lead_id, amount }
//! stage lead.stage = CONVERTED
//! commit both, or neither
//! ```
//!
//! The precondition check runs before anything is staged, so a rejected
//! conversion never leaves an orphan deal behind.

use pipeline_concurrency::{ConcurrencyController, Discipline, Session};
use pipeline_core::{Amount, Deal, EntityKey, EntityStore, Error, Lead, LeadId, LeadStage, Result, Stage};
use std::sync::Arc;
use tracing::info;

/// Check that `lead` may be converted
pub fn ensure_convertible(lead: &Lead) -> Result<()> {
    match lead.stage {
        LeadStage::Qualified => Ok(()),
        LeadStage::Converted => Err(Error::AlreadyConverted {
            lead: lead.id,
            stage: lead.stage,
        }),
        other => Err(Error::InvalidStateTransition {
            entity: EntityKey::Lead(lead.id),
            from: other.as_str(),
            to: Some(LeadStage::Converted.as_str()),
        }),
    }
}

/// Orchestrates lead to deal conversion
pub struct ConversionCoordinator<S: EntityStore> {
    controller: Arc<ConcurrencyController<S>>,
}

impl<S: EntityStore> ConversionCoordinator<S> {
    /// Coordinator mutating through `controller`
    pub fn new(controller: Arc<ConcurrencyController<S>>) -> Self {
        Self { controller }
    }

    /// Convert `lead_id` into a new deal worth `amount`, in its own unit of
    /// work under `discipline`
    ///
    /// Under [`Discipline::Optimistic`] a concurrent writer causes a retry
    /// per the controller's policy; the retry re-reads the lead and so sees a
    /// conversion that won the race as `AlreadyConverted`.
    pub fn convert(&self, lead_id: LeadId, amount: Amount, discipline: Discipline) -> Result<Deal> {
        let deal = self
            .controller
            .run(discipline, |session| Self::convert_in(session, lead_id, amount))?;
        info!(lead = %lead_id, deal = %deal.id(), amount = %deal.amount(), %discipline, "lead converted");
        Ok(deal)
    }

    /// Stage the conversion into an already-open session
    ///
    /// Nothing is staged when the lead is missing or not QUALIFIED.
    pub fn convert_in(session: &mut Session<'_, S>, lead_id: LeadId, amount: Amount) -> Result<Deal> {
        let lead = session.read::<Lead>(lead_id)?;
        ensure_convertible(&lead.value)?;

        let deal = Deal::new(lead_id, amount);
        session.create(deal.clone());
        session.write(lead.value.with_stage(LeadStage::Converted))?;
        Ok(deal)
    }
}
