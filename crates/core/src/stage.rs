//! Stage sequences and the transition guard
//!
//! Both entity types move through a fixed stage sequence. The legal moves are
//! encoded as static tables on the [`Stage`] trait; [`can_transition`] is the
//! single guard every status update consults.
//!
//! ## Deal table
//!
//! | From | Allowed To |
//! |------|------------|
//! | NEW | QUALIFIED, LOST |
//! | QUALIFIED | PROPOSAL_SENT, LOST |
//! | PROPOSAL_SENT | NEGOTIATION, LOST |
//! | NEGOTIATION | WON, LOST |
//! | WON | (terminal) |
//! | LOST | (terminal) |
//!
//! ## Lead table
//!
//! | From | Allowed To |
//! |------|------------|
//! | NEW | CONTACTED, LOST |
//! | CONTACTED | QUALIFIED, LOST |
//! | QUALIFIED | LOST |
//! | CONVERTED | (terminal) |
//! | LOST | (terminal) |
//!
//! `QUALIFIED -> CONVERTED` is deliberately absent from the lead table: only
//! the conversion workflow may perform it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::EntityKey;

/// A fixed stage sequence
pub trait Stage: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Every stage, in pipeline order
    const ALL: &'static [Self];

    /// Stages reachable from `self` in one step
    fn allowed_targets(self) -> &'static [Self];

    /// Canonical upper-case name
    fn as_str(self) -> &'static str;

    /// True when no transition leaves this stage
    fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }
}

/// Check whether `current -> target` is a legal move
///
/// Total over the stage enum. An unset target and every reflexive move are
/// denied.
///
/// # Examples
///
/// ```
/// use pipeline_core::{can_transition, DealStage};
///
/// assert!(can_transition(DealStage::Negotiation, Some(DealStage::Won)));
/// assert!(!can_transition(DealStage::Won, Some(DealStage::Lost)));
/// assert!(!can_transition(DealStage::New, Some(DealStage::New)));
/// assert!(!can_transition(DealStage::New, None));
/// ```
pub fn can_transition<S: Stage>(current: S, target: Option<S>) -> bool {
    match target {
        Some(target) => current.allowed_targets().contains(&target),
        None => false,
    }
}

/// Like [`can_transition`], but a denied move becomes
/// [`Error::InvalidStateTransition`] reported against `entity`
pub fn ensure_transition<S: Stage>(entity: EntityKey, current: S, target: Option<S>) -> Result<S> {
    match target {
        Some(to) if can_transition(current, target) => Ok(to),
        _ => Err(Error::InvalidStateTransition {
            entity,
            from: current.as_str(),
            to: target.map(Stage::as_str),
        }),
    }
}

/// Stage of a deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DealStage {
    /// Freshly converted
    New,
    /// Confirmed as a real opportunity
    Qualified,
    /// Proposal delivered to the customer
    ProposalSent,
    /// Terms under negotiation
    Negotiation,
    /// Closed, won
    Won,
    /// Closed, lost
    Lost,
}

impl Stage for DealStage {
    const ALL: &'static [Self] = &[
        DealStage::New,
        DealStage::Qualified,
        DealStage::ProposalSent,
        DealStage::Negotiation,
        DealStage::Won,
        DealStage::Lost,
    ];

    fn allowed_targets(self) -> &'static [Self] {
        use DealStage::*;
        match self {
            New => &[Qualified, Lost],
            Qualified => &[ProposalSent, Lost],
            ProposalSent => &[Negotiation, Lost],
            Negotiation => &[Won, Lost],
            Won | Lost => &[],
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            DealStage::New => "NEW",
            DealStage::Qualified => "QUALIFIED",
            DealStage::ProposalSent => "PROPOSAL_SENT",
            DealStage::Negotiation => "NEGOTIATION",
            DealStage::Won => "WON",
            DealStage::Lost => "LOST",
        }
    }
}

/// Stage of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStage {
    /// Just captured
    New,
    /// First contact made
    Contacted,
    /// Ready for conversion
    Qualified,
    /// Converted into a deal
    Converted,
    /// Dropped
    Lost,
}

impl Stage for LeadStage {
    const ALL: &'static [Self] = &[
        LeadStage::New,
        LeadStage::Contacted,
        LeadStage::Qualified,
        LeadStage::Converted,
        LeadStage::Lost,
    ];

    fn allowed_targets(self) -> &'static [Self] {
        use LeadStage::*;
        match self {
            New => &[Contacted, Lost],
            Contacted => &[Qualified, Lost],
            Qualified => &[Lost],
            Converted | Lost => &[],
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LeadStage::New => "NEW",
            LeadStage::Contacted => "CONTACTED",
            LeadStage::Qualified => "QUALIFIED",
            LeadStage::Converted => "CONVERTED",
            LeadStage::Lost => "LOST",
        }
    }
}

macro_rules! stage_text {
    ($stage:ty, $what:literal) => {
        impl fmt::Display for $stage {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $stage {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                <$stage as Stage>::ALL
                    .iter()
                    .copied()
                    .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| Error::UnknownStage {
                        kind: $what,
                        name: s.to_string(),
                    })
            }
        }
    };
}

stage_text!(DealStage, "deal");
stage_text!(LeadStage, "lead");
