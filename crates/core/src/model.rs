//! Pipeline entities
//!
//! - [`Lead`]: a prospective customer moving through [`LeadStage`]
//! - [`Deal`]: a monetary opportunity created by converting a qualified lead
//!
//! Stored entities travel through the storage layer as [`Record`]s; the
//! [`Entity`] trait maps each concrete type to and from its record and key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

use crate::stage::{DealStage, LeadStage, Stage};
use crate::types::{Amount, DealId, EntityKey, LeadId};

/// A prospective customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    /// Identity
    pub id: LeadId,
    /// Display name
    pub name: String,
    /// Current stage
    pub stage: LeadStage,
}

impl Lead {
    /// A new lead in stage NEW
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: LeadId::new(),
            name: name.into(),
            stage: LeadStage::New,
        }
    }

    /// Same lead, different stage
    pub fn with_stage(mut self, stage: LeadStage) -> Self {
        self.stage = stage;
        self
    }
}

/// A monetary opportunity
///
/// `lead_id` and `amount` are fixed at conversion time; only `stage` moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    id: DealId,
    lead_id: LeadId,
    amount: Amount,
    /// Current stage
    pub stage: DealStage,
}

impl Deal {
    /// A new deal in stage NEW for `lead_id`
    pub fn new(lead_id: LeadId, amount: Amount) -> Self {
        Self {
            id: DealId::new(),
            lead_id,
            amount,
            stage: DealStage::New,
        }
    }

    /// Identity
    pub fn id(&self) -> DealId {
        self.id
    }

    /// Originating lead
    pub fn lead_id(&self) -> LeadId {
        self.lead_id
    }

    /// Deal amount
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Same deal, different stage
    pub fn with_stage(mut self, stage: DealStage) -> Self {
        self.stage = stage;
        self
    }
}

/// Type-erased stored entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A lead
    Lead(Lead),
    /// A deal
    Deal(Deal),
}

impl Record {
    /// Key this record is stored under
    pub fn key(&self) -> EntityKey {
        match self {
            Record::Lead(lead) => EntityKey::Lead(lead.id),
            Record::Deal(deal) => EntityKey::Deal(deal.id),
        }
    }
}

/// A storable pipeline entity
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Identity type
    type Id: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Identity of this entity
    fn id(&self) -> Self::Id;

    /// Storage key for an id
    fn key_of(id: Self::Id) -> EntityKey;

    /// Storage key of this entity
    fn key(&self) -> EntityKey {
        Self::key_of(self.id())
    }

    /// Erase into a record
    fn into_record(self) -> Record;

    /// Recover from a record; `None` if the record holds another type
    fn from_record(record: Record) -> Option<Self>;
}

impl Entity for Lead {
    type Id = LeadId;

    fn id(&self) -> LeadId {
        self.id
    }

    fn key_of(id: LeadId) -> EntityKey {
        EntityKey::Lead(id)
    }

    fn into_record(self) -> Record {
        Record::Lead(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Lead(lead) => Some(lead),
            Record::Deal(_) => None,
        }
    }
}

impl Entity for Deal {
    type Id = DealId;

    fn id(&self) -> DealId {
        self.id
    }

    fn key_of(id: DealId) -> EntityKey {
        EntityKey::Deal(id)
    }

    fn into_record(self) -> Record {
        Record::Deal(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Deal(deal) => Some(deal),
            Record::Lead(_) => None,
        }
    }
}

/// An entity that moves through a stage sequence
pub trait Staged: Entity {
    /// Its stage sequence
    type Stage: Stage;

    /// Current stage
    fn stage(&self) -> Self::Stage;

    /// Same entity, different stage
    fn with_stage(self, stage: Self::Stage) -> Self;
}

impl Staged for Lead {
    type Stage = LeadStage;

    fn stage(&self) -> LeadStage {
        self.stage
    }

    fn with_stage(self, stage: LeadStage) -> Self {
        Lead::with_stage(self, stage)
    }
}

impl Staged for Deal {
    type Stage = DealStage;

    fn stage(&self) -> DealStage {
        self.stage
    }

    fn with_stage(self, stage: DealStage) -> Self {
        Deal::with_stage(self, stage)
    }
}
