//! Core types for the pipeline
//!
//! This module defines the fundamental types used throughout the system:
//! - [`LeadId`] / [`DealId`]: Opaque identifiers for pipeline entities
//! - [`EntityKey`]: The single namespace locks, versions and errors refer to
//! - [`Version`] / [`Versioned`]: Optimistic concurrency tokens
//! - [`Amount`]: Non-negative monetary amount in minor units

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random id using UUID v4
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }

            /// Create an id from raw bytes
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                $name(Uuid::from_bytes(bytes))
            }

            /// Get raw bytes representation
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a lead
    ///
    /// # Examples
    ///
    /// ```
    /// use pipeline_core::LeadId;
    ///
    /// let a = LeadId::new();
    /// let b = LeadId::new();
    /// assert_ne!(a, b);
    /// ```
    LeadId
);

entity_id!(
    /// Unique identifier for a deal
    DealId
);

/// Key of a stored entity
///
/// Lock handles, versions and error reports are all expressed in terms of
/// `EntityKey`, so a lead and a deal can never collide even if their raw
/// UUIDs were equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKey {
    /// A lead
    Lead(LeadId),
    /// A deal
    Deal(DealId),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Lead(id) => write!(f, "lead:{}", id),
            EntityKey::Deal(id) => write!(f, "deal:{}", id),
        }
    }
}

/// Version token attached to every stored entity
///
/// A freshly created entity has version 1. Every successful mutation
/// increments the version by exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of a freshly inserted entity
    pub const INITIAL: Version = Version(1);

    /// Wrap a raw counter
    pub const fn new(counter: u64) -> Self {
        Version(counter)
    }

    /// Raw counter value
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// The version a successful mutation produces
    #[inline]
    pub const fn next(&self) -> Self {
        Version(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A value paired with the version it was read at (or committed as)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The entity
    pub value: T,
    /// Version of `value`
    pub version: Version,
}

impl<T> Versioned<T> {
    /// Pair a value with its version
    pub fn new(value: T, version: Version) -> Self {
        Self { value, version }
    }

    /// Transform the value, keeping the version
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            value: f(self.value),
            version: self.version,
        }
    }

    /// Discard the version
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Monetary amount in minor currency units (e.g. cents)
///
/// Negative amounts are unrepresentable: [`Amount::from_minor`] rejects them
/// with [`Error::InvalidAmount`].
///
/// # Examples
///
/// ```
/// use pipeline_core::Amount;
///
/// let amount = Amount::from_minor(125_00).unwrap();
/// assert_eq!(amount.minor(), 12_500);
/// assert!(Amount::from_minor(-1).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    /// Zero
    pub const ZERO: Amount = Amount(0);

    /// Create an amount from minor units
    pub fn from_minor(minor: i64) -> Result<Self> {
        if minor < 0 {
            return Err(Error::InvalidAmount { minor });
        }
        Ok(Amount(minor))
    }

    /// Amount in minor units
    pub fn minor(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Amount {
    type Error = Error;

    fn try_from(minor: i64) -> Result<Self> {
        Amount::from_minor(minor)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> i64 {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
