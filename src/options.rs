//! Pipeline configuration
//!
//! All knobs the core needs: lock acquisition timeout, optimistic retry
//! policy and the default discipline for workflow operations.
//!
//! ## TOML
//!
//! ```toml
//! lock_timeout_ms = 500
//! discipline = "exclusive"
//!
//! [retry]
//! max_attempts = 5
//! backoff = { kind = "exponential", base_ms = 5, max_ms = 80 }
//! ```
//!
//! Missing keys fall back to [`PipelineOptions::default`].

use pipeline_concurrency::{Backoff, Discipline, RetryPolicy};
use pipeline_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lock acquisition timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 1_000;

/// Pipeline options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// How long an exclusive acquisition waits before giving up
    pub lock_timeout_ms: u64,
    /// Retry policy for optimistic units
    pub retry: RetryPolicy,
    /// Discipline used by transitions and conversions
    pub discipline: Discipline,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            retry: RetryPolicy::default(),
            discipline: Discipline::Optimistic,
        }
    }
}

impl PipelineOptions {
    /// Few writers per entity - optimistic, short backoff
    pub fn low_contention() -> Self {
        PipelineOptions {
            retry: RetryPolicy::new(3, Backoff::Exponential { base_ms: 5, max_ms: 50 }),
            discipline: Discipline::Optimistic,
            ..Default::default()
        }
    }

    /// Many writers per entity - exclusive, generous timeout
    pub fn high_contention() -> Self {
        PipelineOptions {
            lock_timeout_ms: 2_000,
            retry: RetryPolicy::new(5, Backoff::Exponential { base_ms: 10, max_ms: 200 }),
            discipline: Discipline::Exclusive,
        }
    }

    /// Surface contention immediately - no retry, short timeout
    pub fn fail_fast() -> Self {
        PipelineOptions {
            lock_timeout_ms: 100,
            retry: RetryPolicy::no_retry(),
            discipline: Discipline::Optimistic,
        }
    }

    /// Parse options from TOML, then validate them
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: PipelineOptions =
            toml::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Lock acquisition timeout
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Reject settings the core cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(Error::InvalidConfig("lock_timeout_ms must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
