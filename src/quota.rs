//! Quota accounting against the upstream API's daily budget
//!
//! The [`QuotaTracker`] is the single serialization point for spending budget.
//! Every call site that issues a paid upstream request reserves the cost first
//! and only talks to the network if the reservation was granted.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide quota counter shared by every channel in a run
///
/// Cloning is cheap and clones share the same counter.
///
/// # Implementation
///
/// Uses an `AtomicU64` compare-and-swap loop, so `reserve` is an atomic
/// check-and-increment: concurrent callers can never push the running total
/// past the ceiling, and a rejected reservation adds nothing.
#[derive(Clone, Debug)]
pub struct QuotaTracker {
    /// Units consumed so far
    used: Arc<AtomicU64>,
    /// Hard ceiling
    ceiling: u64,
}

/// Snapshot of quota consumption
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaUsage {
    /// Units consumed
    pub used: u64,
    /// Ceiling in force
    pub limit: u64,
    /// `used / limit` as a percentage (0.0 when the limit is 0)
    pub percentage: f64,
}

impl QuotaTracker {
    /// Create a tracker with nothing consumed
    ///
    /// # Examples
    ///
    /// ```
    /// use channel_ingest::quota::QuotaTracker;
    ///
    /// let quota = QuotaTracker::new(100);
    /// assert!(quota.reserve(60).is_ok());
    /// assert!(quota.reserve(60).is_err());
    /// assert_eq!(quota.used(), 60);
    /// ```
    #[must_use]
    pub fn new(ceiling: u64) -> Self {
        Self {
            used: Arc::new(AtomicU64::new(0)),
            ceiling,
        }
    }

    /// Reserve `cost` units, or reject without consuming anything
    ///
    /// Callers that receive [`Error::QuotaExceeded`] must not retry with a
    /// smaller cost in the same run.
    pub fn reserve(&self, cost: u64) -> Result<()> {
        let ceiling = self.ceiling;
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(cost).filter(|total| *total <= ceiling)
            })
            .map(|_| ())
            .map_err(|used| {
                tracing::debug!(cost, used, ceiling, "quota reservation rejected");
                Error::QuotaExceeded {
                    requested: cost,
                    used,
                    ceiling,
                }
            })
    }

    /// Units consumed so far
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    /// Units still available
    pub fn remaining(&self) -> u64 {
        self.ceiling.saturating_sub(self.used())
    }

    /// Ceiling in force
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Consumption snapshot
    pub fn usage(&self) -> QuotaUsage {
        let used = self.used();
        let percentage = if self.ceiling == 0 {
            0.0
        } else {
            used as f64 / self.ceiling as f64 * 100.0
        };
        QuotaUsage {
            used,
            limit: self.ceiling,
            percentage,
        }
    }

    /// Reset consumption to zero
    ///
    /// Operator action only (e.g. after the upstream daily window rolls over);
    /// the ingestor never calls this itself.
    pub fn reset(&self) {
        let previous = self.used.swap(0, Ordering::SeqCst);
        tracing::info!(previous, ceiling = self.ceiling, "quota counter reset");
    }
}
