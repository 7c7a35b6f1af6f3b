//! Execution concurrency budget.
//!
//! A slot is reserved with a single compare-and-swap, so concurrent callers
//! can never push the in-flight count past the maximum. The returned
//! [`BudgetPermit`] frees the slot when dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::metrics;

/// Shared limit on operations in `executing`.
#[derive(Debug, Clone)]
pub struct ExecutionBudget {
    in_flight: Arc<AtomicUsize>,
    max: usize,
}

impl ExecutionBudget {
    /// Budget allowing `max` concurrent operations.
    pub fn new(max: usize) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            max,
        }
    }

    /// Reserve a slot, or `None` when all slots are taken.
    pub fn try_reserve(&self) -> Option<BudgetPermit> {
        let max = self.max;
        let reserved = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .ok()?;

        metrics::set_operations_in_flight(reserved + 1);
        Some(BudgetPermit {
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Operations currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Maximum concurrent operations.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Whether every slot is taken.
    pub fn is_exhausted(&self) -> bool {
        self.in_flight() >= self.max
    }
}

/// A reserved execution slot.
#[derive(Debug)]
pub struct BudgetPermit {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for BudgetPermit {
    fn drop(&mut self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        metrics::set_operations_in_flight(previous.saturating_sub(1));
    }
}
