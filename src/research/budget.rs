//! Call budget for one supervisor loop.
//!
//! The tracker is owned by the supervisor's control flow and mutated only
//! when a reflection or a batch of delegations is issued. Sub-agent results
//! never touch it.

use crate::utils::toml_config::MAX_REFLECTIONS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BudgetExhausted {
    #[error("reflection budget exhausted")]
    Reflections,
    #[error("total call budget exhausted")]
    TotalCalls,
}

/// Monotonically decreasing counters for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetTracker {
    reflections_remaining: usize,
    total_calls_remaining: usize,
    max_parallel_workers: usize,
    reflections_used: usize,
    delegations_used: usize,
}

impl BudgetTracker {
    /// Starts with the full reflection allowance.
    pub fn new(total_calls: usize, max_parallel_workers: usize) -> Self {
        Self {
            reflections_remaining: MAX_REFLECTIONS,
            total_calls_remaining: total_calls,
            max_parallel_workers: max_parallel_workers.max(1),
            reflections_used: 0,
            delegations_used: 0,
        }
    }

    /// Lowers the reflection allowance; it can never be raised above the ceiling.
    pub fn with_reflections(mut self, reflections: usize) -> Self {
        self.reflections_remaining = reflections.min(MAX_REFLECTIONS);
        self
    }

    pub fn reflections_remaining(&self) -> usize {
        self.reflections_remaining
    }

    pub fn total_calls_remaining(&self) -> usize {
        self.total_calls_remaining
    }

    pub fn max_parallel_workers(&self) -> usize {
        self.max_parallel_workers
    }

    pub fn reflections_used(&self) -> usize {
        self.reflections_used
    }

    pub fn delegations_used(&self) -> usize {
        self.delegations_used
    }

    pub fn calls_used(&self) -> usize {
        self.reflections_used + self.delegations_used
    }

    pub fn can_reflect(&self) -> bool {
        self.reflections_remaining > 0 && self.total_calls_remaining > 0
    }

    pub fn is_exhausted(&self) -> bool {
        self.total_calls_remaining == 0
    }

    /// Charges one reflection against both counters.
    pub fn try_reflect(&mut self) -> Result<(), BudgetExhausted> {
        if self.reflections_remaining == 0 {
            return Err(BudgetExhausted::Reflections);
        }
        if self.total_calls_remaining == 0 {
            return Err(BudgetExhausted::TotalCalls);
        }
        self.reflections_remaining -= 1;
        self.total_calls_remaining -= 1;
        self.reflections_used += 1;
        Ok(())
    }

    /// Grants up to `requested` delegations for one batch and charges them.
    ///
    /// The grant is capped by the worker ceiling and the remaining calls, so a
    /// return of zero means no batch may be issued.
    pub fn grant_delegations(&mut self, requested: usize) -> usize {
        let granted = requested
            .min(self.max_parallel_workers)
            .min(self.total_calls_remaining);
        self.total_calls_remaining -= granted;
        self.delegations_used += granted;
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflections_capped_at_three() {
        let mut budget = BudgetTracker::new(100, 4);
        for _ in 0..MAX_REFLECTIONS {
            budget.try_reflect().unwrap();
        }
        assert_eq!(budget.try_reflect(), Err(BudgetExhausted::Reflections));
        assert_eq!(budget.reflections_used(), 3);
        assert_eq!(budget.total_calls_remaining(), 97);
    }

    #[test]
    fn test_with_reflections_never_exceeds_ceiling() {
        let budget = BudgetTracker::new(10, 2).with_reflections(9);
        assert_eq!(budget.reflections_remaining(), MAX_REFLECTIONS);
        let budget = BudgetTracker::new(10, 2).with_reflections(1);
        assert_eq!(budget.reflections_remaining(), 1);
    }

    #[test]
    fn test_reflection_refused_when_total_exhausted() {
        let mut budget = BudgetTracker::new(1, 4);
        budget.try_reflect().unwrap();
        assert!(!budget.can_reflect());
        assert_eq!(budget.try_reflect(), Err(BudgetExhausted::TotalCalls));
    }

    #[test]
    fn test_grant_respects_worker_ceiling_and_remaining_calls() {
        let mut budget = BudgetTracker::new(5, 3);
        assert_eq!(budget.grant_delegations(8), 3);
        assert_eq!(budget.grant_delegations(8), 2);
        assert_eq!(budget.grant_delegations(8), 0);
        assert!(budget.is_exhausted());
        assert_eq!(budget.calls_used(), 5);
    }

    #[test]
    fn test_zero_workers_treated_as_one() {
        let mut budget = BudgetTracker::new(5, 0);
        assert_eq!(budget.max_parallel_workers(), 1);
        assert_eq!(budget.grant_delegations(3), 1);
    }
}
