//! Closed-form allocation; buckets may give money back.

use crate::domain::error::DomainResult;
use crate::domain::propagate::{propagate, Sibling};
use crate::domain::solver::{Allocation, LevelSolver};

/// Applies the propagator as is. Never fails on a valid tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconstrainedSolver;

impl LevelSolver for UnconstrainedSolver {
    fn allocate(&mut self, _parent: &str, pool: f64, siblings: &[Sibling]) -> DomainResult<Allocation> {
        Ok(Allocation {
            contributions: propagate(pool, siblings).contributions,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_overweight_sibling_when_allocating_then_withdraws() {
        let siblings = [
            Sibling::new(1000.0, 0.5),
            Sibling::new(5000.0, 0.1),
            Sibling::new(1000.0, 0.4),
        ];
        let allocation = UnconstrainedSolver.allocate("root", 0.0, &siblings).unwrap();

        // total 7000: 3500 / 700 / 2800
        assert!((allocation.contributions[1] + 4300.0).abs() < 1e-9);
        let sum: f64 = allocation.contributions.iter().sum();
        assert!(sum.abs() < 1e-9);
        assert_eq!(allocation.unallocated, 0.0);
    }
}
