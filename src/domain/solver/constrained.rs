//! Non-negative allocation by water-filling.
//!
//! Siblings whose ideal contribution is negative are pinned at zero and the
//! propagator is re-run over the rest with the full pool. The pinned siblings'
//! shortfall is what the others now share. Each round removes at least one
//! sibling, so a set of `n` settles within `n` rounds.

use tracing::{debug, trace};

use crate::domain::error::{DomainResult, InfeasibleError};
use crate::domain::propagate::{propagate, Sibling};
use crate::domain::solver::{Allocation, LevelSolver, EPSILON};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConstrainedSolver;

impl LevelSolver for ConstrainedSolver {
    fn allocate(&mut self, parent: &str, pool: f64, siblings: &[Sibling]) -> DomainResult<Allocation> {
        if pool < -EPSILON {
            return Err(InfeasibleError::NegativePool {
                label: parent.to_string(),
                pool,
            }
            .into());
        }
        let pool = pool.max(0.0);
        let (contributions, unallocated) = water_fill(pool, siblings);
        Ok(Allocation {
            contributions,
            unallocated,
            warning: None,
        })
    }
}

/// Returns the contribution per sibling and the pool left when every sibling
/// ended up pinned.
fn water_fill(pool: f64, siblings: &[Sibling]) -> (Vec<f64>, f64) {
    let mut contributions = vec![0.0; siblings.len()];
    let mut active: Vec<usize> = (0..siblings.len()).collect();
    let mut round = 0;

    while !active.is_empty() {
        round += 1;
        let subset: Vec<Sibling> = active.iter().map(|&i| siblings[i]).collect();
        let ideal = propagate(pool, &subset).contributions;
        trace!("round {}: active {:?} ideal {:?}", round, active, ideal);

        let pinned: Vec<usize> = active
            .iter()
            .zip(&ideal)
            .filter(|(_, &x)| x < -EPSILON)
            .map(|(&i, _)| i)
            .collect();

        if pinned.is_empty() {
            for (&i, &x) in active.iter().zip(&ideal) {
                contributions[i] = x.max(0.0);
            }
            debug!("settled after {} round(s)", round);
            return (contributions, 0.0);
        }
        active.retain(|i| !pinned.contains(i));
    }

    (contributions, pool)
}
