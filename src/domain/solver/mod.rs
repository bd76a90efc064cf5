//! Allocation strategies and the top-down driver they share.
//!
//! Every strategy answers the same question for one sibling set: how to split
//! a pool among the children of a node. [`solve_with`] walks the forest from
//! each root downward, hands each child its contribution as the pool for its
//! own children, and finally writes `results_value` / `results_ratio`.

mod constrained;
mod montecarlo;
mod unconstrained;

use std::fmt;
use std::str::FromStr;

use generational_arena::Index;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::domain::arena::BucketArena;
use crate::domain::error::{ConvergenceWarning, DomainResult, ValidationError};
use crate::domain::propagate::Sibling;

pub use constrained::ConstrainedSolver;
pub use montecarlo::MonteCarloSolver;
pub use unconstrained::UnconstrainedSolver;

/// Contributions below this magnitude are treated as zero.
pub(crate) const EPSILON: f64 = 1e-9;

/// Default Monte Carlo step (one cent).
pub const DEFAULT_STEP_SIZE: f64 = 0.01;

/// Allocation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Closed form, contributions may be negative
    Unconstrained,
    /// Water-filling, contributions are never negative
    #[default]
    Constrained,
    /// Discrete steps, randomized search
    MonteCarlo,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::Unconstrained,
        Strategy::Constrained,
        Strategy::MonteCarlo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Unconstrained => "unconstrained",
            Strategy::Constrained => "constrained",
            Strategy::MonteCarlo => "montecarlo",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.name() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown strategy '{}', expected one of: {}",
                    s,
                    Strategy::ALL.iter().map(Strategy::name).join(", ")
                )
            })
    }
}

/// Caller-supplied knobs for a solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveParams {
    /// Pool for the root; overrides the root's own `amount_to_add`
    pub pool: Option<f64>,
    /// Monte Carlo step
    pub step_size: f64,
    /// Monte Carlo iteration budget per sibling set (default `1000 * steps`)
    pub max_iterations: Option<u64>,
    /// Monte Carlo seed; entropy when absent
    pub seed: Option<u64>,
}

impl Default for SolveParams {
    fn default() -> Self {
        Self {
            pool: None,
            step_size: DEFAULT_STEP_SIZE,
            max_iterations: None,
            seed: None,
        }
    }
}

/// How one sibling set was split.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Allocation {
    /// Contribution per sibling, in input order
    pub contributions: Vec<f64>,
    /// Part of the pool nobody received
    pub unallocated: f64,
    pub warning: Option<ConvergenceWarning>,
}

/// Splits a pool among one sibling set.
pub trait LevelSolver {
    fn allocate(&mut self, parent: &str, pool: f64, siblings: &[Sibling]) -> DomainResult<Allocation>;
}

/// Summary of a finished solve. The solved values live in the arena.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SolveReport {
    /// Total handed out across all roots
    pub allocated: f64,
    /// Total left over (Monte Carlo remainders, fully clamped sets)
    pub unallocated: f64,
    pub warnings: Vec<ConvergenceWarning>,
}

impl SolveReport {
    pub fn is_approximate(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Solve `arena` in place with the chosen strategy.
///
/// On error the arena is left exactly as it was passed in.
#[instrument(level = "debug", skip(arena, params))]
pub fn solve(
    arena: &mut BucketArena,
    strategy: Strategy,
    params: &SolveParams,
) -> DomainResult<SolveReport> {
    match strategy {
        Strategy::Unconstrained => solve_with(arena, &mut UnconstrainedSolver, params.pool),
        Strategy::Constrained => solve_with(arena, &mut ConstrainedSolver, params.pool),
        Strategy::MonteCarlo => {
            let rng = match params.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let mut solver = MonteCarloSolver::new(params.step_size, rng)?
                .with_max_iterations(params.max_iterations);
            solve_with(arena, &mut solver, params.pool)
        }
    }
}

/// Drive any [`LevelSolver`] over the forest.
pub fn solve_with<S: LevelSolver>(
    arena: &mut BucketArena,
    solver: &mut S,
    pool: Option<f64>,
) -> DomainResult<SolveReport> {
    let roots = arena.roots().to_vec();
    if pool.is_some() && roots.len() > 1 {
        return Err(ValidationError::AmbiguousPool(roots.len()).into());
    }

    let mut scratch = arena.clone();
    let mut report = SolveReport::default();

    for root in roots {
        let Some(node) = scratch.get_node(root) else {
            continue;
        };
        let root_pool = pool.unwrap_or(node.data.amount_to_add);
        info!("solving {} with pool {:.2}", node.data.label, root_pool);

        let root_unallocated = distribute(&mut scratch, solver, root, root_pool, &mut report)?;
        let allocated = root_pool - root_unallocated;
        if let Some(node) = scratch.get_node_mut(root) {
            node.data.amount_to_add = allocated;
        }
        report.allocated += allocated;
    }

    finalize(&mut scratch);
    for warning in &report.warnings {
        warn!("{}", warning);
    }
    *arena = scratch;
    Ok(report)
}

/// Push `pool` from `root` down to the leaves. Returns what the root's own
/// sibling set could not place.
fn distribute<S: LevelSolver>(
    arena: &mut BucketArena,
    solver: &mut S,
    root: Index,
    pool: f64,
    report: &mut SolveReport,
) -> DomainResult<f64> {
    let mut root_unallocated = 0.0;
    // Parents are always popped before their children
    let mut stack = vec![(root, pool)];

    while let Some((idx, pool)) = stack.pop() {
        let kids = arena.children(idx).to_vec();
        if kids.is_empty() {
            continue;
        }
        let label = arena
            .get_node(idx)
            .map(|n| n.data.label.clone())
            .unwrap_or_default();
        let siblings: Vec<Sibling> = kids
            .iter()
            .filter_map(|&c| arena.get_node(c))
            .map(|c| Sibling::new(c.data.current_value, c.data.optimal_ratio))
            .collect();

        let allocation = solver.allocate(&label, pool, &siblings)?;
        debug!(
            "{}: pool {:.4} -> {:?} (unallocated {:.4})",
            label, pool, allocation.contributions, allocation.unallocated
        );

        for (&child, &x) in kids.iter().zip(&allocation.contributions) {
            if let Some(node) = arena.get_node_mut(child) {
                node.data.amount_to_add = x;
            }
            stack.push((child, x));
        }
        if idx == root {
            root_unallocated = allocation.unallocated;
        }
        report.unallocated += allocation.unallocated;
        if let Some(warning) = allocation.warning {
            report.warnings.push(warning);
        }
    }
    Ok(root_unallocated)
}

/// Write `results_value` and `results_ratio` for every node.
fn finalize(arena: &mut BucketArena) {
    let order: Vec<Index> = arena.iter().map(|(idx, _)| idx).collect();
    for idx in order {
        let parent_value = arena
            .parent(idx)
            .and_then(|p| arena.get_node(p))
            .and_then(|p| p.data.results_value);
        if let Some(node) = arena.get_node_mut(idx) {
            let value = node.data.current_value + node.data.amount_to_add;
            let ratio = match (node.parent, parent_value) {
                (None, _) => 1.0,
                (Some(_), Some(pv)) if pv != 0.0 => value / pv,
                _ => 0.0,
            };
            node.data.results_value = Some(value);
            node.data.results_ratio = Some(ratio);
        }
    }
}
