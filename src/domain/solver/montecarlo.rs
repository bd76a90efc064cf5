//! Discrete allocation in whole steps.
//!
//! The pool is cut into `k = floor(pool / step)` steps. Phase one places steps
//! by sampling: a sibling is drawn uniformly and takes the step with a
//! probability equal to its share of the outstanding positive deficit. Phase
//! two moves single steps between siblings while that lowers the squared ratio
//! deviation. The random source is injected so runs can be replayed.

use rand::Rng;
use tracing::{debug, trace};

use crate::domain::error::{ConvergenceWarning, DomainResult, InfeasibleError};
use crate::domain::propagate::{squared_deviation, Sibling};
use crate::domain::solver::{Allocation, LevelSolver, EPSILON};

/// Iterations granted per step when no budget is given.
pub const ITERATIONS_PER_STEP: u64 = 1000;

#[derive(Debug, Clone)]
pub struct MonteCarloSolver<R: Rng> {
    step_size: f64,
    max_iterations: Option<u64>,
    rng: R,
}

impl<R: Rng> MonteCarloSolver<R> {
    pub fn new(step_size: f64, rng: R) -> DomainResult<Self> {
        if !step_size.is_finite() || step_size <= 0.0 {
            return Err(InfeasibleError::InvalidStepSize(step_size).into());
        }
        Ok(Self {
            step_size,
            max_iterations: None,
            rng,
        })
    }

    /// Sampling budget per sibling set; `None` means `1000 * steps`.
    pub fn with_max_iterations(mut self, max_iterations: Option<u64>) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Working state of one sibling set.
struct Placement<'a> {
    siblings: &'a [Sibling],
    step_size: f64,
    targets: Vec<f64>,
    steps: Vec<u64>,
}

impl<'a> Placement<'a> {
    fn new(siblings: &'a [Sibling], step_size: f64, total_steps: u64) -> Self {
        let held: f64 = siblings.iter().map(|s| s.current_value).sum();
        let target_total = held + total_steps as f64 * step_size;
        let ratio_sum: f64 = siblings.iter().map(|s| s.optimal_ratio).sum();
        let even = 1.0 / siblings.len().max(1) as f64;
        let targets = siblings
            .iter()
            .map(|s| {
                let share = if ratio_sum > 0.0 {
                    s.optimal_ratio / ratio_sum
                } else {
                    even
                };
                share * target_total
            })
            .collect();
        Self {
            siblings,
            step_size,
            targets,
            steps: vec![0; siblings.len()],
        }
    }

    fn value(&self, i: usize) -> f64 {
        self.siblings[i].current_value + self.steps[i] as f64 * self.step_size
    }

    fn deficit(&self, i: usize) -> f64 {
        self.targets[i] - self.value(i)
    }

    fn positive_deficit(&self) -> f64 {
        (0..self.steps.len()).map(|i| self.deficit(i).max(0.0)).sum()
    }

    fn neediest(&self) -> usize {
        (0..self.steps.len())
            .max_by(|&a, &b| self.deficit(a).total_cmp(&self.deficit(b)))
            .unwrap_or(0)
    }

    /// Steps the neediest sibling `i` can take before another one is needier.
    fn greedy_batch(&self, i: usize) -> u64 {
        let runner_up = (0..self.steps.len())
            .filter(|&j| j != i)
            .map(|j| self.deficit(j))
            .max_by(f64::total_cmp);
        match runner_up {
            Some(next) => (((self.deficit(i) - next) / self.step_size).floor() as u64).max(1),
            None => u64::MAX,
        }
    }

    fn objective(&self) -> f64 {
        let values: Vec<f64> = (0..self.steps.len()).map(|i| self.value(i)).collect();
        squared_deviation(&values, self.siblings)
    }

    /// Best single-step move `(from, to)` that lowers the objective.
    fn best_move(&mut self) -> Option<(usize, usize)> {
        let n = self.steps.len();
        let mut best = self.objective();
        let mut found = None;
        for from in 0..n {
            if self.steps[from] == 0 {
                continue;
            }
            for to in 0..n {
                if to == from {
                    continue;
                }
                self.steps[from] -= 1;
                self.steps[to] += 1;
                let candidate = self.objective();
                self.steps[to] -= 1;
                self.steps[from] += 1;
                if candidate < best - EPSILON * EPSILON {
                    best = candidate;
                    found = Some((from, to));
                }
            }
        }
        found
    }

    fn contributions(&self) -> Vec<f64> {
        self.steps
            .iter()
            .map(|&s| s as f64 * self.step_size)
            .collect()
    }
}

impl<R: Rng> LevelSolver for MonteCarloSolver<R> {
    fn allocate(&mut self, parent: &str, pool: f64, siblings: &[Sibling]) -> DomainResult<Allocation> {
        if pool < -EPSILON {
            return Err(InfeasibleError::NegativePool {
                label: parent.to_string(),
                pool,
            }
            .into());
        }
        if pool <= EPSILON {
            return Ok(Allocation {
                contributions: vec![0.0; siblings.len()],
                ..Default::default()
            });
        }

        let total_steps = whole_steps(pool, self.step_size);
        if total_steps == 0 {
            return Err(InfeasibleError::PoolBelowStep {
                label: parent.to_string(),
                pool,
                step_size: self.step_size,
            }
            .into());
        }
        if siblings.is_empty() {
            return Ok(Allocation {
                unallocated: pool,
                ..Default::default()
            });
        }

        let mut remainder = pool - total_steps as f64 * self.step_size;
        if remainder < EPSILON {
            remainder = 0.0;
        }
        let budget = self
            .max_iterations
            .unwrap_or_else(|| total_steps.saturating_mul(ITERATIONS_PER_STEP));

        let mut placement = Placement::new(siblings, self.step_size, total_steps);
        let mut placed = 0;
        let mut iterations = 0;

        while placed < total_steps && iterations < budget {
            iterations += 1;
            let outstanding = placement.positive_deficit();
            if outstanding <= 0.0 {
                break;
            }
            let i = self.rng.gen_range(0..siblings.len());
            let p = placement.deficit(i).max(0.0) / outstanding;
            if self.rng.gen::<f64>() < p {
                placement.steps[i] += 1;
                placed += 1;
            }
        }
        trace!(
            "{}: sampled {} of {} steps in {} iterations",
            parent,
            placed,
            total_steps,
            iterations
        );

        let sampled = placed;
        while placed < total_steps {
            let i = placement.neediest();
            let batch = placement.greedy_batch(i).min(total_steps - placed);
            placement.steps[i] += batch;
            placed += batch;
        }

        let mut moves = 0;
        while moves < total_steps {
            let Some((from, to)) = placement.best_move() else {
                break;
            };
            placement.steps[from] -= 1;
            placement.steps[to] += 1;
            moves += 1;
        }
        debug!("{}: {} improving move(s) after placement", parent, moves);

        let warning = (sampled < total_steps).then(|| ConvergenceWarning {
            label: parent.to_string(),
            placed: sampled,
            steps: total_steps,
            iterations,
            objective: placement.objective(),
        });

        Ok(Allocation {
            contributions: placement.contributions(),
            unallocated: remainder,
            warning,
        })
    }
}

/// Number of whole steps in `pool`. A quotient within a relative `EPSILON` of an
/// integer counts as that integer, so float noise never drops a step.
fn whole_steps(pool: f64, step_size: f64) -> u64 {
    let ratio = pool / step_size;
    let nearest = ratio.round();
    if (ratio - nearest).abs() <= EPSILON * nearest.max(1.0) {
        nearest as u64
    } else {
        ratio.floor() as u64
    }
}
